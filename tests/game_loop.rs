use std::cell::RefCell;
use std::rc::Rc;

use lovejs::bindings;
use lovejs::core::{GameLoop, LoopState};
use lovejs::platform::display_list::Shape;
use lovejs::platform::{Backend, HeadlessBackend, InputEvent, Key, SharedBackend};
use lovejs::scripting::Engine;

const GAME: &str = r#"
import * as g from 'graphics';

let x = 0;
let pressed = [];

export function load() {
    g.setWindow('Pong', 320, 240);
}

export function update(dt) {
    x += 100 * dt;
}

export function keypressed(key) {
    pressed.push(key);
}

export function draw() {
    g.clear(...g.BLACK);
    g.setColor(...g.WHITE);
    g.rectangle(x, 10, 4, 4, true);
    g.print(pressed.join(','), 0, 0);
}
"#;

fn game() -> (Engine, Rc<RefCell<HeadlessBackend>>) {
    let backend = Rc::new(RefCell::new(HeadlessBackend::default()));
    let shared: SharedBackend = backend.clone();
    let mut engine = Engine::default();
    bindings::register_all(&mut engine.global(), shared);
    engine.initialize().unwrap();
    assert!(engine.run_source(GAME, "pong.js"));
    (engine, backend)
}

#[test]
fn test_script_drives_the_display_list() {
    let (mut engine, backend) = game();
    let mut game = GameLoop::new(backend.clone());

    backend.borrow_mut().push_event(InputEvent::KeyPressed { key: Key::Up, repeat: false });
    assert!(game.step(&mut engine, 0.5));
    backend.borrow_mut().push_event(InputEvent::KeyPressed { key: Key::Space, repeat: false });
    assert!(game.step(&mut engine, 0.25));

    let backend = backend.borrow();
    assert_eq!(backend.title(), "Pong");
    assert_eq!(backend.window_size().width, 320);
    assert_eq!(backend.frames(), 2);

    // Only the last frame's commands are kept.
    let commands = backend.display_list().commands();
    assert_eq!(commands.len(), 3);
    assert!(matches!(commands[1].shape, Shape::Rect { rect, filled: true } if rect.x == 75.0));
    assert!(matches!(&commands[2].shape, Shape::Text { text, .. } if text == "up,space"));
}

#[test]
fn test_quit_event_ends_run() {
    let (mut engine, backend) = game();
    let mut game = GameLoop::new(backend.clone()).with_max_frames(Some(100));
    assert!(game.step(&mut engine, 0.0));
    backend.borrow_mut().push_event(InputEvent::Quit);
    assert_eq!(game.run(&mut engine), 1);
    assert_eq!(game.state(), LoopState::Stopped);
}

#[test]
fn test_demo_runs_headless() {
    use lovejs::{App, LoveConfig, Mode};

    let demo = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/main.js");
    let mut config = LoveConfig::default();
    config.game_loop.headless = true;
    config.game_loop.max_frames = Some(5);
    let summary = App::new(config).run(Mode::Run(Some(demo))).unwrap();
    assert_eq!(summary.frames, 5);
}
