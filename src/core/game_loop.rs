//! 帧循环
//!
//! 通过 [`Engine::call_global`] 驱动脚本回调：`load` 一次，之后每帧依次
//! 分发输入事件、`update(dt)`、`draw()`（包在 `begin_frame`/`end_frame`
//! 之间），最后清空脚本的待处理任务队列。

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::platform::{InputEvent, SharedBackend};
use crate::scripting::Engine;

/// 帧循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Loaded,
    Running,
    Stopped,
}

/// Requests the loop to stop before its next callback.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Rc<Cell<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.get()
    }
}

pub struct GameLoop {
    backend: SharedBackend,
    state: LoopState,
    stop: StopHandle,
    max_frames: Option<u64>,
    frame_interval: Option<Duration>,
    frame_count: u64,
    last_frame: Option<Instant>,
}

impl GameLoop {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            state: LoopState::NotStarted,
            stop: StopHandle::default(),
            max_frames: None,
            frame_interval: None,
            frame_count: 0,
            last_frame: None,
        }
    }

    /// Stop after `frames` frames.
    pub fn with_max_frames(mut self, frames: Option<u64>) -> Self {
        self.max_frames = frames;
        self
    }

    /// Sleep so that frames are at least `interval` apart.
    pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Calls `load()` once; later calls do nothing.
    pub fn load(&mut self, engine: &mut Engine) {
        if self.state != LoopState::NotStarted {
            return;
        }
        if self.stop.is_stopped() {
            self.halt();
            return;
        }
        engine.call_global("load", ());
        engine.run_pending_jobs();
        self.state = LoopState::Loaded;
        debug!(target: "game_loop", "load() done");
    }

    /// One frame with the measured `dt`; `false` once the loop has stopped.
    pub fn frame(&mut self, engine: &mut Engine) -> bool {
        let now = Instant::now();
        let dt = self
            .last_frame
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_frame = Some(now);
        self.step(engine, dt)
    }

    /// One frame with an explicit `dt` in seconds.
    pub fn step(&mut self, engine: &mut Engine, dt: f64) -> bool {
        match self.state {
            LoopState::Stopped => return false,
            LoopState::NotStarted => self.load(engine),
            _ => {}
        }
        if self.should_stop() {
            return self.halt();
        }
        self.state = LoopState::Running;

        let events = self.backend.borrow_mut().poll_events();
        for event in events {
            if !self.dispatch(engine, event) || self.should_stop() {
                return self.halt();
            }
        }

        engine.call_global("update", (dt,));
        if self.should_stop() {
            return self.halt();
        }

        self.backend.borrow_mut().begin_frame();
        engine.call_global("draw", ());
        self.backend.borrow_mut().end_frame();
        engine.run_pending_jobs();

        self.frame_count += 1;
        if self.max_frames.is_some_and(|max| self.frame_count >= max) {
            info!(target: "game_loop", "frame limit of {} reached", self.frame_count);
            return self.halt();
        }
        !self.should_stop() || self.halt()
    }

    /// Runs until stopped; returns the number of completed frames.
    pub fn run(&mut self, engine: &mut Engine) -> u64 {
        self.load(engine);
        info!(target: "game_loop", "entering frame loop");
        loop {
            let started = Instant::now();
            if !self.frame(engine) {
                break;
            }
            if let Some(interval) = self.frame_interval {
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
        }
        info!(target: "game_loop", "stopped after {} frames", self.frame_count);
        self.frame_count
    }

    /// Sends one event to its callback; `false` for quit.
    fn dispatch(&mut self, engine: &mut Engine, event: InputEvent) -> bool {
        match event {
            InputEvent::Quit => {
                info!(target: "game_loop", "quit requested by backend");
                return false;
            }
            InputEvent::KeyPressed { repeat: true, .. } => {}
            InputEvent::KeyPressed { key, .. } => {
                engine.call_global("keypressed", (key.name().to_string(),));
            }
            InputEvent::KeyReleased { key } => {
                engine.call_global("keyreleased", (key.name().to_string(),));
            }
            InputEvent::MousePressed { x, y, button } => {
                engine.call_global("mousepressed", (x, y, button.number()));
            }
            InputEvent::MouseReleased { x, y, button } => {
                engine.call_global("mousereleased", (x, y, button.number()));
            }
            InputEvent::WheelMoved { x, y } => {
                engine.call_global("wheelmoved", (x, y));
            }
        }
        true
    }

    fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }

    fn halt(&mut self) -> bool {
        self.state = LoopState::Stopped;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{HeadlessBackend, Key, MouseButton};
    use std::cell::RefCell;

    fn setup(script: &str) -> (Engine, Rc<RefCell<HeadlessBackend>>, Rc<RefCell<Vec<String>>>) {
        let mut engine = Engine::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        engine.global().func("log", move |entry: String| sink.borrow_mut().push(entry));
        engine.initialize().unwrap();
        assert!(engine.run_source(script, "main.js"));
        (engine, Rc::new(RefCell::new(HeadlessBackend::default())), log)
    }

    #[test]
    fn test_frame_order() {
        let (mut engine, backend, log) = setup(
            "export function load() { log('load'); }\n\
             export function update(dt) { log('update ' + dt); }\n\
             export function draw() { log('draw'); }\n\
             export function keypressed(k) { log('key ' + k); }",
        );
        backend.borrow_mut().push_event(InputEvent::KeyPressed { key: Key::Space, repeat: false });
        let mut game = GameLoop::new(backend.clone());
        assert!(game.step(&mut engine, 0.5));
        assert!(game.step(&mut engine, 0.25));
        assert_eq!(game.state(), LoopState::Running);
        assert_eq!(
            *log.borrow(),
            vec!["load", "key space", "update 0.5", "draw", "update 0.25", "draw"]
        );
        assert_eq!(backend.borrow().frames(), 2);
    }

    #[test]
    fn test_repeats_skipped_and_mouse_numbers() {
        let (mut engine, backend, log) = setup(
            "export function keypressed(k) { log('down ' + k); }\n\
             export function keyreleased(k) { log('up ' + k); }\n\
             export function mousepressed(x, y, b) { log(`press ${x},${y},${b}`); }\n\
             export function wheelmoved(x, y) { log(`wheel ${x},${y}`); }",
        );
        {
            let mut backend = backend.borrow_mut();
            backend.push_event(InputEvent::KeyPressed { key: Key::A, repeat: false });
            backend.push_event(InputEvent::KeyPressed { key: Key::A, repeat: true });
            backend.push_event(InputEvent::KeyReleased { key: Key::A });
            backend.push_event(InputEvent::MousePressed { x: 10.0, y: 20.0, button: MouseButton::Right });
            backend.push_event(InputEvent::WheelMoved { x: 0.0, y: -1.0 });
        }
        let mut game = GameLoop::new(backend);
        game.step(&mut engine, 0.0);
        assert_eq!(
            *log.borrow(),
            vec!["down a", "up a", "press 10,20,2", "wheel 0,-1"]
        );
    }

    #[test]
    fn test_quit_stops_before_callbacks() {
        let (mut engine, backend, log) = setup(
            "export function update() { log('update'); }\n\
             export function keypressed(k) { log(k); }",
        );
        backend.borrow_mut().push_event(InputEvent::Quit);
        backend.borrow_mut().push_event(InputEvent::KeyPressed { key: Key::B, repeat: false });
        let mut game = GameLoop::new(backend);
        assert!(!game.step(&mut engine, 0.1));
        assert_eq!(game.state(), LoopState::Stopped);
        assert!(!game.step(&mut engine, 0.1));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_stop_handle_from_script() {
        let mut engine = Engine::default();
        let backend = Rc::new(RefCell::new(HeadlessBackend::default()));
        let mut game = GameLoop::new(backend);
        let handle = game.stop_handle();
        let draws = Rc::new(Cell::new(0));
        let counter = Rc::clone(&draws);
        engine
            .global()
            .func("quit", move || handle.stop())
            .func("drew", move || counter.set(counter.get() + 1));
        engine.initialize().unwrap();
        assert!(engine.run_source(
            "let n = 0; export function update() { if (++n === 3) quit(); }\nexport function draw() { drew(); }",
            "main.js",
        ));
        assert_eq!(game.run(&mut engine), 2);
        assert_eq!(draws.get(), 2);
        assert_eq!(game.state(), LoopState::Stopped);
    }

    #[test]
    fn test_frame_limit_and_broken_callbacks() {
        let (mut engine, backend, _) = setup("export function update() { throw new Error('broken'); }");
        let errors = Rc::new(Cell::new(0));
        let sink = Rc::clone(&errors);
        engine.set_error_reporter(move |_| sink.set(sink.get() + 1));
        let mut game = GameLoop::new(backend).with_max_frames(Some(4));
        assert_eq!(game.run(&mut engine), 4);
        assert_eq!(errors.get(), 4);
    }

    #[test]
    fn test_load_runs_once() {
        let (mut engine, backend, log) = setup("export function load() { log('load'); }");
        let mut game = GameLoop::new(backend);
        game.load(&mut engine);
        game.load(&mut engine);
        game.step(&mut engine, 0.0);
        assert_eq!(game.state(), LoopState::Running);
        assert_eq!(*log.borrow(), vec!["load"]);
    }
}
