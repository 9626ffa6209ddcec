//! `graphics` 模块
//!
//! 窗口、渲染控制、基本图形、纹理、变换栈与文本；颜色常量以
//! `[r, g, b, a]` 数组导出，分量范围 0..=1。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::platform::{Backend, Color, Rect, SharedBackend, TextureHandle};
use crate::scripting::Namespace;

const COLORS: [(&str, [f64; 4]); 8] = [
    ("WHITE", [1.0, 1.0, 1.0, 1.0]),
    ("BLACK", [0.0, 0.0, 0.0, 1.0]),
    ("RED", [1.0, 0.0, 0.0, 1.0]),
    ("GREEN", [0.0, 1.0, 0.0, 1.0]),
    ("BLUE", [0.0, 0.0, 1.0, 1.0]),
    ("YELLOW", [1.0, 1.0, 0.0, 1.0]),
    ("CYAN", [0.0, 1.0, 1.0, 1.0]),
    ("MAGENTA", [1.0, 0.0, 1.0, 1.0]),
];

/// Runs `f` on the backend; a busy backend becomes a script error.
fn with<R>(backend: &SharedBackend, f: impl FnOnce(&mut dyn Backend) -> R) -> Result<R, String> {
    let mut guard = backend
        .try_borrow_mut()
        .map_err(|_| "graphics backend is busy".to_string())?;
    Ok(f(&mut *guard))
}

/// Texture ids handed to scripts are the paths they were loaded from.
#[derive(Default)]
struct TextureTable {
    by_id: HashMap<String, TextureHandle>,
}

impl TextureTable {
    fn resolve(&mut self, backend: &mut dyn Backend, id: &str) -> Option<TextureHandle> {
        if let Some(handle) = self.by_id.get(id) {
            return Some(*handle);
        }
        let handle = backend.load_texture(id)?;
        self.by_id.insert(id.to_string(), handle);
        Some(handle)
    }
}

pub fn register(root: &mut Namespace, backend: SharedBackend) {
    let textures = Rc::new(RefCell::new(TextureTable::default()));
    let g = root.module("graphics");

    // 窗口
    let b = Rc::clone(&backend);
    g.func("setWindow", move |title: String, width: i32, height: i32| -> Result<(), String> {
        let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(format!("invalid window size {width}x{height}"));
        };
        if with(&b, |be| be.create_window(&title, w, h))? {
            Ok(())
        } else {
            Err(format!("cannot create window {w}x{h}"))
        }
    });
    let b = Rc::clone(&backend);
    g.func("getWindowSize", move || {
        with(&b, |be| {
            let size = be.window_size();
            vec![f64::from(size.width), f64::from(size.height)]
        })
    });

    // 渲染
    let b = Rc::clone(&backend);
    g.func("clear", move |r: f64, gr: f64, bl: f64, a: f64| {
        with(&b, |be| be.clear(Color::clamped(r, gr, bl, a)))
    });
    let b = Rc::clone(&backend);
    g.func("present", move || with(&b, |be| be.present()));
    let b = Rc::clone(&backend);
    g.func("setColor", move |r: f64, gr: f64, bl: f64, a: f64| {
        with(&b, |be| be.set_color(Color::clamped(r, gr, bl, a)))
    });

    // 图形
    let b = Rc::clone(&backend);
    g.func("point", move |x: f64, y: f64| with(&b, |be| be.draw_point(x as f32, y as f32)));
    let b = Rc::clone(&backend);
    g.func("line", move |x1: f64, y1: f64, x2: f64, y2: f64| {
        with(&b, |be| be.draw_line(x1 as f32, y1 as f32, x2 as f32, y2 as f32))
    });
    let b = Rc::clone(&backend);
    g.func("rectangle", move |x: f64, y: f64, w: f64, h: f64, filled: bool| {
        let rect = Rect {
            x: x as f32,
            y: y as f32,
            w: w as f32,
            h: h as f32,
        };
        with(&b, |be| be.draw_rect(rect, filled))
    });
    let b = Rc::clone(&backend);
    g.func("circle", move |x: f64, y: f64, radius: f64, filled: bool| {
        with(&b, |be| be.draw_circle(x as f32, y as f32, radius as f32, filled))
    });

    // 纹理
    let b = Rc::clone(&backend);
    let t = Rc::clone(&textures);
    g.func("loadTexture", move |path: String| {
        with(&b, |be| match t.borrow_mut().resolve(be, &path) {
            Some(_) => path.clone(),
            None => String::new(),
        })
    });
    let b = Rc::clone(&backend);
    let t = Rc::clone(&textures);
    g.func(
        "drawTexture",
        move |id: String, x: f64, y: f64, rotation: f64, sx: f64, sy: f64| {
            with(&b, |be| {
                // Unknown ids draw nothing.
                if let Some(handle) = t.borrow_mut().resolve(be, &id) {
                    be.draw_texture(handle, x as f32, y as f32, rotation as f32, sx as f32, sy as f32);
                }
            })
        },
    );

    // 变换
    let b = Rc::clone(&backend);
    g.func("push", move || with(&b, |be| be.push()));
    let b = Rc::clone(&backend);
    g.func("pop", move || with(&b, |be| be.pop()));
    let b = Rc::clone(&backend);
    g.func("translate", move |x: f64, y: f64| with(&b, |be| be.translate(x as f32, y as f32)));
    let b = Rc::clone(&backend);
    g.func("rotate", move |angle: f64| with(&b, |be| be.rotate(angle as f32)));
    let b = Rc::clone(&backend);
    g.func("scale", move |x: f64, y: f64| with(&b, |be| be.scale(x as f32, y as f32)));

    // 文本
    let b = backend;
    g.func("print", move |text: String, x: f64, y: f64| {
        with(&b, |be| be.draw_text(&text, x as f32, y as f32))
    });

    // 颜色常量
    for (name, rgba) in COLORS {
        g.value(name, rgba.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::display_list::Shape;
    use crate::platform::{HeadlessBackend, Size};
    use crate::scripting::Engine;
    use glam::Vec2;

    fn engine_with(backend: &Rc<RefCell<HeadlessBackend>>) -> Engine {
        let mut engine = Engine::default();
        let shared: SharedBackend = backend.clone();
        register(&mut engine.global(), shared);
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn test_drawing_reaches_backend() {
        let backend = Rc::new(RefCell::new(HeadlessBackend::default()));
        let mut engine = engine_with(&backend);
        assert!(engine.run_source(
            "import * as g from 'graphics';\n\
             g.setWindow('Demo', 640, 480);\n\
             g.clear(0, 0, 0, 1);\n\
             g.setColor(...g.RED);\n\
             g.push(); g.translate(100, 50); g.rectangle(0, 0, 10, 20, true); g.pop();\n\
             g.circle(5, 5, 3, false);\n\
             g.print('score', 1, 2);\n\
             g.present();",
            "main.js",
        ));

        let backend = backend.borrow();
        assert_eq!(backend.title(), "Demo");
        assert_eq!(backend.window_size(), Size { width: 640, height: 480 });
        let list = backend.display_list();
        assert_eq!(list.frames_presented(), 1);
        let commands = list.commands();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0].shape, Shape::Clear);
        assert_eq!(commands[1].color, Color::rgba(1.0, 0.0, 0.0, 1.0));
        assert_eq!(commands[1].to_screen(Vec2::ZERO), Vec2::new(100.0, 50.0));
        assert_eq!(commands[2].to_screen(Vec2::ZERO), Vec2::ZERO);
        assert!(matches!(&commands[3].shape, Shape::Text { text, .. } if text == "score"));
    }

    #[test]
    fn test_window_size_round_trip_and_validation() {
        let backend = Rc::new(RefCell::new(HeadlessBackend::new("t", 300, 200)));
        let mut engine = engine_with(&backend);
        assert!(engine.eval_script(
            "const [w, h] = graphics.getWindowSize(); if (w !== 300 || h !== 200) throw new Error(`${w}x${h}`);",
            "size",
        ));
        assert!(!engine.eval_script("graphics.setWindow('x', -1, 10);", "neg"));
        assert!(!engine.eval_script("graphics.setWindow('x', 0, 10);", "zero"));
    }

    #[test]
    fn test_textures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hero.png");
        image::RgbaImage::new(8, 8).save(&path).unwrap();

        let backend = Rc::new(RefCell::new(HeadlessBackend::default()));
        let mut engine = engine_with(&backend);
        let source = format!(
            "const id = graphics.loadTexture({path:?});\n\
             if (id !== {path:?}) throw new Error('bad id ' + id);\n\
             if (graphics.loadTexture('missing.png') !== '') throw new Error('missing loaded');\n\
             graphics.drawTexture(id, 1, 2, 0, 2, 2);\n\
             graphics.drawTexture('missing.png', 1, 2, 0, 1, 1);",
            path = path.to_string_lossy()
        );
        assert!(engine.eval_script(&source, "tex"));
        let backend = backend.borrow();
        let commands = backend.display_list().commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0].shape, Shape::Texture { scale, .. } if scale == Vec2::new(2.0, 2.0)));
    }

    #[test]
    fn test_color_constants_are_fresh_arrays() {
        let backend = Rc::new(RefCell::new(HeadlessBackend::default()));
        let mut engine = engine_with(&backend);
        assert!(engine.run_source(
            "import { WHITE } from 'graphics';\n\
             WHITE[0] = 0;\n\
             if (graphics.WHITE[0] !== 1) throw new Error('shared constant');\n\
             if (graphics.MAGENTA.join() !== '1,0,1,1') throw new Error('magenta');",
            "main.js",
        ));
    }
}
