use std::time::Duration;

use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseScrollDelta, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window as WinitWindowRaw, WindowBuilder};

use super::{Backend, Color, DisplayList, InputEvent, Key, MouseButton, Rect, Size, TextureHandle};
use crate::core::error::{EngineError, EngineResult};

/// 基于 winit 的桌面后端
///
/// 事件通过 `pump_events` 非阻塞轮询；绘制命令记录在 [`DisplayList`] 中。
pub struct WinitBackend {
    event_loop: EventLoop<()>,
    window: Option<WinitWindowRaw>,
    title: String,
    size: Size,
    list: DisplayList,
    cursor: (f64, f64),
}

impl WinitBackend {
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> EngineResult<Self> {
        let event_loop = EventLoop::new().map_err(|e| EngineError::Platform(e.to_string()))?;
        Ok(Self {
            event_loop,
            window: None,
            title: title.into(),
            size: Size { width, height },
            list: DisplayList::new(),
            cursor: (0.0, 0.0),
        })
    }

    pub fn display_list(&self) -> &DisplayList {
        &self.list
    }
}

impl Backend for WinitBackend {
    fn create_window(&mut self, title: &str, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            tracing::warn!(target: "platform", "rejected window size {}x{}", width, height);
            return false;
        }
        self.title = title.to_string();
        self.size = Size { width, height };

        if let Some(window) = &self.window {
            window.set_title(title);
            let _ = window.request_inner_size(PhysicalSize::new(width, height));
            return true;
        }
        match WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&self.event_loop)
        {
            Ok(window) => {
                tracing::info!(target: "platform", "window '{}' created ({}x{})", title, width, height);
                self.window = Some(window);
                true
            }
            Err(err) => {
                tracing::error!(target: "platform", "failed to create window: {}", err);
                false
            }
        }
    }

    fn window_size(&self) -> Size {
        match &self.window {
            Some(window) => {
                let s = window.inner_size();
                Size { width: s.width, height: s.height }
            }
            None => self.size,
        }
    }

    fn clear(&mut self, color: Color) {
        self.list.clear(color);
    }

    fn present(&mut self) {
        self.list.present();
    }

    fn set_color(&mut self, color: Color) {
        self.list.set_color(color);
    }

    fn draw_point(&mut self, x: f32, y: f32) {
        self.list.draw_point(x, y);
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.list.draw_line(x1, y1, x2, y2);
    }

    fn draw_rect(&mut self, rect: Rect, filled: bool) {
        self.list.draw_rect(rect, filled);
    }

    fn draw_circle(&mut self, x: f32, y: f32, radius: f32, filled: bool) {
        self.list.draw_circle(x, y, radius, filled);
    }

    fn load_texture(&mut self, path: &str) -> Option<TextureHandle> {
        self.list.load_texture(path)
    }

    fn draw_texture(&mut self, texture: TextureHandle, x: f32, y: f32, rotation: f32, scale_x: f32, scale_y: f32) {
        self.list.draw_texture(texture, x, y, rotation, scale_x, scale_y);
    }

    fn push(&mut self) {
        self.list.push();
    }

    fn pop(&mut self) {
        self.list.pop();
    }

    fn translate(&mut self, x: f32, y: f32) {
        self.list.translate(x, y);
    }

    fn rotate(&mut self, angle: f32) {
        self.list.rotate(angle);
    }

    fn scale(&mut self, x: f32, y: f32) {
        self.list.scale(x, y);
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32) {
        self.list.draw_text(text, x, y);
    }

    fn begin_frame(&mut self) {
        self.list.begin_frame();
    }

    fn end_frame(&mut self) {
        tracing::trace!(target: "platform", "frame recorded {} commands", self.list.commands().len());
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn poll_events(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        let cursor = &mut self.cursor;
        let status = self.event_loop.pump_events(Some(Duration::ZERO), |event, _elwt| {
            if let Event::WindowEvent { event, .. } = event {
                if let Some(input) = translate_window_event(&event, cursor) {
                    events.push(input);
                }
            }
        });
        if let PumpStatus::Exit(code) = status {
            tracing::info!(target: "platform", "event loop exited with code {}", code);
            events.push(InputEvent::Quit);
        }
        events
    }
}

fn translate_window_event(event: &WindowEvent, cursor: &mut (f64, f64)) -> Option<InputEvent> {
    match event {
        WindowEvent::CloseRequested => Some(InputEvent::Quit),
        WindowEvent::CursorMoved { position, .. } => {
            *cursor = (position.x, position.y);
            None
        }
        WindowEvent::MouseInput { state, button, .. } => {
            let (x, y) = *cursor;
            let button = map_mouse_button(*button);
            Some(match state {
                ElementState::Pressed => InputEvent::MousePressed { x, y, button },
                ElementState::Released => InputEvent::MouseReleased { x, y, button },
            })
        }
        WindowEvent::MouseWheel { delta, .. } => {
            let (x, y) = match delta {
                MouseScrollDelta::LineDelta(x, y) => (f64::from(*x), f64::from(*y)),
                MouseScrollDelta::PixelDelta(p) => (p.x, p.y),
            };
            Some(InputEvent::WheelMoved { x, y })
        }
        WindowEvent::KeyboardInput { event, .. } => {
            let key = match event.physical_key {
                PhysicalKey::Code(code) => map_key_code(code),
                PhysicalKey::Unidentified(_) => Key::Unknown,
            };
            Some(match event.state {
                ElementState::Pressed => InputEvent::KeyPressed { key, repeat: event.repeat },
                ElementState::Released => InputEvent::KeyReleased { key },
            })
        }
        _ => None,
    }
}

fn map_mouse_button(button: winit::event::MouseButton) -> MouseButton {
    match button {
        winit::event::MouseButton::Left => MouseButton::Left,
        winit::event::MouseButton::Right => MouseButton::Right,
        winit::event::MouseButton::Middle => MouseButton::Middle,
        winit::event::MouseButton::Back => MouseButton::Back,
        winit::event::MouseButton::Forward => MouseButton::Forward,
        winit::event::MouseButton::Other(b) => MouseButton::Other(b),
    }
}

/// Physical key position to canonical key.
fn map_key_code(code: KeyCode) -> Key {
    match code {
        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,
        KeyCode::Digit0 => Key::Num0,
        KeyCode::Digit1 => Key::Num1,
        KeyCode::Digit2 => Key::Num2,
        KeyCode::Digit3 => Key::Num3,
        KeyCode::Digit4 => Key::Num4,
        KeyCode::Digit5 => Key::Num5,
        KeyCode::Digit6 => Key::Num6,
        KeyCode::Digit7 => Key::Num7,
        KeyCode::Digit8 => Key::Num8,
        KeyCode::Digit9 => Key::Num9,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        KeyCode::F6 => Key::F6,
        KeyCode::F7 => Key::F7,
        KeyCode::F8 => Key::F8,
        KeyCode::F9 => Key::F9,
        KeyCode::F10 => Key::F10,
        KeyCode::F11 => Key::F11,
        KeyCode::F12 => Key::F12,
        KeyCode::Space => Key::Space,
        KeyCode::Escape => Key::Escape,
        KeyCode::Enter | KeyCode::NumpadEnter => Key::Return,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Insert => Key::Insert,
        KeyCode::Delete => Key::Delete,
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Quote => Key::Apostrophe,
        KeyCode::Comma => Key::Comma,
        KeyCode::Minus => Key::Minus,
        KeyCode::Period => Key::Period,
        KeyCode::Slash => Key::Slash,
        KeyCode::Semicolon => Key::Semicolon,
        KeyCode::Equal => Key::Equal,
        KeyCode::BracketLeft => Key::LeftBracket,
        KeyCode::Backslash => Key::Backslash,
        KeyCode::BracketRight => Key::RightBracket,
        _ => Key::Unknown,
    }
}
