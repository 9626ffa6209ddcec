//! 平台抽象层
//!
//! 脚本通过 `graphics` 模块使用的后端能力对象：窗口、基本图形、纹理、
//! 变换栈、文本，以及帧循环消费的输入事件。

pub mod display_list;
pub mod headless;
#[cfg(not(any(target_arch = "wasm32", target_os = "ios")))]
pub mod winit;

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub use display_list::{DisplayList, DrawCommand};
pub use headless::HeadlessBackend;
#[cfg(not(any(target_arch = "wasm32", target_os = "ios")))]
pub use self::winit::WinitBackend;

// ============================================================================
// Drawing Types
// ============================================================================

/// RGBA 颜色，分量范围 0..=1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Components clamped into `0..=1`.
    pub fn clamped(r: f64, g: f64, b: f64, a: f64) -> Self {
        let c = |v: f64| v.clamp(0.0, 1.0) as f32;
        Self::rgba(c(r), c(g), c(b), c(a))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// 已加载纹理的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

// ============================================================================
// Input Abstraction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Space, Escape, Return, Tab, Backspace, Insert, Delete,
    Left, Right, Up, Down, PageUp, PageDown, Home, End,
    Apostrophe, Comma, Minus, Period, Slash, Semicolon, Equal,
    LeftBracket, Backslash, RightBracket,
    Unknown,
}

impl Key {
    /// 脚本回调使用的小写键名
    pub fn name(self) -> &'static str {
        use Key::*;
        match self {
            A => "a", B => "b", C => "c", D => "d", E => "e", F => "f", G => "g",
            H => "h", I => "i", J => "j", K => "k", L => "l", M => "m", N => "n",
            O => "o", P => "p", Q => "q", R => "r", S => "s", T => "t", U => "u",
            V => "v", W => "w", X => "x", Y => "y", Z => "z",
            Num0 => "0", Num1 => "1", Num2 => "2", Num3 => "3", Num4 => "4",
            Num5 => "5", Num6 => "6", Num7 => "7", Num8 => "8", Num9 => "9",
            F1 => "f1", F2 => "f2", F3 => "f3", F4 => "f4", F5 => "f5", F6 => "f6",
            F7 => "f7", F8 => "f8", F9 => "f9", F10 => "f10", F11 => "f11", F12 => "f12",
            Space => "space",
            Escape => "escape",
            Return => "return",
            Tab => "tab",
            Backspace => "backspace",
            Insert => "insert",
            Delete => "delete",
            Left => "left",
            Right => "right",
            Up => "up",
            Down => "down",
            PageUp => "pageup",
            PageDown => "pagedown",
            Home => "home",
            End => "end",
            Apostrophe => "'",
            Comma => ",",
            Minus => "-",
            Period => ".",
            Slash => "/",
            Semicolon => ";",
            Equal => "=",
            LeftBracket => "[",
            Backslash => "\\",
            RightBracket => "]",
            Unknown => "unknown",
        }
    }

    /// Key for a single typed character (letters case-insensitive).
    pub fn from_char(c: char) -> Key {
        use Key::*;
        const LETTERS: [Key; 26] = [A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, T, U, V, W, X, Y, Z];
        const DIGITS: [Key; 10] = [Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9];
        match c.to_ascii_lowercase() {
            l @ 'a'..='z' => LETTERS[(l as u8 - b'a') as usize],
            d @ '0'..='9' => DIGITS[(d as u8 - b'0') as usize],
            ' ' => Space,
            '\'' => Apostrophe,
            ',' => Comma,
            '-' => Minus,
            '.' => Period,
            '/' => Slash,
            ';' => Semicolon,
            '=' => Equal,
            '[' => LeftBracket,
            '\\' => Backslash,
            ']' => RightBracket,
            _ => Unknown,
        }
    }
}

/// 鼠标按键，编号与脚本回调一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u16),
}

impl MouseButton {
    /// 1 left, 2 right, 3 middle, 4 back, 5 forward.
    pub fn number(self) -> i32 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Right => 2,
            MouseButton::Middle => 3,
            MouseButton::Back => 4,
            MouseButton::Forward => 5,
            MouseButton::Other(n) => 6 + i32::from(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyPressed { key: Key, repeat: bool },
    KeyReleased { key: Key },
    MousePressed { x: f64, y: f64, button: MouseButton },
    MouseReleased { x: f64, y: f64, button: MouseButton },
    WheelMoved { x: f64, y: f64 },
    Quit,
}

// ============================================================================
// Backend Capability
// ============================================================================

/// 渲染/窗口后端能力
pub trait Backend {
    fn create_window(&mut self, title: &str, width: u32, height: u32) -> bool;
    fn window_size(&self) -> Size;

    fn clear(&mut self, color: Color);
    fn present(&mut self);
    fn set_color(&mut self, color: Color);

    fn draw_point(&mut self, x: f32, y: f32);
    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32);
    fn draw_rect(&mut self, rect: Rect, filled: bool);
    fn draw_circle(&mut self, x: f32, y: f32, radius: f32, filled: bool);

    /// `None` when the file is missing or not a decodable image.
    fn load_texture(&mut self, path: &str) -> Option<TextureHandle>;
    fn draw_texture(&mut self, texture: TextureHandle, x: f32, y: f32, rotation: f32, scale_x: f32, scale_y: f32);

    fn push(&mut self);
    fn pop(&mut self);
    fn translate(&mut self, x: f32, y: f32);
    fn rotate(&mut self, angle: f32);
    fn scale(&mut self, x: f32, y: f32);

    fn draw_text(&mut self, text: &str, x: f32, y: f32);

    fn begin_frame(&mut self) {}
    fn end_frame(&mut self) {}

    /// Events since the previous call, in arrival order.
    fn poll_events(&mut self) -> Vec<InputEvent>;
}

/// 共享后端：绑定函数与帧循环共同持有
pub type SharedBackend = Rc<RefCell<dyn Backend>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(Key::Space.name(), "space");
        assert_eq!(Key::Return.name(), "return");
        assert_eq!(Key::F12.name(), "f12");
        assert_eq!(Key::Backslash.name(), "\\");
        assert_eq!(Key::Unknown.name(), "unknown");
    }

    #[test]
    fn test_key_from_char() {
        assert_eq!(Key::from_char('Q'), Key::Q);
        assert_eq!(Key::from_char('q').name(), "q");
        assert_eq!(Key::from_char('7').name(), "7");
        assert_eq!(Key::from_char(']'), Key::RightBracket);
        assert_eq!(Key::from_char('é'), Key::Unknown);
    }

    #[test]
    fn test_mouse_button_numbers() {
        assert_eq!(MouseButton::Left.number(), 1);
        assert_eq!(MouseButton::Right.number(), 2);
        assert_eq!(MouseButton::Middle.number(), 3);
        assert_eq!(MouseButton::Forward.number(), 5);
    }

    #[test]
    fn test_color_clamping() {
        assert_eq!(Color::clamped(2.0, -1.0, 0.5, 1.0), Color::rgba(1.0, 0.0, 0.5, 1.0));
    }
}
