//! 无头后端
//!
//! 不打开窗口：绘制记录到 [`DisplayList`]，输入事件来自预先排队的队列。
//! 用于测试与 `--headless` 运行。

use std::collections::VecDeque;

use super::{Backend, Color, DisplayList, InputEvent, Rect, Size, TextureHandle};

#[derive(Debug)]
pub struct HeadlessBackend {
    list: DisplayList,
    title: String,
    size: Size,
    window_created: bool,
    events: VecDeque<InputEvent>,
    frames: u64,
}

impl HeadlessBackend {
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            list: DisplayList::new(),
            title: title.into(),
            size: Size { width, height },
            window_created: false,
            events: VecDeque::new(),
            frames: 0,
        }
    }

    /// Queue an event for the next `poll_events`.
    pub fn push_event(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn display_list(&self) -> &DisplayList {
        &self.list
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn window_created(&self) -> bool {
        self.window_created
    }

    /// Frames completed through `end_frame`.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new("LoveJS", 800, 600)
    }
}

impl Backend for HeadlessBackend {
    fn create_window(&mut self, title: &str, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            tracing::warn!(target: "platform", "rejected window size {}x{}", width, height);
            return false;
        }
        self.title = title.to_string();
        self.size = Size { width, height };
        self.window_created = true;
        true
    }

    fn window_size(&self) -> Size {
        self.size
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
        self.frames += 1;
    }

    fn poll_events(&mut self) -> Vec<InputEvent> {
        self.events.drain(..).collect()
    }
}
