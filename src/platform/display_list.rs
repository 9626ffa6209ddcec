//! Recorded draw commands.
//!
//! Backends keep the drawing state here (current colour, transform stack,
//! texture cache) and hand the recorded commands to whatever presents them.

use std::collections::HashMap;

use glam::{Affine2, Vec2};

use super::{Color, Rect, Size, TextureHandle};

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Clear,
    Point(Vec2),
    Line(Vec2, Vec2),
    Rect { rect: Rect, filled: bool },
    Circle { center: Vec2, radius: f32, filled: bool },
    Texture { texture: TextureHandle, position: Vec2, rotation: f32, scale: Vec2 },
    Text { text: String, position: Vec2 },
}

/// One recorded command with the state it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub shape: Shape,
    pub color: Color,
    pub transform: Affine2,
}

impl DrawCommand {
    /// `point` mapped through the command's transform.
    pub fn to_screen(&self, point: Vec2) -> Vec2 {
        self.transform.transform_point2(point)
    }
}

#[derive(Debug, Clone)]
struct TextureInfo {
    path: String,
    size: Size,
}

#[derive(Debug)]
pub struct DisplayList {
    color: Color,
    transform: Affine2,
    stack: Vec<Affine2>,
    commands: Vec<DrawCommand>,
    textures: Vec<TextureInfo>,
    by_path: HashMap<String, TextureHandle>,
    frames_presented: u64,
}

impl Default for DisplayList {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayList {
    pub fn new() -> Self {
        Self {
            color: Color::WHITE,
            transform: Affine2::IDENTITY,
            stack: Vec::new(),
            commands: Vec::new(),
            textures: Vec::new(),
            by_path: HashMap::new(),
            frames_presented: 0,
        }
    }

    fn record(&mut self, shape: Shape) {
        self.commands.push(DrawCommand {
            shape,
            color: self.color,
            transform: self.transform,
        });
    }

    /// Drops last frame's commands and resets the transform.
    pub fn begin_frame(&mut self) {
        self.commands.clear();
        if !self.stack.is_empty() {
            tracing::warn!(target: "platform", "{} unbalanced push() at end of frame", self.stack.len());
            self.stack.clear();
        }
        self.transform = Affine2::IDENTITY;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn transform(&self) -> Affine2 {
        self.transform
    }

    pub fn clear(&mut self, color: Color) {
        self.commands.push(DrawCommand {
            shape: Shape::Clear,
            color,
            transform: Affine2::IDENTITY,
        });
    }

    pub fn present(&mut self) {
        self.frames_presented += 1;
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn draw_point(&mut self, x: f32, y: f32) {
        self.record(Shape::Point(Vec2::new(x, y)));
    }

    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.record(Shape::Line(Vec2::new(x1, y1), Vec2::new(x2, y2)));
    }

    pub fn draw_rect(&mut self, rect: Rect, filled: bool) {
        self.record(Shape::Rect { rect, filled });
    }

    pub fn draw_circle(&mut self, x: f32, y: f32, radius: f32, filled: bool) {
        self.record(Shape::Circle {
            center: Vec2::new(x, y),
            radius,
            filled,
        });
    }

    /// 加载纹理（按路径缓存）
    pub fn load_texture(&mut self, path: &str) -> Option<TextureHandle> {
        if let Some(handle) = self.by_path.get(path) {
            return Some(*handle);
        }
        match image::image_dimensions(path) {
            Ok((width, height)) => {
                let handle = TextureHandle(self.textures.len() as u32);
                self.textures.push(TextureInfo {
                    path: path.to_string(),
                    size: Size { width, height },
                });
                self.by_path.insert(path.to_string(), handle);
                tracing::debug!(target: "platform", "loaded texture {} ({}x{})", path, width, height);
                Some(handle)
            }
            Err(err) => {
                tracing::warn!(target: "platform", "cannot load texture {}: {}", path, err);
                None
            }
        }
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<Size> {
        self.textures.get(texture.0 as usize).map(|info| info.size)
    }

    pub fn texture_path(&self, texture: TextureHandle) -> Option<&str> {
        self.textures.get(texture.0 as usize).map(|info| info.path.as_str())
    }

    pub fn draw_texture(&mut self, texture: TextureHandle, x: f32, y: f32, rotation: f32, scale_x: f32, scale_y: f32) {
        if self.texture_size(texture).is_none() {
            tracing::warn!(target: "platform", "draw of unknown texture {:?}", texture);
            return;
        }
        self.record(Shape::Texture {
            texture,
            position: Vec2::new(x, y),
            rotation,
            scale: Vec2::new(scale_x, scale_y),
        });
    }

    pub fn push(&mut self) {
        self.stack.push(self.transform);
    }

    /// Popping an empty stack is ignored.
    pub fn pop(&mut self) {
        match self.stack.pop() {
            Some(transform) => self.transform = transform,
            None => tracing::warn!(target: "platform", "pop() without matching push()"),
        }
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        self.transform = self.transform * Affine2::from_translation(Vec2::new(x, y));
    }

    pub fn rotate(&mut self, angle: f32) {
        self.transform = self.transform * Affine2::from_angle(angle);
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.transform = self.transform * Affine2::from_scale(Vec2::new(x, y));
    }

    pub fn draw_text(&mut self, text: &str, x: f32, y: f32) {
        self.record(Shape::Text {
            text: text.to_string(),
            position: Vec2::new(x, y),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_commands_capture_color_and_transform() {
        let mut list = DisplayList::new();
        list.set_color(Color::rgba(1.0, 0.0, 0.0, 1.0));
        list.translate(10.0, 20.0);
        list.draw_point(1.0, 1.0);
        let cmd = &list.commands()[0];
        assert_eq!(cmd.color, Color::rgba(1.0, 0.0, 0.0, 1.0));
        assert!(close(cmd.to_screen(Vec2::new(1.0, 1.0)), Vec2::new(11.0, 21.0)));
    }

    #[test]
    fn test_push_pop_restores_transform() {
        let mut list = DisplayList::new();
        list.translate(5.0, 0.0);
        list.push();
        list.rotate(std::f32::consts::FRAC_PI_2);
        list.scale(2.0, 2.0);
        list.draw_point(1.0, 0.0);
        list.pop();
        list.draw_point(1.0, 0.0);

        let rotated = list.commands()[0].to_screen(Vec2::new(1.0, 0.0));
        assert!(close(rotated, Vec2::new(5.0, 2.0)), "{rotated}");
        let restored = list.commands()[1].to_screen(Vec2::new(1.0, 0.0));
        assert!(close(restored, Vec2::new(6.0, 0.0)));
    }

    #[test]
    fn test_unbalanced_pop_is_ignored() {
        let mut list = DisplayList::new();
        list.translate(3.0, 4.0);
        list.pop();
        assert_eq!(list.transform(), Affine2::from_translation(Vec2::new(3.0, 4.0)));
    }

    #[test]
    fn test_begin_frame_resets_state() {
        let mut list = DisplayList::new();
        list.push();
        list.translate(1.0, 1.0);
        list.draw_line(0.0, 0.0, 1.0, 1.0);
        list.present();
        list.begin_frame();
        assert!(list.commands().is_empty());
        assert_eq!(list.transform(), Affine2::IDENTITY);
        assert_eq!(list.frames_presented(), 1);
    }

    #[test]
    fn test_textures_are_cached_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        image::RgbaImage::new(4, 2).save(&path).unwrap();
        let path = path.to_string_lossy().into_owned();

        let mut list = DisplayList::new();
        let first = list.load_texture(&path).unwrap();
        let second = list.load_texture(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(list.texture_size(first), Some(Size { width: 4, height: 2 }));
        assert_eq!(list.texture_path(first), Some(path.as_str()));

        assert!(list.load_texture("does/not/exist.png").is_none());
        list.draw_texture(TextureHandle(99), 0.0, 0.0, 0.0, 1.0, 1.0);
        assert!(list.commands().is_empty());
    }
}
