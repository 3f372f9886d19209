//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! [`Surface`] mirrors a 2D canvas context; a windowed backend implements it,
//! headless runs use [`NullSurface`] and tests use [`RecordingSurface`].

use crate::{
    math::{Rect, Vec2},
    resources::Texture,
};

/// RGBA color, channels in `0..=255` plus a `0.0..=1.0` alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 1.0)
    }
}

/// Line appearance for [`Surface::stroke_line`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

/// A 2D drawing target with a transform stack.
pub trait Surface {
    fn clear(&mut self);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn stroke_line(&mut self, from: Vec2, to: Vec2, stroke: Stroke);
    /// Pushes the current transform.
    fn save(&mut self);
    fn translate(&mut self, by: Vec2);
    /// Rotates subsequent drawing by `radians` about the current origin.
    fn rotate(&mut self, radians: f32);
    /// Pops the transform pushed by the matching [`Surface::save`].
    fn restore(&mut self);
    fn draw_image(&mut self, texture: &Texture, dest: Rect);
}

/// A surface that discards everything. Used by the headless client.
#[derive(Debug, Default)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn clear(&mut self) {}
    fn fill_rect(&mut self, _rect: Rect, _color: Color) {}
    fn stroke_line(&mut self, _from: Vec2, _to: Vec2, _stroke: Stroke) {}
    fn save(&mut self) {}
    fn translate(&mut self, _by: Vec2) {}
    fn rotate(&mut self, _radians: f32) {}
    fn restore(&mut self) {}
    fn draw_image(&mut self, _texture: &Texture, _dest: Rect) {}
}

/// One recorded drawing call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    Clear,
    FillRect(Rect, Color),
    StrokeLine(Vec2, Vec2, Stroke),
    Save,
    Translate(Vec2),
    Rotate(f32),
    Restore,
    Image { texture: String, dest: Rect },
}

/// A surface that records calls in order, for assertions on draw ordering.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub commands: Vec<DrawCmd>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the textures blitted, in order.
    pub fn images(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCmd::Image { texture, .. } => Some(texture.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn filled_rects(&self) -> Vec<(Rect, Color)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCmd::FillRect(r, col) => Some((*r, *col)),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn clear(&mut self) {
        self.commands.push(DrawCmd::Clear);
    }
    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCmd::FillRect(rect, color));
    }
    fn stroke_line(&mut self, from: Vec2, to: Vec2, stroke: Stroke) {
        self.commands.push(DrawCmd::StrokeLine(from, to, stroke));
    }
    fn save(&mut self) {
        self.commands.push(DrawCmd::Save);
    }
    fn translate(&mut self, by: Vec2) {
        self.commands.push(DrawCmd::Translate(by));
    }
    fn rotate(&mut self, radians: f32) {
        self.commands.push(DrawCmd::Rotate(radians));
    }
    fn restore(&mut self) {
        self.commands.push(DrawCmd::Restore);
    }
    fn draw_image(&mut self, texture: &Texture, dest: Rect) {
        self.commands.push(DrawCmd::Image {
            texture: texture.name.clone(),
            dest,
        });
    }
}
