//! Follow camera.
//!
//! The camera eases toward the point that centers the followed entity, by a
//! fixed fraction of the remaining distance per frame. It only jumps at
//! construction.

use arena_shared::math::{Rect, Vec2};

/// Fraction of the remaining distance covered per frame.
pub const FOLLOW_FACTOR: f32 = 0.12;

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World position of the viewport's top-left corner.
    pub position: Vec2,
    pub viewport: Vec2,
}

impl Camera {
    pub fn new(viewport: Vec2) -> Self {
        Self {
            position: Vec2::ZERO,
            viewport,
        }
    }

    /// Eases toward centering `focus` (a world-space point).
    pub fn update(&mut self, focus: Vec2) {
        let target = self.target_for(focus);
        self.position = self.position + (target - self.position) * FOLLOW_FACTOR;
    }

    /// Camera position that puts `focus` at the middle of the viewport.
    pub fn target_for(&self, focus: Vec2) -> Vec2 {
        focus - self.viewport * 0.5
    }

    /// Visible world rectangle.
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            self.viewport.x,
            self.viewport.y,
        )
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        world - self.position
    }
}

/// Orientation that faces from `screen_center` toward `pointer`.
///
/// Callers pass the screen center computed last frame, so the angle lags the
/// camera by one frame.
pub fn pointer_angle(pointer: Vec2, screen_center: Vec2) -> f32 {
    (pointer - screen_center).angle()
}
