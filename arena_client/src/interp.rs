//! Interpolation.
//!
//! The server sends discrete state updates. The client renders at its own
//! rate and eases entities toward the latest reported state by a fixed
//! fraction of the remaining distance each frame.

use arena_shared::math::{wrap_angle, Vec2};

/// Rate the smoothing constants were tuned at.
pub const REFERENCE_HZ: f32 = 60.0;

/// Converts a frame delta in seconds to "reference frames elapsed".
pub fn frame_scale(dt: f32) -> f32 {
    dt.max(0.0) * REFERENCE_HZ
}

/// Smoothing fraction for this frame. A scaled factor is capped at 1 so a
/// long frame lands on the target instead of overshooting it.
pub fn smoothing_factor(base: f32, dt: f32, scaled: bool) -> f32 {
    if scaled {
        (base * frame_scale(dt)).min(1.0)
    } else {
        base
    }
}

/// Moves `factor` of the way from `current` to `target`.
pub fn approach(current: Vec2, target: Vec2, factor: f32) -> Vec2 {
    current.lerp(target, factor)
}

/// Like [`approach`] for angles, turning the short way around.
pub fn approach_angle(current: f32, target: f32, factor: f32) -> f32 {
    current + wrap_angle(target - current) * factor.clamp(0.0, 1.0)
}
