//! Frame scheduling.
//!
//! One call to [`tick`] runs a whole frame to completion, in a fixed order:
//!
//! 1. local player (orientation from pointer, then movement)
//! 2. remote players
//! 3. camera
//! 4. screen positions of every entity
//! 5. publish local state, if the connection is open
//! 6. world
//! 7. local player
//! 8. remote players inside the culling margin
//!
//! The camera must move before screen positions are recomputed, and screen
//! positions must be current before anything is drawn.

use arena_shared::render::Surface;

use crate::{
    camera::pointer_angle,
    context::SimContext,
    entity::StepParams,
    session::{MessageChannel, NetSync},
};

/// Longest frame delta applied, in seconds. Longer gaps (a suspended
/// process, a debugger) are treated as this long.
pub const MAX_FRAME_DELTA: f32 = 0.25;

/// Turns display-refresh timestamps into frame deltas.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    last_ms: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous call. The first call sets the time origin
    /// and returns 0.
    pub fn advance(&mut self, timestamp_ms: f64) -> f32 {
        let dt = match self.last_ms {
            Some(last) => ((timestamp_ms - last) / 1000.0) as f32,
            None => 0.0,
        };
        self.last_ms = Some(timestamp_ms);
        dt.clamp(0.0, MAX_FRAME_DELTA)
    }
}

/// What a frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub published: bool,
    pub remotes_drawn: usize,
}

/// Runs one frame.
pub fn tick(
    dt: f32,
    ctx: &mut SimContext,
    sync: &mut NetSync,
    chan: &mut dyn MessageChannel,
    surface: &mut dyn Surface,
) -> FrameReport {
    // Uses last frame's screen center.
    ctx.local.angle = pointer_angle(ctx.input.pointer(), ctx.local.screen_center());

    let params = StepParams {
        policy: ctx.policy,
        tuning: &ctx.tuning,
        input: ctx.input.flags(),
        world: ctx.world.bounds(),
    };
    ctx.local.update(dt, &params);
    for remote in ctx.remotes.values_mut() {
        remote.update(dt, &params);
    }

    ctx.camera.update(ctx.local.center());

    ctx.local.update_screen_position(&ctx.camera);
    for remote in ctx.remotes.values_mut() {
        remote.update_screen_position(&ctx.camera);
    }

    let published = sync.publish_local(chan, ctx);

    ctx.world.draw(&ctx.camera, surface);
    ctx.local.draw(surface, &ctx.textures);
    let mut remotes_drawn = 0;
    for remote in ctx.remotes.values() {
        if remote.is_visible(&ctx.camera) {
            remote.draw(surface, &ctx.textures);
            remotes_drawn += 1;
        }
    }

    FrameReport {
        published,
        remotes_drawn,
    }
}

/// Owns the frame clock and counts frames.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    clock: FrameClock,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs the frame for a display-refresh callback at `timestamp_ms`.
    pub fn run_frame(
        &mut self,
        timestamp_ms: f64,
        ctx: &mut SimContext,
        sync: &mut NetSync,
        chan: &mut dyn MessageChannel,
        surface: &mut dyn Surface,
    ) -> FrameReport {
        let dt = self.clock.advance(timestamp_ms);
        self.frames += 1;
        tick(dt, ctx, sync, chan, surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{
        config::{BackoffConfig, ClientConfig},
        math::Vec2,
        net::PlayerId,
        render::{DrawCmd, RecordingSurface},
        resources::TextureTable,
    };

    use crate::session::MemoryChannel;

    fn setup() -> (SimContext, NetSync, MemoryChannel, RecordingSurface) {
        let ctx = SimContext::new(&ClientConfig::default(), TextureTable::placeholders());
        let mut sync = NetSync::new(BackoffConfig::default());
        sync.on_open();
        (ctx, sync, MemoryChannel::open(), RecordingSurface::new())
    }

    #[test]
    fn clock_starts_at_zero_then_measures_seconds() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.advance(5000.0), 0.0);
        assert!((clock.advance(5016.0) - 0.016).abs() < 1e-6);
        assert_eq!(clock.advance(9000.0), MAX_FRAME_DELTA);
        assert_eq!(clock.advance(8000.0), 0.0);
    }

    #[test]
    fn camera_settles_on_idle_player() {
        let (mut ctx, mut sync, mut chan, mut surface) = setup();
        for _ in 0..400 {
            tick(1.0 / 60.0, &mut ctx, &mut sync, &mut chan, &mut surface);
            surface.commands.clear();
        }
        assert_eq!(ctx.local.position, Vec2::new(100.0, 100.0));
        assert!((ctx.camera.position.x - -825.0).abs() < 1e-2);
        assert!((ctx.camera.position.y - -541.0).abs() < 1e-2);
        // Screen center is the viewport middle once the camera has caught up.
        assert!((ctx.local.screen_center().x - 960.0).abs() < 1e-2);
    }

    #[test]
    fn frame_publishes_then_draws_world_local_remotes() {
        let (mut ctx, mut sync, mut chan, mut surface) = setup();
        ctx.upsert_remote(PlayerId(2), Vec2::new(300.0, 300.0), 0.0, Vec2::ZERO);
        ctx.upsert_remote(PlayerId(3), Vec2::new(14000.0, 14000.0), 0.0, Vec2::ZERO);

        let report = tick(1.0 / 60.0, &mut ctx, &mut sync, &mut chan, &mut surface);
        assert!(report.published);
        assert_eq!(chan.sent.len(), 1);
        assert_eq!(report.remotes_drawn, 1);

        assert_eq!(surface.commands[0], DrawCmd::Clear);
        let first_image = surface
            .commands
            .iter()
            .position(|c| matches!(c, DrawCmd::Image { .. }))
            .unwrap();
        let last_line = surface
            .commands
            .iter()
            .rposition(|c| matches!(c, DrawCmd::StrokeLine(..)))
            .unwrap();
        assert!(last_line < first_image, "entities must draw over the world");
        // Local player plus one visible remote, three sprites each.
        assert_eq!(surface.images().len(), 6);
    }

    #[test]
    fn closed_connection_skips_publish_but_keeps_running() {
        let (mut ctx, mut sync, mut chan, mut surface) = setup();
        chan.open = false;
        ctx.input.key_down("KeyD");
        let report = tick(1.0 / 60.0, &mut ctx, &mut sync, &mut chan, &mut surface);
        assert!(!report.published);
        assert!(chan.sent.is_empty());
        assert!(ctx.local.position.x > 100.0);
    }

    #[test]
    fn orientation_uses_previous_screen_center() {
        let (mut ctx, mut sync, mut chan, mut surface) = setup();
        tick(0.0, &mut ctx, &mut sync, &mut chan, &mut surface);
        let center = ctx.local.screen_center();
        ctx.input.pointer_moved(center + Vec2::new(0.0, 50.0));
        tick(1.0 / 60.0, &mut ctx, &mut sync, &mut chan, &mut surface);
        assert!((ctx.local.angle - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn scheduler_counts_frames() {
        let (mut ctx, mut sync, mut chan, mut surface) = setup();
        let mut scheduler = FrameScheduler::new();
        scheduler.run_frame(0.0, &mut ctx, &mut sync, &mut chan, &mut surface);
        scheduler.run_frame(16.0, &mut ctx, &mut sync, &mut chan, &mut surface);
        assert_eq!(scheduler.frames(), 2);
    }
}
