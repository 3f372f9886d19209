//! Player entities.
//!
//! One [`Entity`] type covers both the locally controlled player and remote
//! players. The [`EntityKind`] tag carries the variant-specific state and
//! selects the movement step:
//!
//! - `Local`: either integrates its own movement from input
//!   ([`MovementPolicy::ClientPredicted`]) or eases toward server-confirmed
//!   positions ([`MovementPolicy::ServerAuthoritative`]).
//! - `Remote`: always eases toward the latest state received from the
//!   network and never reads input.

use arena_shared::{
    config::{MovementPolicy, MovementTuning},
    math::{Rect, Vec2},
    net::InputFlags,
    render::Surface,
    resources::{SpriteId, TextureTable},
};

use crate::{camera::Camera, interp};

pub const PLAYER_SIZE: f32 = 70.0;
pub const HAND_SIZE: f32 = 30.0;
pub const LEFT_HAND_OFFSET: Vec2 = Vec2::new(40.0, -5.0);
pub const RIGHT_HAND_OFFSET: Vec2 = Vec2::new(-40.0, 45.0);
pub const SPAWN_POSITION: Vec2 = Vec2::new(100.0, 100.0);
/// Culling margin around the viewport for remote players.
pub const VISIBILITY_MARGIN: f32 = 100.0;
/// How far past the top/left world edge a player may stand.
pub const EDGE_SLACK: f32 = 15.0;

/// State only the local player has.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalState {
    /// Units per reference frame.
    pub velocity: Vec2,
    /// Last position confirmed by the server.
    pub server_target: Vec2,
    /// A server position not yet checked against the prediction.
    pub pending_report: Option<Vec2>,
}

/// Latest network state of a remote player.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteState {
    pub target: Vec2,
    pub target_angle: f32,
    /// Units per reference frame. Advances the target between updates.
    pub target_velocity: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Local(LocalState),
    Remote(RemoteState),
}

/// Per-frame inputs to [`Entity::update`].
#[derive(Debug, Clone, Copy)]
pub struct StepParams<'a> {
    pub policy: MovementPolicy,
    pub tuning: &'a MovementTuning,
    pub input: InputFlags,
    pub world: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// World position of the top-left corner.
    pub position: Vec2,
    pub size: f32,
    /// Orientation in radians.
    pub angle: f32,
    center: Vec2,
    screen_position: Vec2,
    screen_center: Vec2,
    pub kind: EntityKind,
}

impl Entity {
    fn with_kind(position: Vec2, angle: f32, kind: EntityKind) -> Self {
        let mut entity = Self {
            position,
            size: PLAYER_SIZE,
            angle,
            center: Vec2::ZERO,
            screen_position: Vec2::ZERO,
            screen_center: Vec2::ZERO,
            kind,
        };
        entity.update_center();
        entity
    }

    pub fn local(position: Vec2) -> Self {
        Self::with_kind(
            position,
            0.0,
            EntityKind::Local(LocalState {
                server_target: position,
                ..Default::default()
            }),
        )
    }

    /// A remote player placed directly at its first reported state.
    pub fn remote(position: Vec2, angle: f32) -> Self {
        Self::with_kind(
            position,
            angle,
            EntityKind::Remote(RemoteState {
                target: position,
                target_angle: angle,
                target_velocity: Vec2::ZERO,
            }),
        )
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn screen_position(&self) -> Vec2 {
        self.screen_position
    }

    pub fn screen_center(&self) -> Vec2 {
        self.screen_center
    }

    pub fn velocity(&self) -> Vec2 {
        match &self.kind {
            EntityKind::Local(local) => local.velocity,
            EntityKind::Remote(remote) => remote.target_velocity,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.size, self.size)
    }

    /// Recomputes the world-space center. Call after every position change.
    pub fn update_center(&mut self) {
        let half = self.size / 2.0;
        self.center = self.position + Vec2::new(half, half);
    }

    /// Recomputes screen coordinates. Call once per frame after the camera moved.
    pub fn update_screen_position(&mut self, camera: &Camera) {
        let half = self.size / 2.0;
        self.screen_position = camera.world_to_screen(self.position);
        self.screen_center = self.screen_position + Vec2::new(half, half);
    }

    /// True if the entity overlaps the viewport grown by [`VISIBILITY_MARGIN`].
    pub fn is_visible(&self, camera: &Camera) -> bool {
        self.bounds()
            .intersects(&camera.rect().expand(VISIBILITY_MARGIN))
    }

    /// Records a server-reported state for this entity.
    pub fn apply_server_state(&mut self, position: Vec2, angle: f32, velocity: Vec2) {
        match &mut self.kind {
            EntityKind::Local(local) => {
                local.server_target = position;
                local.pending_report = Some(position);
            }
            EntityKind::Remote(remote) => {
                remote.target = position;
                remote.target_angle = angle;
                remote.target_velocity = velocity;
            }
        }
    }

    /// Advances one frame.
    pub fn update(&mut self, dt: f32, params: &StepParams<'_>) {
        match &mut self.kind {
            EntityKind::Local(local) => match params.policy {
                MovementPolicy::ClientPredicted => {
                    self.position = predict(self.position, local, dt, params);
                }
                MovementPolicy::ServerAuthoritative => {
                    self.position = interp::approach(
                        self.position,
                        local.server_target,
                        params.tuning.local_lerp,
                    );
                }
            },
            EntityKind::Remote(remote) => {
                let scaled = params.policy == MovementPolicy::ClientPredicted;
                let factor = interp::smoothing_factor(params.tuning.remote_lerp, dt, scaled);
                remote.target = remote.target + remote.target_velocity * interp::frame_scale(dt);
                self.position = interp::approach(self.position, remote.target, factor);
                self.angle = interp::approach_angle(self.angle, remote.target_angle, factor);
            }
        }
        self.update_center();
    }

    /// Draws hands then body, rotated together about the screen center.
    pub fn draw(&self, surface: &mut dyn Surface, textures: &TextureTable) {
        let half = self.size / 2.0;
        surface.save();
        surface.translate(self.screen_center);
        surface.rotate(self.angle);

        if let Some(hand) = textures.get(SpriteId::Hand) {
            surface.draw_image(
                hand,
                Rect::new(
                    -RIGHT_HAND_OFFSET.x - half,
                    RIGHT_HAND_OFFSET.y - half,
                    HAND_SIZE,
                    HAND_SIZE,
                ),
            );
            surface.draw_image(
                hand,
                Rect::new(
                    LEFT_HAND_OFFSET.x - half,
                    LEFT_HAND_OFFSET.y - half,
                    HAND_SIZE,
                    HAND_SIZE,
                ),
            );
        }
        if let Some(body) = textures.get(SpriteId::Body) {
            surface.draw_image(body, Rect::new(-half, -half, self.size, self.size));
        }

        surface.restore();
    }
}

/// Client-side prediction step. Returns the new position.
fn predict(position: Vec2, local: &mut LocalState, dt: f32, params: &StepParams<'_>) -> Vec2 {
    let tuning = params.tuning;
    let mut position = position;

    if let Some(reported) = local.pending_report.take() {
        if reported.distance(position) > tuning.reconcile_distance {
            tracing::debug!(
                predicted_x = position.x,
                predicted_y = position.y,
                server_x = reported.x,
                server_y = reported.y,
                "Prediction rejected by server, snapping"
            );
            position = reported;
            local.velocity = Vec2::ZERO;
        }
    }

    let scale = interp::frame_scale(dt);
    let accel = tuning.acceleration * scale;
    let mut v = local.velocity;
    if params.input.up {
        v.y -= accel;
    }
    if params.input.down {
        v.y += accel;
    }
    if params.input.left {
        v.x -= accel;
    }
    if params.input.right {
        v.x += accel;
    }

    let speed = v.length();
    if speed > tuning.max_speed {
        v = v * (tuning.max_speed / speed);
    }
    v = v * tuning.friction;
    if v.length() < tuning.stop_threshold {
        v = Vec2::ZERO;
    }
    local.velocity = v;

    let moved = position + v * scale;
    Vec2::new(
        moved.x.clamp(params.world.x - EDGE_SLACK, params.world.right()),
        moved.y.clamp(params.world.y - EDGE_SLACK, params.world.bottom()),
    )
}
