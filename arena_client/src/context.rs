//! Simulation context.
//!
//! Everything a frame reads or writes lives here, owned by the frame
//! scheduler and passed explicitly to update, network and draw steps.

use std::collections::BTreeMap;

use arena_shared::{
    config::{ClientConfig, MovementPolicy, MovementTuning},
    math::Vec2,
    net::PlayerId,
    resources::TextureTable,
};
use tracing::debug;

use crate::{
    camera::Camera,
    entity::{Entity, SPAWN_POSITION},
    input::InputState,
    world::World,
};

pub struct SimContext {
    pub world: World,
    pub camera: Camera,
    pub local: Entity,
    /// Other players, keyed by their server-assigned id.
    pub remotes: BTreeMap<PlayerId, Entity>,
    pub input: InputState,
    pub textures: TextureTable,
    pub policy: MovementPolicy,
    pub tuning: MovementTuning,
}

impl SimContext {
    pub fn new(cfg: &ClientConfig, textures: TextureTable) -> Self {
        Self {
            world: World::default(),
            camera: Camera::new(Vec2::new(cfg.viewport_width, cfg.viewport_height)),
            local: Entity::local(SPAWN_POSITION),
            remotes: BTreeMap::new(),
            input: InputState::default(),
            textures,
            policy: cfg.movement_policy,
            tuning: cfg.movement,
        }
    }

    /// Applies a reported state to a remote player, creating it on first
    /// sight. Returns true if the player is new.
    pub fn upsert_remote(
        &mut self,
        id: PlayerId,
        position: Vec2,
        angle: f32,
        velocity: Vec2,
    ) -> bool {
        match self.remotes.get_mut(&id) {
            Some(remote) => {
                remote.apply_server_state(position, angle, velocity);
                false
            }
            None => {
                let mut remote = Entity::remote(position, angle);
                remote.apply_server_state(position, angle, velocity);
                remote.update_screen_position(&self.camera);
                self.remotes.insert(id, remote);
                debug!(player_id = %id, x = position.x, y = position.y, "Remote player appeared");
                true
            }
        }
    }

    /// Removes a remote player. Unknown ids are a no-op.
    pub fn remove_remote(&mut self, id: PlayerId) -> bool {
        self.remotes.remove(&id).is_some()
    }

    pub fn clear_remotes(&mut self) {
        self.remotes.clear();
    }
}
