//! Configuration system.
//!
//! Loads client/server configuration from JSON strings or files. Every field
//! has a default so partial config files are accepted.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Who owns the local player's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovementPolicy {
    /// Client sends raw input and smooths toward positions confirmed by the
    /// server. Needs a server that simulates movement.
    ServerAuthoritative,
    /// Client integrates its own movement, publishes the result and only
    /// snaps back when the server disagrees by more than the reconcile distance.
    #[default]
    ClientPredicted,
}

/// Movement and smoothing constants. Velocities are in units per 60 Hz frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementTuning {
    pub acceleration: f32,
    pub friction: f32,
    pub max_speed: f32,
    /// Below this speed the velocity snaps to zero.
    pub stop_threshold: f32,
    pub local_lerp: f32,
    pub remote_lerp: f32,
    /// Own-position disagreement (world units) that triggers a snap to the
    /// server position under [`MovementPolicy::ClientPredicted`].
    pub reconcile_distance: f32,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            acceleration: 0.9,
            friction: 0.88,
            max_speed: 7.0,
            stop_threshold: 0.05,
            local_lerp: 0.18,
            remote_lerp: 0.3,
            reconcile_distance: 150.0,
        }
    }
}

/// Reconnect delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    /// Fraction of the delay randomly added or removed, `0.0` disables jitter.
    pub jitter: f32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 10_000,
            jitter: 0.1,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay/server address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Display refresh rate the frame scheduler is driven at.
    pub frame_hz: u32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub ping_interval_ms: u64,
    pub movement_policy: MovementPolicy,
    pub movement: MovementTuning,
    pub reconnect: BackoffConfig,
    /// Directory holding sprite images. `None` uses blank placeholder sprites.
    pub assets_dir: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            frame_hz: 60,
            viewport_width: 1920.0,
            viewport_height: 1152.0,
            ping_interval_ms: 500,
            movement_policy: MovementPolicy::default(),
            movement: MovementTuning::default(),
            reconnect: BackoffConfig::default(),
            assets_dir: None,
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

/// Relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Connections above this count are refused.
    pub max_players: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:40000".to_string(),
            max_players: 64,
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_client_config_uses_defaults() {
        let cfg = ClientConfig::from_json_str(
            r#"{ "server_addr": "10.0.0.1:5000", "movement_policy": "server_authoritative",
                 "movement": { "max_speed": 9.5 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.server_addr, "10.0.0.1:5000");
        assert_eq!(cfg.movement_policy, MovementPolicy::ServerAuthoritative);
        assert_eq!(cfg.movement.max_speed, 9.5);
        assert_eq!(cfg.movement.friction, MovementTuning::default().friction);
        assert_eq!(cfg.ping_interval_ms, 500);
        assert_eq!(cfg.viewport_width, 1920.0);
    }

    #[test]
    fn default_policy_is_client_predicted() {
        assert_eq!(
            ClientConfig::default().movement_policy,
            MovementPolicy::ClientPredicted
        );
    }

    #[test]
    fn server_config_from_json() {
        let cfg = ServerConfig::from_json_str(r#"{ "max_players": 2 }"#).unwrap();
        assert_eq!(cfg.max_players, 2);
        assert_eq!(cfg.listen_addr, "127.0.0.1:40000");
    }
}
