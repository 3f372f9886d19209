//! `arena_server`
//!
//! Relay peer for arena clients:
//! - Assigns each connection a `PlayerId`
//! - Answers `ping` with `pong`
//! - Rebroadcasts each `playerUpdate` as `playerMove` to every other peer
//! - Announces `playerLeft` when a peer disconnects
//!
//! The relay never simulates movement. Clients own their positions.

pub mod relay;

pub use relay::RelayServer;
