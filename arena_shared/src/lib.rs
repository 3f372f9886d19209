//! `arena_shared`
//!
//! Shared libraries used by both the arena client and the relay server.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (net, math, config, render, resources).
//! - Traits for the collaborators the simulation core talks to.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;
pub mod render;
pub mod resources;

