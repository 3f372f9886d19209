//! `arena_client`
//!
//! Client-side systems:
//! - Framed socket transport with reconnect
//! - Keyboard/pointer input and scripted input sources
//! - Local prediction with server reconciliation
//! - Interpolation for remote player states
//! - Follow camera, world grid and biome culling
//! - Frame scheduling over an explicit simulation context

pub mod camera;
pub mod client;
pub mod context;
pub mod entity;
pub mod frame;
pub mod input;
pub mod interp;
pub mod session;
pub mod transport;
pub mod world;

pub use client::GameClient;
