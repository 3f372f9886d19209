//! Input handling.
//!
//! A windowing layer feeds key and pointer events into [`InputState`]; the
//! frame scheduler samples it once per frame. [`InputSource`] is the seam for
//! whatever produces those events (a window, a script, a test).

use std::collections::HashSet;

use arena_shared::{
    math::Vec2,
    net::{ClientMsg, InputFlags},
};

/// Live keyboard/pointer state.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: HashSet<String>,
    pointer: Vec2,
}

impl InputState {
    /// Records a key press by its physical code, e.g. `KeyW`.
    pub fn key_down(&mut self, code: &str) {
        self.held.insert(code.to_string());
    }

    pub fn key_up(&mut self, code: &str) {
        self.held.remove(code);
    }

    pub fn is_held(&self, code: &str) -> bool {
        self.held.contains(code)
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }

    /// Pointer position in screen space.
    pub fn pointer_moved(&mut self, to: Vec2) {
        self.pointer = to;
    }

    pub fn pointer(&self) -> Vec2 {
        self.pointer
    }

    /// WASD or arrow keys as movement flags.
    pub fn flags(&self) -> InputFlags {
        InputFlags {
            up: self.is_held("KeyW") || self.is_held("ArrowUp"),
            down: self.is_held("KeyS") || self.is_held("ArrowDown"),
            left: self.is_held("KeyA") || self.is_held("ArrowLeft"),
            right: self.is_held("KeyD") || self.is_held("ArrowRight"),
        }
    }
}

/// Turns sampled input into a `playerInput` message.
pub fn build_input_msg(input: &InputState, angle: f32) -> ClientMsg {
    ClientMsg::PlayerInput {
        input: input.flags(),
        angle,
    }
}

/// Produces input events once per frame.
pub trait InputSource {
    fn poll(&mut self, frame: u64, input: &mut InputState);
}

/// Never presses anything.
#[derive(Debug, Default)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn poll(&mut self, _frame: u64, _input: &mut InputState) {}
}

/// Walks a square, switching direction every `leg_frames` frames, and sweeps
/// the pointer around the screen center.
#[derive(Debug)]
pub struct WanderInput {
    pub leg_frames: u64,
    pub screen_center: Vec2,
}

impl WanderInput {
    const LEGS: [&'static str; 4] = ["KeyD", "KeyS", "KeyA", "KeyW"];

    pub fn new(leg_frames: u64, screen_center: Vec2) -> Self {
        Self {
            leg_frames: leg_frames.max(1),
            screen_center,
        }
    }
}

impl InputSource for WanderInput {
    fn poll(&mut self, frame: u64, input: &mut InputState) {
        let leg = ((frame / self.leg_frames) % Self::LEGS.len() as u64) as usize;
        input.release_all();
        input.key_down(Self::LEGS[leg]);

        let sweep = frame as f32 * 0.02;
        input.pointer_moved(
            self.screen_center + Vec2::new(sweep.cos(), sweep.sin()) * 200.0,
        );
    }
}
