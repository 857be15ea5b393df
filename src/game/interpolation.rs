//! Opponent shadow smoothing
//!
//! The shadow only ever moves a fixed fraction of the remaining gap per tick,
//! so a late or bursty `position_update` never makes the opponent jump.

use glam::Vec3;
use std::f32::consts::{PI, TAU};

/// Position/rotation/speed of the remote truck as seen locally
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowState {
    pub position: Vec3,
    pub rotation: Vec3,
    pub speed: f32,
}

impl ShadowState {
    pub fn new(position: Vec3, rotation: Vec3, speed: f32) -> Self {
        Self {
            position,
            rotation,
            speed,
        }
    }
}

/// Signed shortest angular difference `to - from`, in `(-π, π]`
fn angle_delta(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(TAU);
    if delta > PI {
        delta - TAU
    } else {
        delta
    }
}

/// Blends the local shadow of the opponent toward the latest update
#[derive(Debug, Clone)]
pub struct OpponentInterpolator {
    blend: f32,
    shadow: ShadowState,
    target: ShadowState,
    updates_received: u64,
}

impl OpponentInterpolator {
    /// Start with the shadow parked at `initial` (the opponent's grid slot)
    pub fn new(blend: f32, initial: ShadowState) -> Self {
        Self {
            blend: blend.clamp(0.0, 1.0),
            shadow: initial,
            target: initial,
            updates_received: 0,
        }
    }

    /// Record the latest received state as the new target
    pub fn set_target(&mut self, target: ShadowState) {
        self.target = target;
        self.updates_received += 1;
    }

    /// Move the shadow one blend step toward the target
    pub fn step(&mut self) -> ShadowState {
        let b = self.blend;
        let s = &mut self.shadow;
        let t = &self.target;

        s.position += (t.position - s.position) * b;
        s.rotation.x += angle_delta(s.rotation.x, t.rotation.x) * b;
        s.rotation.y += angle_delta(s.rotation.y, t.rotation.y) * b;
        s.rotation.z += angle_delta(s.rotation.z, t.rotation.z) * b;
        s.speed += (t.speed - s.speed) * b;

        *s
    }

    pub fn shadow(&self) -> ShadowState {
        self.shadow
    }

    pub fn target(&self) -> ShadowState {
        self.target
    }

    pub fn updates_received(&self) -> u64 {
        self.updates_received
    }
}
