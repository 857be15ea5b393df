//! Race simulation modules

pub mod clock;
pub mod interpolation;
pub mod session;
pub mod track;
pub mod validator;
pub mod vehicle;

pub use clock::RaceClock;
pub use interpolation::OpponentInterpolator;
pub use session::{FinishReason, RaceOutcome, RaceSession, SessionPhase};
pub use track::{Checkpoint, Track, TrackType};
pub use validator::{TrackStatus, TrackValidator, ValidatorUpdate};
pub use vehicle::{VehicleDynamics, VehicleState};

/// Driver intent for a single tick.
///
/// Sampled once per tick from whatever input source is attached (keyboard,
/// touch, a bot); nothing mutates it mid-tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlInput {
    pub accelerate: bool,
    pub brake: bool,
    pub steer_left: bool,
    pub steer_right: bool,
}

impl ControlInput {
    pub const IDLE: Self = Self {
        accelerate: false,
        brake: false,
        steer_left: false,
        steer_right: false,
    };

    pub fn accelerate() -> Self {
        Self {
            accelerate: true,
            ..Self::IDLE
        }
    }

    pub fn brake() -> Self {
        Self {
            brake: true,
            ..Self::IDLE
        }
    }

    /// True when any pedal is pressed
    pub fn has_pedal(&self) -> bool {
        self.accelerate || self.brake
    }
}
