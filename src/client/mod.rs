//! One player's race: ties the simulation components to the relay protocol
//!
//! `RaceClient` is synchronous and owns every piece of per-player state.
//! The async `runner` feeds it ticks, relay messages and UI commands.

pub mod runner;

use glam::Vec3;
use governor::clock::{Clock, DefaultClock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, RaceConfig};
use crate::game::interpolation::ShadowState;
use crate::game::track::TrackError;
use crate::game::vehicle::VehicleParams;
use crate::game::{
    ControlInput, OpponentInterpolator, RaceClock, RaceOutcome, RaceSession, SessionPhase, Track,
    TrackStatus, TrackValidator, VehicleDynamics, VehicleState,
};
use crate::util::rate_limit::PositionThrottle;
use crate::ws::protocol::{decode_relay_msg, ClientMsg, RelayMsg};

/// Starting lane on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSlot {
    Host,
    Guest,
}

impl GridSlot {
    /// Lateral offset of the lane, meters
    pub fn lane(self) -> f32 {
        match self {
            GridSlot::Host => -4.0,
            GridSlot::Guest => 4.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            GridSlot::Host => GridSlot::Guest,
            GridSlot::Guest => GridSlot::Host,
        }
    }
}

/// Failure to set up a client
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Track(#[from] TrackError),
}

/// Discrete happenings for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    RosterChanged,
    OpponentReady,
    RaceStarted,
    LapCompleted {
        player_id: Uuid,
        lap: u32,
        /// Whole seconds
        lap_time: u64,
    },
    LeftTrack,
    PenaltyApplied {
        relocated_to: Vec3,
    },
    RaceFinished(RaceOutcome),
}

/// Everything the presentation layer draws for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub local: VehicleState,
    pub opponent: ShadowState,
    /// Laps completed by the local player
    pub lap: u32,
    pub total_laps: u32,
    pub total_elapsed_ms: u64,
    pub lap_elapsed_ms: u64,
    /// Seconds until the off-track penalty, while counting down
    pub penalty_remaining: Option<f32>,
    pub phase: SessionPhase,
    pub speed_kmh: f32,
}

/// Messages to send and events to surface after one call into the client
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    pub outbound: Vec<ClientMsg>,
    pub events: Vec<RaceEvent>,
}

impl Effects {
    fn event(&mut self, event: RaceEvent) {
        self.events.push(event);
    }

    fn send(&mut self, msg: ClientMsg) {
        self.outbound.push(msg);
    }
}

/// Result of one simulation tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub frame: Frame,
    pub effects: Effects,
}

/// Per-player race orchestration
pub struct RaceClient<C: Clock = DefaultClock> {
    config: RaceConfig,
    dynamics: VehicleDynamics,
    vehicle: VehicleState,
    validator: TrackValidator,
    clock: RaceClock,
    opponent: OpponentInterpolator,
    session: RaceSession,
    throttle: PositionThrottle<C>,
    on_track: bool,
    finished_at_ms: Option<u64>,
}

impl RaceClient<DefaultClock> {
    pub fn new(
        game_id: Uuid,
        player_id: Uuid,
        slot: GridSlot,
        tracks: Vec<Track>,
        config: RaceConfig,
    ) -> Result<Self, TrackError> {
        let throttle = PositionThrottle::new(config.position_update_interval);
        Self::build(game_id, player_id, slot, tracks, config, throttle)
    }

    /// `new` with tunables read from the `RACE_*` environment
    pub fn from_env(
        game_id: Uuid,
        player_id: Uuid,
        slot: GridSlot,
        tracks: Vec<Track>,
    ) -> Result<Self, SetupError> {
        let config = RaceConfig::from_env()?;
        Ok(Self::new(game_id, player_id, slot, tracks, config)?)
    }
}

impl<C: Clock> RaceClient<C> {
    /// Like `new`, with the position throttle on a caller-supplied clock
    pub fn with_clock(
        game_id: Uuid,
        player_id: Uuid,
        slot: GridSlot,
        tracks: Vec<Track>,
        config: RaceConfig,
        clock: &C,
    ) -> Result<Self, TrackError> {
        let throttle = PositionThrottle::with_clock(config.position_update_interval, clock);
        Self::build(game_id, player_id, slot, tracks, config, throttle)
    }

    fn build(
        game_id: Uuid,
        player_id: Uuid,
        slot: GridSlot,
        tracks: Vec<Track>,
        config: RaceConfig,
        throttle: PositionThrottle<C>,
    ) -> Result<Self, TrackError> {
        let first = tracks.first().ok_or(TrackError::NoTracks)?;
        let start = first.grid_position(slot.lane());
        let opponent_start = first.grid_position(slot.opposite().lane());

        let validator = TrackValidator::new(tracks.clone(), &config, start)?;
        let session = RaceSession::new(game_id, player_id, tracks, &config);
        let opponent = OpponentInterpolator::new(
            config.interpolation_blend,
            ShadowState::new(opponent_start, Vec3::ZERO, 0.0),
        );

        Ok(Self {
            dynamics: VehicleDynamics::new(VehicleParams::default(), config.max_tick_delta),
            vehicle: VehicleState::at_rest(start, 0.0),
            validator,
            clock: RaceClock::new(),
            opponent,
            session,
            throttle,
            on_track: true,
            finished_at_ms: None,
            config,
        })
    }

    pub fn player_id(&self) -> Uuid {
        self.session.local_id()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn outcome(&self) -> Option<RaceOutcome> {
        self.session.outcome()
    }

    pub fn session(&self) -> &RaceSession {
        &self.session
    }

    pub fn vehicle(&self) -> &VehicleState {
        &self.vehicle
    }

    pub fn validator(&self) -> &TrackValidator {
        &self.validator
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    fn finished(&mut self, outcome: Option<RaceOutcome>, now_ms: u64, effects: &mut Effects) {
        if let Some(outcome) = outcome {
            self.finished_at_ms.get_or_insert(now_ms);
            effects.event(RaceEvent::RaceFinished(outcome));
        }
    }

    /// Flag the local player ready
    pub fn mark_ready(&mut self) -> Effects {
        let mut effects = Effects::default();
        if self.session.mark_local_ready() {
            info!(player_id = %self.player_id(), "Ready");
            effects.send(ClientMsg::PlayerReady);
        }
        effects
    }

    /// Give up: tell the relay and hand the race to the opponent
    pub fn quit(&mut self, now_ms: u64) -> Effects {
        let mut effects = Effects::default();
        if self.session.phase() == SessionPhase::Finished {
            return effects;
        }
        effects.send(ClientMsg::PlayerQuit);
        let outcome = self.session.forfeit();
        self.finished(outcome, now_ms, &mut effects);
        effects
    }

    /// The relay channel went away without an explicit disconnect notice
    pub fn channel_closed(&mut self, now_ms: u64) {
        self.session.channel_closed(now_ms);
    }

    /// Decode and apply a raw relay payload. Malformed payloads are dropped.
    pub fn handle_relay_text(&mut self, text: &str, now_ms: u64) -> Effects {
        match decode_relay_msg(text) {
            Ok(msg) => self.handle_relay_msg(msg, now_ms),
            Err(e) => {
                warn!(player_id = %self.player_id(), error = %e, "Dropping malformed relay message");
                Effects::default()
            }
        }
    }

    /// Apply one relay message. Never touches the local vehicle.
    pub fn handle_relay_msg(&mut self, msg: RelayMsg, now_ms: u64) -> Effects {
        let local_id = self.player_id();
        let mut effects = Effects::default();

        match msg {
            RelayMsg::PlayerJoined { players } => {
                self.session.apply_roster(&players);
                effects.event(RaceEvent::RosterChanged);
            }
            RelayMsg::PlayerReady { player_id } => {
                if player_id != local_id {
                    self.session.mark_remote_ready(player_id);
                    effects.event(RaceEvent::OpponentReady);
                }
            }
            RelayMsg::GameStart { start_time } => {
                if self.session.start_race() {
                    self.clock.start(now_ms);
                    debug!(relay_start = start_time, local_start = now_ms, "Race clock started");
                    effects.event(RaceEvent::RaceStarted);
                }
            }
            RelayMsg::PositionUpdate {
                player_id,
                position,
                rotation,
                speed,
            } => {
                if player_id != local_id {
                    self.opponent
                        .set_target(ShadowState::new(position.into(), rotation.into(), speed));
                }
            }
            RelayMsg::LapCompleted {
                player_id,
                lap,
                lap_time,
            } => {
                if player_id != local_id {
                    effects.event(RaceEvent::LapCompleted {
                        player_id,
                        lap,
                        lap_time,
                    });
                    let outcome = self.session.record_opponent_lap(player_id, lap);
                    self.finished(outcome, now_ms, &mut effects);
                }
            }
            RelayMsg::PlayerQuit {
                player_id,
                winner_id,
            }
            | RelayMsg::PlayerDisconnected {
                player_id,
                winner_id,
            } => {
                if player_id != local_id {
                    let outcome = self.session.player_left(player_id, winner_id);
                    self.finished(outcome, now_ms, &mut effects);
                }
            }
            RelayMsg::GameCompleted => {
                let outcome = self.session.relay_completed();
                self.finished(outcome, now_ms, &mut effects);
            }
            RelayMsg::Error { message } => {
                warn!(player_id = %local_id, message = %message, "Relay reported an error");
            }
        }

        effects
    }

    /// Advance one tick. Physics and lap validation only run while racing;
    /// the opponent shadow always moves.
    pub fn tick(&mut self, input: ControlInput, dt: f32, now_ms: u64) -> TickOutput {
        let mut effects = Effects::default();

        if self.session.is_racing() {
            self.simulate(input, dt, now_ms, &mut effects);
        }

        self.opponent.step();

        if self.session.is_racing() {
            let outcome = self.session.check_disconnect_timeout(now_ms);
            self.finished(outcome, now_ms, &mut effects);
        }

        TickOutput {
            frame: self.frame(now_ms),
            effects,
        }
    }

    fn simulate(&mut self, input: ControlInput, dt: f32, now_ms: u64, effects: &mut Effects) {
        self.vehicle = self.dynamics.step(&self.vehicle, input, dt);
        let update = self.validator.update(self.vehicle.position, dt);

        let on_track = update.status == TrackStatus::OnTrack;
        if self.on_track && !on_track {
            effects.event(RaceEvent::LeftTrack);
        }
        self.on_track = on_track;

        if let Some(target) = update.relocate_to {
            self.vehicle.stop_at(target);
            self.on_track = true;
            effects.event(RaceEvent::PenaltyApplied {
                relocated_to: target,
            });
        }

        if let Some(completion) = update.lap {
            let lap_time = self.clock.complete_lap(now_ms) / 1000;

            effects.send(ClientMsg::LapCompleted {
                lap: completion.lap,
                lap_time,
            });
            effects.event(RaceEvent::LapCompleted {
                player_id: self.player_id(),
                lap: completion.lap,
                lap_time,
            });
            let outcome = self.session.record_local_lap(completion.lap);
            self.finished(outcome, now_ms, effects);
        }

        // after physics, so the update carries this tick's pose
        if self.throttle.try_acquire() {
            effects.send(ClientMsg::PositionUpdate {
                position: self.vehicle.position.into(),
                rotation: self.vehicle.rotation.into(),
                speed: self.vehicle.speed,
            });
        }
    }

    /// Presentation snapshot at `now_ms`
    pub fn frame(&self, now_ms: u64) -> Frame {
        let now = self.finished_at_ms.unwrap_or(now_ms);
        Frame {
            local: self.vehicle,
            opponent: self.opponent.shadow(),
            lap: self.validator.current_lap(),
            total_laps: self.validator.total_laps(),
            total_elapsed_ms: self.clock.total_elapsed_ms(now),
            lap_elapsed_ms: self.clock.lap_elapsed_ms(now),
            penalty_remaining: self.validator.penalty_remaining(),
            phase: self.session.phase(),
            speed_kmh: self.vehicle.speed_kmh(),
        }
    }
}
