//! Relay hub - game registry and message forwarding
//!
//! The hub never validates physics or laps. It keeps a roster per game,
//! forwards client messages to the other player, and emits the few
//! relay-originated events (`game_start`, `game_completed`, disconnects).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::game::track::generate_tracks;
use crate::game::Track;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayerInfo, RelayMsg};

/// Outbound queue depth per connection
const OUTBOUND_CAPACITY: usize = 64;

/// Players per game
const SEATS: usize = 2;

/// Relay-side failures surfaced to REST and socket callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Game not found")]
    GameNotFound,

    #[error("Game already started")]
    AlreadyStarted,

    #[error("Game is full")]
    GameFull,

    #[error("Player not in game")]
    UnknownPlayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomStatus {
    Waiting,
    Racing,
    Completed,
}

struct Seat {
    info: PlayerInfo,
    outbound: Option<mpsc::Sender<RelayMsg>>,
    limiter: PlayerRateLimiter,
}

struct RoomState {
    status: RoomStatus,
    seats: Vec<Seat>,
}

impl RoomState {
    fn roster(&self) -> HashMap<Uuid, PlayerInfo> {
        self.seats.iter().map(|s| (s.info.id, s.info.clone())).collect()
    }

    fn seat_mut(&mut self, id: Uuid) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.info.id == id)
    }

    fn other_than(&self, id: Uuid) -> Option<Uuid> {
        self.seats.iter().map(|s| s.info.id).find(|other| *other != id)
    }

    fn any_connected(&self) -> bool {
        self.seats.iter().any(|s| s.outbound.is_some())
    }

    /// Snapshot of live outbound channels, optionally skipping one player
    fn recipients(&self, skip: Option<Uuid>) -> Vec<mpsc::Sender<RelayMsg>> {
        self.seats
            .iter()
            .filter(|s| Some(s.info.id) != skip)
            .filter_map(|s| s.outbound.clone())
            .collect()
    }
}

struct GameRoom {
    created_at: DateTime<Utc>,
    tracks: Vec<Track>,
    state: Mutex<RoomState>,
}

/// Response to game creation
#[derive(Debug, Clone)]
pub struct CreatedGame {
    pub game_id: Uuid,
    pub player_id: Uuid,
    pub tracks: Vec<Track>,
}

/// Response to joining a game
#[derive(Debug, Clone)]
pub struct JoinedGame {
    pub game_id: Uuid,
    pub player_id: Uuid,
    pub host_id: Uuid,
    pub tracks: Vec<Track>,
}

/// Registry of live games
pub struct RelayHub {
    games: DashMap<Uuid, Arc<GameRoom>>,
    total_laps: u32,
    position_rate_limit: u32,
}

impl RelayHub {
    pub fn new(total_laps: u32, position_rate_limit: u32) -> Self {
        Self {
            games: DashMap::new(),
            total_laps,
            position_rate_limit,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.total_laps, config.position_rate_limit)
    }

    pub fn total_laps(&self) -> u32 {
        self.total_laps
    }

    /// Number of games currently registered
    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    /// Confirm `player_id` holds a seat in `game_id` without attaching anything
    pub fn check_seat(&self, game_id: Uuid, player_id: Uuid) -> Result<(), RelayError> {
        let room = self.room(game_id)?;
        let state = room.state.lock();
        if state.seats.iter().any(|s| s.info.id == player_id) {
            Ok(())
        } else {
            Err(RelayError::UnknownPlayer)
        }
    }

    /// Drop waiting games that nobody has connected to for `max_age`.
    /// Returns how many were removed.
    pub fn expire_idle(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.games.len();
        self.games.retain(|game_id, room| {
            let state = room.state.lock();
            let idle = state.status == RoomStatus::Waiting && !state.any_connected();
            let expired = idle
                && (now - room.created_at)
                    .to_std()
                    .map(|age| age >= max_age)
                    .unwrap_or(false);
            if expired {
                info!(game_id = %game_id, "Idle game expired");
            }
            !expired
        });
        before.saturating_sub(self.games.len())
    }

    /// Periodically expire idle games; runs until the process exits
    pub async fn run_sweeper(self: Arc<Self>, every: Duration, max_age: Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = self.expire_idle(Utc::now(), max_age);
            if removed > 0 {
                debug!(removed, active = self.active_games(), "Swept idle games");
            }
        }
    }

    fn room(&self, game_id: Uuid) -> Result<Arc<GameRoom>, RelayError> {
        self.games
            .get(&game_id)
            .map(|r| r.value().clone())
            .ok_or(RelayError::GameNotFound)
    }

    fn seat(&self, id: Uuid) -> Seat {
        Seat {
            info: PlayerInfo::new(id),
            outbound: None,
            limiter: PlayerRateLimiter::new(self.position_rate_limit),
        }
    }

    /// Create a game with a fresh host seat and one track per lap
    pub fn create_game(&self) -> CreatedGame {
        let game_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();
        let tracks = generate_tracks(rand::thread_rng().gen(), self.total_laps);

        let room = GameRoom {
            created_at: Utc::now(),
            tracks: tracks.clone(),
            state: Mutex::new(RoomState {
                status: RoomStatus::Waiting,
                seats: vec![self.seat(player_id)],
            }),
        };
        self.games.insert(game_id, Arc::new(room));

        info!(game_id = %game_id, host_id = %player_id, "Game created");

        CreatedGame {
            game_id,
            player_id,
            tracks,
        }
    }

    /// Seat a guest in a waiting game
    pub fn join_game(&self, game_id: Uuid) -> Result<JoinedGame, RelayError> {
        let room = self.room(game_id)?;
        let player_id = Uuid::new_v4();

        let host_id = {
            let mut state = room.state.lock();
            if state.status != RoomStatus::Waiting {
                return Err(RelayError::AlreadyStarted);
            }
            if state.seats.len() >= SEATS {
                return Err(RelayError::GameFull);
            }
            let host_id = state.seats[0].info.id;
            state.seats.push(self.seat(player_id));
            host_id
        };

        info!(game_id = %game_id, player_id = %player_id, "Player joined game");

        Ok(JoinedGame {
            game_id,
            player_id,
            host_id,
            tracks: room.tracks.clone(),
        })
    }

    /// Attach a connection for a seated player and announce the roster
    pub async fn connect(
        &self,
        game_id: Uuid,
        player_id: Uuid,
    ) -> Result<mpsc::Receiver<RelayMsg>, RelayError> {
        let room = self.room(game_id)?;
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let (recipients, roster) = {
            let mut state = room.state.lock();
            let seat = state.seat_mut(player_id).ok_or(RelayError::UnknownPlayer)?;
            if seat.outbound.replace(tx).is_some() {
                debug!(game_id = %game_id, player_id = %player_id, "Replacing existing connection");
            }
            (state.recipients(None), state.roster())
        };

        info!(
            game_id = %game_id,
            player_id = %player_id,
            age_secs = (Utc::now() - room.created_at).num_seconds(),
            "Player connected"
        );

        deliver(recipients, RelayMsg::PlayerJoined { players: roster }).await;
        Ok(rx)
    }

    /// Process one message from a connected player
    pub async fn handle(&self, game_id: Uuid, player_id: Uuid, msg: ClientMsg) -> Result<(), RelayError> {
        let room = self.room(game_id)?;

        match msg {
            ClientMsg::PlayerReady => {
                let (others, start) = {
                    let mut state = room.state.lock();
                    state.seat_mut(player_id).ok_or(RelayError::UnknownPlayer)?.info.ready = true;

                    let all_ready = state.seats.len() == SEATS && state.seats.iter().all(|s| s.info.ready);
                    let start = if state.status == RoomStatus::Waiting && all_ready {
                        state.status = RoomStatus::Racing;
                        Some(state.recipients(None))
                    } else {
                        None
                    };
                    (state.recipients(Some(player_id)), start)
                };

                debug!(game_id = %game_id, player_id = %player_id, "Player ready");
                deliver(others, RelayMsg::PlayerReady { player_id }).await;

                if let Some(everyone) = start {
                    info!(game_id = %game_id, "All players ready, starting race");
                    deliver(everyone, RelayMsg::GameStart { start_time: unix_millis() }).await;
                }
            }

            ClientMsg::PositionUpdate {
                position,
                rotation,
                speed,
            } => {
                let others = {
                    let mut state = room.state.lock();
                    let seat = state.seat_mut(player_id).ok_or(RelayError::UnknownPlayer)?;
                    if !seat.limiter.check_position() {
                        debug!(game_id = %game_id, player_id = %player_id, "Rate limited position update");
                        return Ok(());
                    }
                    state.recipients(Some(player_id))
                };

                deliver(
                    others,
                    RelayMsg::PositionUpdate {
                        player_id,
                        position,
                        rotation,
                        speed,
                    },
                )
                .await;
            }

            ClientMsg::LapCompleted { lap, lap_time } => {
                let (others, completed) = {
                    let mut state = room.state.lock();
                    let seat = state.seat_mut(player_id).ok_or(RelayError::UnknownPlayer)?;
                    seat.info.current_lap = seat.info.current_lap.max(lap);

                    let everyone_done = state.seats.len() == SEATS
                        && state.seats.iter().all(|s| s.info.current_lap >= self.total_laps);
                    let completed = if everyone_done && state.status != RoomStatus::Completed {
                        state.status = RoomStatus::Completed;
                        Some(state.recipients(None))
                    } else {
                        None
                    };
                    (state.recipients(Some(player_id)), completed)
                };

                info!(game_id = %game_id, player_id = %player_id, lap, lap_time, "Lap completed");
                deliver(
                    others,
                    RelayMsg::LapCompleted {
                        player_id,
                        lap,
                        lap_time,
                    },
                )
                .await;

                if let Some(everyone) = completed {
                    info!(game_id = %game_id, "Game completed");
                    deliver(everyone, RelayMsg::GameCompleted).await;
                }
            }

            ClientMsg::PlayerQuit => {
                let (everyone, winner_id) = {
                    let mut state = room.state.lock();
                    if state.seat_mut(player_id).is_none() {
                        return Err(RelayError::UnknownPlayer);
                    }
                    if state.status == RoomStatus::Racing {
                        state.status = RoomStatus::Completed;
                    }
                    (state.recipients(None), state.other_than(player_id))
                };

                info!(game_id = %game_id, player_id = %player_id, winner_id = ?winner_id, "Player quit");
                deliver(everyone, RelayMsg::PlayerQuit { player_id, winner_id }).await;
            }
        }

        Ok(())
    }

    /// Detach a player's connection; the remaining player is named winner.
    /// The game is dropped once nobody is connected.
    pub async fn disconnect(&self, game_id: Uuid, player_id: Uuid) {
        let Ok(room) = self.room(game_id) else {
            return;
        };

        let (others, winner_id, empty) = {
            let mut state = room.state.lock();
            let Some(seat) = state.seat_mut(player_id) else {
                return;
            };
            if seat.outbound.take().is_none() {
                return;
            }
            seat.info.ready = false;
            (
                state.recipients(Some(player_id)),
                state.other_than(player_id),
                !state.any_connected(),
            )
        };

        info!(game_id = %game_id, player_id = %player_id, winner_id = ?winner_id, "Player disconnected");
        deliver(others, RelayMsg::PlayerDisconnected { player_id, winner_id }).await;

        if empty {
            self.games.remove(&game_id);
            info!(game_id = %game_id, "Game removed");
        }
    }
}

/// Send to every recipient. Position updates are shed when a queue is
/// full; everything else waits for room.
async fn deliver(recipients: Vec<mpsc::Sender<RelayMsg>>, msg: RelayMsg) {
    let critical = msg.is_critical();
    for tx in recipients {
        if critical {
            if tx.send(msg.clone()).await.is_err() {
                debug!("Recipient channel closed");
            }
        } else if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(msg.clone()) {
            warn!("Outbound queue full, dropping position update");
        }
    }
}
