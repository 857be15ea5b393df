//! Session lifecycle: lobby -> ready-wait -> racing -> finished
//!
//! Fed by relayed events and by the local lap validator. Nothing leaves
//! `Finished`; a rematch needs a fresh session.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RaceConfig;
use crate::ws::protocol::PlayerInfo;

use super::track::Track;

/// Seats in a session
pub const MAX_PLAYERS: usize = 2;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for players / nobody ready
    Lobby,
    /// At least one player ready, waiting for the relay's start signal
    ReadyWait,
    /// Race in progress
    Racing,
    /// Outcome decided
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// One seat in the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: Uuid,
    pub ready: bool,
    /// Laps completed; never decreases
    pub current_lap: u32,
    pub connection: ConnectionStatus,
}

impl Player {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ready: false,
            current_lap: 0,
            connection: ConnectionStatus::Connected,
        }
    }

    fn record_lap(&mut self, lap: u32) {
        self.current_lap = self.current_lap.max(lap);
    }
}

/// Why the race ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Someone completed every lap
    LapsCompleted,
    /// The relay reported the opponent quit or disconnected
    OpponentLeft,
    /// Our relay channel closed and no explicit notice arrived in time
    ChannelLost,
    /// The local player quit
    Forfeit,
    /// The relay declared the game complete
    RelayCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceOutcome {
    pub winner: Option<Uuid>,
    pub reason: FinishReason,
}

/// Client-side view of one game session
#[derive(Debug, Clone)]
pub struct RaceSession {
    game_id: Uuid,
    local_id: Uuid,
    players: Vec<Player>,
    tracks: Vec<Track>,
    phase: SessionPhase,
    total_laps: u32,
    outcome: Option<RaceOutcome>,
    channel_lost_at: Option<u64>,
    disconnect_timeout: Duration,
}

impl RaceSession {
    pub fn new(game_id: Uuid, local_id: Uuid, tracks: Vec<Track>, config: &RaceConfig) -> Self {
        Self {
            game_id,
            local_id,
            players: vec![Player::new(local_id)],
            tracks,
            phase: SessionPhase::Lobby,
            total_laps: config.total_laps,
            outcome: None,
            channel_lost_at: None,
            disconnect_timeout: config.disconnect_timeout,
        }
    }

    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_racing(&self) -> bool {
        self.phase == SessionPhase::Racing
    }

    pub fn outcome(&self) -> Option<RaceOutcome> {
        self.outcome
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn total_laps(&self) -> u32 {
        self.total_laps
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn local(&self) -> &Player {
        // seat 0 is always the local player
        &self.players[0]
    }

    pub fn opponent(&self) -> Option<&Player> {
        self.players.get(1)
    }

    fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Find or seat a remote player; None when both seats are taken
    fn seat(&mut self, id: Uuid) -> Option<&mut Player> {
        if !self.players.iter().any(|p| p.id == id) {
            if self.players.len() >= MAX_PLAYERS {
                warn!(game_id = %self.game_id, player_id = %id, "Session full, ignoring extra player");
                return None;
            }
            self.players.push(Player::new(id));
        }
        self.player_mut(id)
    }

    /// Apply a `player_joined` roster
    pub fn apply_roster(&mut self, roster: &HashMap<Uuid, PlayerInfo>) {
        for (id, info) in roster {
            if let Some(player) = self.seat(*id) {
                player.ready |= info.ready;
                player.record_lap(info.current_lap);
                player.connection = ConnectionStatus::Connected;
            }
        }
        self.promote_if_ready();
    }

    /// Flag the local player ready. Returns true if `player_ready` should be sent.
    pub fn mark_local_ready(&mut self) -> bool {
        if !matches!(self.phase, SessionPhase::Lobby | SessionPhase::ReadyWait) {
            return false;
        }
        if self.players[0].ready {
            return false;
        }
        self.players[0].ready = true;
        self.promote_if_ready();
        true
    }

    /// Apply a relayed `player_ready` for a remote player
    pub fn mark_remote_ready(&mut self, id: Uuid) {
        if id == self.local_id {
            return;
        }
        if let Some(player) = self.seat(id) {
            player.ready = true;
        }
        self.promote_if_ready();
    }

    fn promote_if_ready(&mut self) {
        if self.phase == SessionPhase::Lobby && self.players.iter().any(|p| p.ready) {
            self.phase = SessionPhase::ReadyWait;
        }
    }

    /// `game_start` from the relay. Returns true when the race actually starts.
    pub fn start_race(&mut self) -> bool {
        match self.phase {
            SessionPhase::Lobby | SessionPhase::ReadyWait => {
                self.phase = SessionPhase::Racing;
                info!(game_id = %self.game_id, "Race started");
                true
            }
            SessionPhase::Racing | SessionPhase::Finished => false,
        }
    }

    /// Lap validated by the local track validator
    pub fn record_local_lap(&mut self, lap: u32) -> Option<RaceOutcome> {
        if !self.is_racing() {
            return None;
        }
        self.players[0].record_lap(lap);
        if lap >= self.total_laps {
            return self.finish(Some(self.local_id), FinishReason::LapsCompleted);
        }
        None
    }

    /// Relayed `lap_completed` from the opponent
    pub fn record_opponent_lap(&mut self, id: Uuid, lap: u32) -> Option<RaceOutcome> {
        if id == self.local_id {
            return None;
        }
        self.seat(id)?.record_lap(lap);

        if self.is_racing() && lap >= self.total_laps {
            return self.finish(Some(id), FinishReason::LapsCompleted);
        }
        None
    }

    /// Relayed `player_quit` / `player_disconnected`.
    ///
    /// Only a race in progress is resolved, and only in favour of the
    /// named winner when that is us. Duplicates are no-ops.
    pub fn player_left(&mut self, departed: Uuid, winner: Option<Uuid>) -> Option<RaceOutcome> {
        if let Some(player) = self.player_mut(departed) {
            player.connection = ConnectionStatus::Disconnected;
            player.ready = false;
        }

        if self.is_racing() && winner == Some(self.local_id) {
            return self.finish(winner, FinishReason::OpponentLeft);
        }
        None
    }

    /// The local player gives up; the opponent (if any) takes the win
    pub fn forfeit(&mut self) -> Option<RaceOutcome> {
        let winner = self.opponent().map(|p| p.id);
        self.finish(winner, FinishReason::Forfeit)
    }

    /// Relayed `game_completed`. Normally the outcome is already decided
    /// locally; if not, the player with every lap done takes it.
    pub fn relay_completed(&mut self) -> Option<RaceOutcome> {
        if !self.is_racing() {
            return None;
        }
        let finishers: Vec<Uuid> = self
            .players
            .iter()
            .filter(|p| p.current_lap >= self.total_laps)
            .map(|p| p.id)
            .collect();
        let winner = match finishers.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        self.finish(winner, FinishReason::RelayCompleted)
    }

    /// Our relay channel closed; start the disconnect timeout
    pub fn channel_closed(&mut self, now_ms: u64) {
        if self.is_racing() && self.channel_lost_at.is_none() {
            warn!(game_id = %self.game_id, "Relay channel closed mid-race");
            self.channel_lost_at = Some(now_ms);
        }
    }

    /// Resolve a lost channel in our favour once the timeout passes
    pub fn check_disconnect_timeout(&mut self, now_ms: u64) -> Option<RaceOutcome> {
        let lost_at = self.channel_lost_at?;
        if !self.is_racing() {
            return None;
        }
        let waited = Duration::from_millis(now_ms.saturating_sub(lost_at));
        if waited >= self.disconnect_timeout {
            return self.finish(Some(self.local_id), FinishReason::ChannelLost);
        }
        None
    }

    fn finish(&mut self, winner: Option<Uuid>, reason: FinishReason) -> Option<RaceOutcome> {
        if self.phase == SessionPhase::Finished {
            return None;
        }
        let outcome = RaceOutcome { winner, reason };
        self.phase = SessionPhase::Finished;
        self.outcome = Some(outcome);

        info!(
            game_id = %self.game_id,
            winner = ?winner,
            reason = ?reason,
            local_win = winner == Some(self.local_id),
            "Race finished"
        );
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (RaceSession, Uuid, Uuid) {
        let local = Uuid::new_v4();
        let remote = Uuid::new_v4();
        let session = RaceSession::new(Uuid::new_v4(), local, vec![], &RaceConfig::default());
        (session, local, remote)
    }

    fn roster(entries: &[(Uuid, bool)]) -> HashMap<Uuid, PlayerInfo> {
        entries
            .iter()
            .map(|(id, ready)| {
                (
                    *id,
                    PlayerInfo {
                        id: *id,
                        ready: *ready,
                        current_lap: 0,
                    },
                )
            })
            .collect()
    }

    fn racing() -> (RaceSession, Uuid, Uuid) {
        let (mut s, local, remote) = session();
        s.apply_roster(&roster(&[(local, false), (remote, false)]));
        assert!(s.mark_local_ready());
        s.mark_remote_ready(remote);
        assert!(s.start_race());
        (s, local, remote)
    }

    #[test]
    fn ready_moves_lobby_to_ready_wait_but_never_starts() {
        let (mut s, local, remote) = session();
        s.apply_roster(&roster(&[(local, false), (remote, false)]));
        assert_eq!(s.phase(), SessionPhase::Lobby);

        assert!(s.mark_local_ready());
        assert_eq!(s.phase(), SessionPhase::ReadyWait);
        assert!(!s.mark_local_ready(), "second ready is not re-sent");

        s.mark_remote_ready(remote);
        // both ready: still waiting for game_start
        assert_eq!(s.phase(), SessionPhase::ReadyWait);
        assert!(s.start_race());
        assert_eq!(s.phase(), SessionPhase::Racing);
        assert!(!s.start_race());
    }

    #[test]
    fn roster_with_ready_opponent_enters_ready_wait() {
        let (mut s, local, remote) = session();
        s.apply_roster(&roster(&[(local, false), (remote, true)]));
        assert_eq!(s.phase(), SessionPhase::ReadyWait);
        assert_eq!(s.opponent().map(|p| p.ready), Some(true));
    }

    #[test]
    fn third_player_is_not_seated() {
        let (mut s, local, remote) = session();
        let extra = Uuid::new_v4();
        s.apply_roster(&roster(&[(local, false), (remote, false), (extra, false)]));
        assert_eq!(s.players().len(), 2);
    }

    #[test]
    fn opponent_final_lap_wins_regardless_of_local_progress() {
        let (mut s, _, remote) = racing();
        s.record_local_lap(9);
        assert_eq!(s.local().current_lap, 9);

        let outcome = s.record_opponent_lap(remote, 10).unwrap();
        assert_eq!(outcome.winner, Some(remote));
        assert_eq!(s.phase(), SessionPhase::Finished);

        // nothing leaves finished
        assert_eq!(s.record_local_lap(10), None);
        assert_eq!(s.outcome().unwrap().winner, Some(remote));
    }

    #[test]
    fn local_final_lap_wins() {
        let (mut s, local, _) = racing();
        for lap in 1..10 {
            assert_eq!(s.record_local_lap(lap), None);
        }
        let outcome = s.record_local_lap(10).unwrap();
        assert_eq!(outcome, RaceOutcome { winner: Some(local), reason: FinishReason::LapsCompleted });
    }

    #[test]
    fn opponent_lap_index_never_decreases() {
        let (mut s, _, remote) = racing();
        s.record_opponent_lap(remote, 4);
        s.record_opponent_lap(remote, 3);
        assert_eq!(s.opponent().unwrap().current_lap, 4);
    }

    #[test]
    fn disconnect_naming_us_wins_exactly_once() {
        let (mut s, local, remote) = racing();
        let first = s.player_left(remote, Some(local));
        assert_eq!(first, Some(RaceOutcome { winner: Some(local), reason: FinishReason::OpponentLeft }));
        assert_eq!(s.player_left(remote, Some(local)), None);
        assert_eq!(s.opponent().unwrap().connection, ConnectionStatus::Disconnected);
        assert_eq!(s.outcome(), first);
    }

    #[test]
    fn disconnect_naming_someone_else_is_ignored() {
        let (mut s, _, remote) = racing();
        assert_eq!(s.player_left(Uuid::new_v4(), Some(remote)), None);
        assert!(s.is_racing());
    }

    #[test]
    fn lobby_departure_only_updates_roster() {
        let (mut s, local, remote) = session();
        s.apply_roster(&roster(&[(local, false), (remote, true)]));
        assert_eq!(s.player_left(remote, Some(local)), None);
        assert_eq!(s.phase(), SessionPhase::ReadyWait);
        assert!(!s.opponent().unwrap().ready);
    }

    #[test]
    fn forfeit_hands_win_to_opponent() {
        let (mut s, _, remote) = racing();
        let outcome = s.forfeit().unwrap();
        assert_eq!(outcome.winner, Some(remote));
        assert_eq!(outcome.reason, FinishReason::Forfeit);
    }

    #[test]
    fn lost_channel_resolves_after_timeout() {
        let config = RaceConfig {
            disconnect_timeout: Duration::from_secs(3),
            ..RaceConfig::default()
        };
        let local = Uuid::new_v4();
        let mut s = RaceSession::new(Uuid::new_v4(), local, vec![], &config);
        s.start_race();

        assert_eq!(s.check_disconnect_timeout(1_000), None);
        s.channel_closed(10_000);
        s.channel_closed(11_000);
        assert_eq!(s.check_disconnect_timeout(12_999), None);
        let outcome = s.check_disconnect_timeout(13_000).unwrap();
        assert_eq!(outcome.winner, Some(local));
        assert_eq!(outcome.reason, FinishReason::ChannelLost);
    }

    #[test]
    fn relay_completion_after_local_finish_keeps_local_outcome() {
        let (mut s, local, _) = racing();
        s.record_local_lap(10);
        assert_eq!(s.relay_completed(), None);
        assert_eq!(s.outcome().unwrap().winner, Some(local));
    }
}
