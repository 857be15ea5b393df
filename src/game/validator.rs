//! Lap and checkpoint validation plus the off-track penalty state machine
//!
//! Only the locally simulated truck is ever fed through here. The opponent's
//! shadow never is.

use glam::Vec3;
use tracing::{debug, info};

use crate::config::RaceConfig;

use super::track::{Track, TrackError};

/// Slack when comparing accumulated tick deltas against the penalty duration
const PENALTY_EPSILON: f32 = 1e-4;

/// Where the truck is relative to the track edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    OnTrack,
    OffTrack,
}

/// Off-track penalty countdown
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PenaltyState {
    /// Inside the track edges
    Clear,
    /// Outside the edges; `elapsed` seconds of grace used so far
    Pending { elapsed: f32 },
}

/// A lap that was just validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapCompletion {
    /// Laps completed so far, including this one
    pub lap: u32,
}

/// Result of feeding one tick's position through the validator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorUpdate {
    pub status: TrackStatus,
    /// Set on the tick the countdown ran out: stop the truck and move it here
    pub relocate_to: Option<Vec3>,
    pub lap: Option<LapCompletion>,
    /// Set once the final lap has been validated
    pub race_complete: bool,
}

/// Validates one player's laps across the race's track sequence
#[derive(Debug, Clone)]
pub struct TrackValidator {
    tracks: Vec<Track>,
    total_laps: u32,
    half_width: f32,
    penalty_secs: f32,
    lap: u32,
    /// Per-checkpoint passed flags for the current lap; index 0 is the line
    passed: Vec<bool>,
    last_progress: Option<f32>,
    last_on_track: Vec3,
    penalty: PenaltyState,
    complete: bool,
}

impl TrackValidator {
    pub fn new(tracks: Vec<Track>, config: &RaceConfig, start: Vec3) -> Result<Self, TrackError> {
        let first = tracks.first().ok_or(TrackError::NoTracks)?;
        let passed = vec![false; first.checkpoints.len()];
        let last_progress = Some(first.progress(start));

        Ok(Self {
            tracks,
            total_laps: config.total_laps,
            half_width: config.track_half_width,
            penalty_secs: config.off_track_penalty_secs,
            lap: 0,
            passed,
            last_progress,
            last_on_track: start,
            penalty: PenaltyState::Clear,
            complete: false,
        })
    }

    pub fn current_lap(&self) -> u32 {
        self.lap
    }

    pub fn total_laps(&self) -> u32 {
        self.total_laps
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn penalty_state(&self) -> PenaltyState {
        self.penalty
    }

    pub fn last_on_track(&self) -> Vec3 {
        self.last_on_track
    }

    /// Seconds left before the off-track penalty applies, if counting down
    pub fn penalty_remaining(&self) -> Option<f32> {
        match self.penalty {
            PenaltyState::Clear => None,
            PenaltyState::Pending { elapsed } => Some((self.penalty_secs - elapsed).max(0.0)),
        }
    }

    /// Track for the lap currently being driven
    pub fn current_track(&self) -> &Track {
        let index = (self.lap as usize).min(self.tracks.len() - 1);
        &self.tracks[index]
    }

    pub fn checkpoints_passed(&self) -> &[bool] {
        &self.passed
    }

    pub fn is_on_track(&self, position: Vec3) -> bool {
        self.current_track().lateral_offset(position).abs() <= self.half_width
    }

    /// Feed the truck's position after this tick's physics step
    pub fn update(&mut self, position: Vec3, dt: f32) -> ValidatorUpdate {
        let inside = self.is_on_track(position);
        let status = if inside {
            TrackStatus::OnTrack
        } else {
            TrackStatus::OffTrack
        };

        let mut update = ValidatorUpdate {
            status,
            relocate_to: None,
            lap: None,
            race_complete: self.complete,
        };

        // Progress only advances on track; a stretch driven outside the
        // edges is credited from the last on-track point once back inside.
        if inside {
            let progress = self.current_track().progress(position);
            if !self.complete {
                if let Some(previous) = self.last_progress {
                    update.lap = self.cross(previous, progress);
                }
            }
            // the track may have changed with a new lap
            self.last_progress = Some(self.current_track().progress(position));
            update.race_complete = self.complete;
        }

        if inside {
            self.last_on_track = position;
            if let PenaltyState::Pending { elapsed } = self.penalty {
                debug!(elapsed, "Back on track before penalty");
            }
            self.penalty = PenaltyState::Clear;
            return update;
        }

        match self.penalty {
            PenaltyState::Clear => {
                info!(
                    lap = self.lap,
                    lateral = self.current_track().lateral_offset(position),
                    "Left the track, penalty countdown started"
                );
                self.penalty = PenaltyState::Pending { elapsed: 0.0 };
            }
            PenaltyState::Pending { elapsed } => {
                let elapsed = elapsed + dt.max(0.0);
                if elapsed + PENALTY_EPSILON >= self.penalty_secs {
                    info!(
                        x = self.last_on_track.x,
                        z = self.last_on_track.z,
                        "Off-track penalty applied, relocating"
                    );
                    self.penalty = PenaltyState::Clear;
                    self.last_progress = Some(self.current_track().progress(self.last_on_track));
                    update.relocate_to = Some(self.last_on_track);
                } else {
                    self.penalty = PenaltyState::Pending { elapsed };
                }
            }
        }

        update
    }

    /// Checkpoint bookkeeping for forward travel from `previous` to `current`.
    ///
    /// Backward travel crosses nothing. A checkpoint only counts once every
    /// earlier one this lap is passed; the line only counts once all are.
    fn cross(&mut self, previous: f32, current: f32) -> Option<LapCompletion> {
        let track = self.current_track();
        let length = track.length;
        let travelled = (current - previous).rem_euclid(length);
        if travelled <= 0.0 || travelled > length / 2.0 {
            return None;
        }

        let mut crossed: Vec<(usize, f32)> = track
            .checkpoints
            .iter()
            .enumerate()
            .filter_map(|(index, cp)| {
                let ahead = (cp.position - previous).rem_euclid(length);
                (ahead > 0.0 && ahead <= travelled).then_some((index, ahead))
            })
            .collect();
        crossed.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (index, _) in crossed {
            if index == 0 {
                if self.passed[1..].iter().all(|p| *p) {
                    return Some(self.complete_lap());
                }
                debug!(lap = self.lap, "Crossed the line with checkpoints missing");
            } else if self.passed[1..index].iter().all(|p| *p) {
                if !self.passed[index] {
                    self.passed[index] = true;
                    debug!(lap = self.lap, checkpoint = index, "Checkpoint passed");
                }
            } else {
                debug!(lap = self.lap, checkpoint = index, "Checkpoint out of order, ignored");
            }
        }

        None
    }

    fn complete_lap(&mut self) -> LapCompletion {
        self.lap += 1;
        if self.lap >= self.total_laps {
            self.complete = true;
        }
        let checkpoints = self.current_track().checkpoints.len();
        self.passed = vec![false; checkpoints];

        info!(lap = self.lap, total = self.total_laps, "Lap completed");
        LapCompletion { lap: self.lap }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::track::{Checkpoint, TrackType};

    /// 1000m loop with checkpoints at 0, 250, 500, 750; start line at z = -500
    fn square_track() -> Track {
        let checkpoints = [0.0, 250.0, 500.0, 750.0]
            .iter()
            .enumerate()
            .map(|(i, p)| Checkpoint {
                id: i as u32,
                position: *p,
                lateral_offset: 0.0,
            })
            .collect();
        Track::new(TrackType::City, vec![], 1000.0, checkpoints).unwrap()
    }

    fn at(progress: f32) -> Vec3 {
        Vec3::new(0.0, 1.0, -500.0 + progress)
    }

    fn validator(laps: u32) -> TrackValidator {
        let config = RaceConfig {
            total_laps: laps,
            ..RaceConfig::default()
        };
        TrackValidator::new(vec![square_track(); laps as usize], &config, at(5.0)).unwrap()
    }

    /// Drive forward from `from` to `to` (may exceed the length to wrap) in 10m steps
    fn drive(v: &mut TrackValidator, from: f32, to: f32) -> Vec<LapCompletion> {
        let mut laps = Vec::new();
        let mut p = from;
        while p < to {
            p = (p + 10.0).min(to);
            if let Some(lap) = v.update(at(p), 0.1).lap {
                laps.push(lap);
            }
        }
        laps
    }

    #[test]
    fn rejects_empty_track_sequence() {
        let err = TrackValidator::new(vec![], &RaceConfig::default(), Vec3::ZERO).unwrap_err();
        assert_eq!(err, TrackError::NoTracks);
    }

    #[test]
    fn full_lap_in_order_counts_once_and_resets_flags() {
        let mut v = validator(3);
        let laps = drive(&mut v, 5.0, 1005.0);
        assert_eq!(laps, vec![LapCompletion { lap: 1 }]);
        assert_eq!(v.current_lap(), 1);
        assert!(v.checkpoints_passed().iter().all(|p| !p));
    }

    #[test]
    fn crossing_line_without_checkpoints_does_not_count() {
        let mut v = validator(3);
        // jump straight to just before the line, then cross it
        v.update(at(995.0), 0.1);
        let update = v.update(at(2.0), 0.1);
        assert_eq!(update.lap, None);
        assert_eq!(v.current_lap(), 0);
    }

    #[test]
    fn out_of_order_checkpoints_are_ignored() {
        let mut v = validator(3);
        // arrive past checkpoint 1 without ever crossing it
        v.update(at(240.0), 0.1);
        v.last_progress = Some(260.0);
        drive(&mut v, 260.0, 990.0);
        assert_eq!(v.checkpoints_passed(), &[false, false, false, false]);

        let laps = drive(&mut v, 990.0, 1010.0);
        assert!(laps.is_empty());
        assert_eq!(v.current_lap(), 0);
    }

    #[test]
    fn reversing_over_the_line_does_not_count() {
        let mut v = validator(3);
        drive(&mut v, 5.0, 1005.0);
        assert_eq!(v.current_lap(), 1);

        // back over the line, then forward over it again
        let back = v.update(at(-5.0), 0.1);
        assert_eq!(back.lap, None);
        let again = v.update(at(5.0), 0.1);
        assert_eq!(again.lap, None);
        assert_eq!(v.current_lap(), 1);
    }

    #[test]
    fn backward_travel_crosses_nothing() {
        let mut v = validator(3);
        v.update(at(300.0), 0.1);
        assert_eq!(v.checkpoints_passed(), &[false, true, false, false]);
        v.update(at(200.0), 0.1);
        v.update(at(100.0), 0.1);
        assert_eq!(v.checkpoints_passed(), &[false, true, false, false]);
    }

    #[test]
    fn final_lap_completes_race() {
        let mut v = validator(2);
        drive(&mut v, 5.0, 1005.0);
        assert!(!v.is_complete());
        let laps = drive(&mut v, 1005.0, 2005.0);
        assert_eq!(laps, vec![LapCompletion { lap: 2 }]);
        assert!(v.is_complete());

        // further laps are not counted
        let extra = drive(&mut v, 2005.0, 3005.0);
        assert!(extra.is_empty());
        assert_eq!(v.current_lap(), 2);
    }

    #[test]
    fn staying_within_half_width_never_goes_off_track() {
        let mut v = validator(3);
        for i in 0..10_000 {
            let x = if i % 2 == 0 { 9.99 } else { -10.0 };
            let update = v.update(Vec3::new(x, 1.0, -400.0), 1.0 / 60.0);
            assert_eq!(update.status, TrackStatus::OnTrack);
            assert_eq!(v.penalty_state(), PenaltyState::Clear);
        }
    }

    #[test]
    fn full_penalty_duration_relocates_to_last_on_track_position() {
        let mut v = validator(3);
        let safe = Vec3::new(4.0, 1.0, -300.0);
        v.update(safe, 0.5);

        let off = Vec3::new(15.0, 1.0, -290.0);
        let entering = v.update(off, 0.5);
        assert_eq!(entering.status, TrackStatus::OffTrack);
        assert_eq!(v.penalty_remaining(), Some(5.0));

        for _ in 0..9 {
            assert_eq!(v.update(off, 0.5).relocate_to, None);
        }
        let last = v.update(off, 0.5);
        assert_eq!(last.relocate_to, Some(safe));
        assert_eq!(v.penalty_state(), PenaltyState::Clear);
    }

    #[test]
    fn returning_in_time_cancels_penalty() {
        let mut v = validator(3);
        let off = Vec3::new(-12.0, 1.0, -300.0);
        v.update(off, 1.0 / 60.0);
        for _ in 0..(4 * 60) {
            assert_eq!(v.update(off, 1.0 / 60.0).relocate_to, None);
        }
        let back = v.update(Vec3::new(0.0, 1.0, -299.0), 1.0 / 60.0);
        assert_eq!(back.status, TrackStatus::OnTrack);
        assert_eq!(back.relocate_to, None);
        assert_eq!(v.penalty_remaining(), None);
    }

    #[test]
    fn checkpoint_driven_past_off_track_is_credited_on_return() {
        let mut v = validator(3);
        v.update(at(240.0), 0.1);
        v.update(Vec3::new(30.0, 1.0, -500.0 + 260.0), 0.1);
        assert_eq!(v.checkpoints_passed(), &[false, false, false, false]);

        v.update(at(270.0), 0.1);
        assert_eq!(v.checkpoints_passed(), &[false, true, false, false]);
    }
}
