//! Track model and seeded track generation

use glam::Vec3;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Track length in meters
pub const TRACK_LENGTH: f32 = 5000.0;

/// Distance past the start line where trucks are placed on the grid
pub const GRID_OFFSET: f32 = 5.0;

/// Ride height of a truck on the flat ground plane
pub const RIDE_HEIGHT: f32 = 1.0;

/// Visual theme. Has no effect on physics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Desert,
    Snow,
    Forest,
    City,
    Space,
}

impl TrackType {
    pub const ALL: [TrackType; 5] = [
        TrackType::Desert,
        TrackType::Snow,
        TrackType::Forest,
        TrackType::City,
        TrackType::Space,
    ];
}

/// Cosmetic set pieces placed along a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackFeature {
    Jumps,
    Hairpins,
    Obstacles,
    Ramps,
    Tunnels,
}

impl TrackFeature {
    pub const ALL: [TrackFeature; 5] = [
        TrackFeature::Jumps,
        TrackFeature::Hairpins,
        TrackFeature::Obstacles,
        TrackFeature::Ramps,
        TrackFeature::Tunnels,
    ];
}

/// Timing marker across the track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: u32,
    /// Distance along the track from the start/finish line
    pub position: f32,
    /// Marker placement; cosmetic only
    pub lateral_offset: f32,
}

/// One lap's worth of track.
///
/// The circuit is modelled as a closed loop unrolled along +z: progress is
/// `z - start_z` taken modulo the length, and the centerline runs at `x = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTrack")]
pub struct Track {
    #[serde(rename = "type")]
    pub track_type: TrackType,
    pub features: Vec<TrackFeature>,
    pub length: f32,
    pub checkpoints: Vec<Checkpoint>,
}

#[derive(Deserialize)]
struct RawTrack {
    #[serde(rename = "type")]
    track_type: TrackType,
    #[serde(default)]
    features: Vec<TrackFeature>,
    length: f32,
    checkpoints: Vec<Checkpoint>,
}

impl TryFrom<RawTrack> for Track {
    type Error = TrackError;

    fn try_from(raw: RawTrack) -> Result<Self, Self::Error> {
        Track::new(raw.track_type, raw.features, raw.length, raw.checkpoints)
    }
}

/// Track invariant violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    #[error("track must have at least one checkpoint")]
    NoCheckpoints,

    #[error("a race needs at least one track")]
    NoTracks,

    #[error("track length must be positive, got {0}")]
    InvalidLength(f32),

    #[error("checkpoint 0 must sit on the start/finish line, found at {0}")]
    StartNotAtOrigin(f32),

    #[error("checkpoint {index} at {position} is not past the previous one")]
    NotIncreasing { index: usize, position: f32 },

    #[error("checkpoint {index} at {position} lies beyond the track length")]
    OutOfRange { index: usize, position: f32 },
}

impl Track {
    /// Build a track, enforcing strictly increasing checkpoint positions
    /// with checkpoint 0 on the start/finish line
    pub fn new(
        track_type: TrackType,
        features: Vec<TrackFeature>,
        length: f32,
        checkpoints: Vec<Checkpoint>,
    ) -> Result<Self, TrackError> {
        if !(length > 0.0) {
            return Err(TrackError::InvalidLength(length));
        }
        let first = checkpoints.first().ok_or(TrackError::NoCheckpoints)?;
        if first.position != 0.0 {
            return Err(TrackError::StartNotAtOrigin(first.position));
        }
        for (index, pair) in checkpoints.windows(2).enumerate() {
            if !(pair[1].position > pair[0].position) {
                return Err(TrackError::NotIncreasing {
                    index: index + 1,
                    position: pair[1].position,
                });
            }
        }
        if let Some((index, cp)) = checkpoints
            .iter()
            .enumerate()
            .find(|(_, cp)| cp.position >= length)
        {
            return Err(TrackError::OutOfRange {
                index,
                position: cp.position,
            });
        }

        Ok(Self {
            track_type,
            features,
            length,
            checkpoints,
        })
    }

    /// World z of the start/finish line
    pub fn start_z(&self) -> f32 {
        -self.length / 2.0
    }

    /// Distance along the lap for a world position, in `[0, length)`
    pub fn progress(&self, position: Vec3) -> f32 {
        (position.z - self.start_z()).rem_euclid(self.length)
    }

    /// Signed distance from the centerline
    pub fn lateral_offset(&self, position: Vec3) -> f32 {
        position.x
    }

    /// Grid slot just past the start line, facing down the track
    pub fn grid_position(&self, lane: f32) -> Vec3 {
        Vec3::new(lane, RIDE_HEIGHT, self.start_z() + GRID_OFFSET)
    }
}

/// Generate one random track
pub fn generate_track<R: Rng + ?Sized>(rng: &mut R) -> Track {
    let track_type = *TrackType::ALL
        .choose(rng)
        .unwrap_or(&TrackType::City);
    let feature_count = rng.gen_range(2..=4);
    let features: Vec<TrackFeature> = TrackFeature::ALL
        .choose_multiple(rng, feature_count)
        .copied()
        .collect();

    let count = rng.gen_range(8..=15);
    let spacing = TRACK_LENGTH / count as f32;
    // jitter stays under half the spacing so ordering survives
    let jitter = (spacing * 0.4).min(100.0);

    let checkpoints = (0..count)
        .map(|i| {
            let position = if i == 0 {
                0.0
            } else {
                i as f32 * spacing + rng.gen_range(-jitter..=jitter)
            };
            Checkpoint {
                id: i,
                position,
                lateral_offset: rng.gen_range(-20..=20) as f32,
            }
        })
        .collect();

    Track {
        track_type,
        features,
        length: TRACK_LENGTH,
        checkpoints,
    }
}

/// One track per lap, reproducible from `seed`
pub fn generate_tracks(seed: u64, laps: u32) -> Vec<Track> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..laps).map(|_| generate_track(&mut rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(id: u32, position: f32) -> Checkpoint {
        Checkpoint {
            id,
            position,
            lateral_offset: 0.0,
        }
    }

    #[test]
    fn generated_tracks_satisfy_invariants() {
        for track in generate_tracks(7, 50) {
            let rebuilt = Track::new(
                track.track_type,
                track.features.clone(),
                track.length,
                track.checkpoints.clone(),
            );
            assert_eq!(rebuilt.as_ref(), Ok(&track));
            assert!((8..=15).contains(&track.checkpoints.len()));
            assert!((2..=4).contains(&track.features.len()));
        }
    }

    #[test]
    fn generation_is_reproducible() {
        assert_eq!(generate_tracks(42, 10), generate_tracks(42, 10));
        assert_ne!(generate_tracks(42, 10), generate_tracks(43, 10));
    }

    #[test]
    fn rejects_out_of_order_checkpoints() {
        let err = Track::new(
            TrackType::Snow,
            vec![],
            1000.0,
            vec![cp(0, 0.0), cp(1, 400.0), cp(2, 300.0)],
        )
        .unwrap_err();
        assert_eq!(err, TrackError::NotIncreasing { index: 2, position: 300.0 });
    }

    #[test]
    fn rejects_start_line_off_origin() {
        let err = Track::new(TrackType::City, vec![], 1000.0, vec![cp(0, 10.0)]).unwrap_err();
        assert_eq!(err, TrackError::StartNotAtOrigin(10.0));
    }

    #[test]
    fn progress_wraps_around_the_loop() {
        let track = Track::new(TrackType::City, vec![], 1000.0, vec![cp(0, 0.0)]).unwrap();
        assert_eq!(track.progress(Vec3::new(0.0, 1.0, -500.0)), 0.0);
        assert_eq!(track.progress(Vec3::new(0.0, 1.0, 0.0)), 500.0);
        assert_eq!(track.progress(Vec3::new(0.0, 1.0, 600.0)), 100.0);
        assert_eq!(track.progress(Vec3::new(0.0, 1.0, -600.0)), 900.0);
    }

    #[test]
    fn wire_shape_uses_type_tag() {
        let track = Track::new(
            TrackType::Desert,
            vec![TrackFeature::Jumps],
            5000.0,
            vec![cp(0, 0.0), cp(1, 2500.0)],
        )
        .unwrap();
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["type"], "desert");
        assert_eq!(json["features"][0], "jumps");

        let back: Track = serde_json::from_value(json).unwrap();
        assert_eq!(back, track);
    }

    #[test]
    fn deserializing_invalid_track_fails() {
        let json = serde_json::json!({
            "type": "space",
            "length": 5000.0,
            "checkpoints": [
                {"id": 0, "position": 0.0, "lateral_offset": 0.0},
                {"id": 1, "position": 0.0, "lateral_offset": 0.0}
            ]
        });
        assert!(serde_json::from_value::<Track>(json).is_err());
    }
}
