//! WebSocket protocol message definitions
//! These are the wire types exchanged between clients and the relay

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Vector as `{x, y, z}` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for WireVec3 {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<WireVec3> for Vec3 {
    fn from(v: WireVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

impl WireVec3 {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Messages sent from client to relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Sender is ready to race
    PlayerReady,

    /// Sender's vehicle pose; droppable
    PositionUpdate {
        position: WireVec3,
        /// Euler angles in radians, yaw in `y`
        rotation: WireVec3,
        /// Horizontal speed magnitude in m/s, never negative
        speed: f32,
    },

    /// Sender completed a lap
    LapCompleted {
        /// Laps completed so far
        lap: u32,
        /// Lap duration in whole seconds
        #[serde(rename = "lapTime")]
        lap_time: u64,
    },

    /// Sender gives up
    PlayerQuit,
}

/// Messages sent from relay to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMsg {
    /// Roster changed
    PlayerJoined {
        players: HashMap<Uuid, PlayerInfo>,
    },

    /// Another player is ready
    PlayerReady {
        player_id: Uuid,
    },

    /// Begin racing
    GameStart {
        /// Relay wall clock in unix millis; informational only
        #[serde(rename = "startTime")]
        start_time: u64,
    },

    /// Opponent pose
    PositionUpdate {
        player_id: Uuid,
        position: WireVec3,
        rotation: WireVec3,
        speed: f32,
    },

    /// Opponent lap
    LapCompleted {
        player_id: Uuid,
        lap: u32,
        #[serde(rename = "lapTime")]
        lap_time: u64,
    },

    /// A player quit; `winner_id` is the remaining player
    PlayerQuit {
        player_id: Uuid,
        winner_id: Option<Uuid>,
    },

    /// A player's connection dropped; `winner_id` is the remaining player
    PlayerDisconnected {
        player_id: Uuid,
        winner_id: Option<Uuid>,
    },

    /// Every player finished
    GameCompleted,

    /// Request rejected by the relay
    Error {
        message: String,
    },
}

impl RelayMsg {
    /// Must-not-drop messages; everything else may be shed under load
    pub fn is_critical(&self) -> bool {
        !matches!(self, RelayMsg::PositionUpdate { .. })
    }
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: Uuid,
    pub ready: bool,
    pub current_lap: u32,
}

impl PlayerInfo {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ready: false,
            current_lap: 0,
        }
    }
}

/// Payload that could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Decode a relay message, rejecting poses that would poison the shadow state
pub fn decode_relay_msg(text: &str) -> Result<RelayMsg, ProtocolError> {
    let msg: RelayMsg = serde_json::from_str(text)?;
    if let RelayMsg::PositionUpdate {
        position,
        rotation,
        speed,
        ..
    } = &msg
    {
        check_pose(position, rotation, *speed)?;
    }
    Ok(msg)
}

/// Decode a client message
pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    let msg: ClientMsg = serde_json::from_str(text)?;
    if let ClientMsg::PositionUpdate {
        position,
        rotation,
        speed,
    } = &msg
    {
        check_pose(position, rotation, *speed)?;
    }
    Ok(msg)
}

fn check_pose(position: &WireVec3, rotation: &WireVec3, speed: f32) -> Result<(), ProtocolError> {
    if !position.is_finite() {
        return Err(ProtocolError::NonFinite("position"));
    }
    if !rotation.is_finite() {
        return Err(ProtocolError::NonFinite("rotation"));
    }
    if !speed.is_finite() {
        return Err(ProtocolError::NonFinite("speed"));
    }
    Ok(())
}
