//! In-process relay: game rooms and message fan-out between two players

pub mod hub;
pub mod link;

pub use hub::{CreatedGame, JoinedGame, RelayError, RelayHub};
pub use link::RelayLink;
