//! Socket-free connection to a `RelayHub`
//!
//! Same message flow as the WebSocket handler, minus the JSON framing.
//! Used by local/bot clients and by tests.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, RelayMsg};

use super::hub::{RelayError, RelayHub};

/// Client side of an attached relay connection
pub struct RelayLink {
    pub outbound: mpsc::Sender<ClientMsg>,
    pub inbound: mpsc::Receiver<RelayMsg>,
}

impl RelayLink {
    /// Split into sender and receiver halves
    pub fn split(self) -> (mpsc::Sender<ClientMsg>, mpsc::Receiver<RelayMsg>) {
        (self.outbound, self.inbound)
    }
}

/// Attach a seated player to the hub.
///
/// Dropping the returned `outbound` sender disconnects the player.
pub async fn attach(hub: Arc<RelayHub>, game_id: Uuid, player_id: Uuid) -> Result<RelayLink, RelayError> {
    let inbound = hub.connect(game_id, player_id).await?;
    let (outbound, mut client_rx) = mpsc::channel::<ClientMsg>(64);

    tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if let Err(e) = hub.handle(game_id, player_id, msg).await {
                warn!(game_id = %game_id, player_id = %player_id, error = %e, "Relay rejected message");
                if e == RelayError::GameNotFound {
                    break;
                }
            }
        }
        debug!(game_id = %game_id, player_id = %player_id, "Link closed");
        hub.disconnect(game_id, player_id).await;
    });

    Ok(RelayLink { outbound, inbound })
}
