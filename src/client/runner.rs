//! Async driver for a `RaceClient`
//!
//! One task owns the client. A fixed-rate interval drives simulation ticks;
//! relay messages and UI commands are applied between ticks, so the local
//! truck only ever has a single writer.

use std::time::{Duration, Instant};

use governor::clock::Clock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::{ControlInput, RaceOutcome, SessionPhase};
use crate::relay::RelayLink;
use crate::util::time::{tick_delta, unix_millis, TICK_DURATION_MICROS};
use crate::ws::protocol::ClientMsg;

use super::{Effects, Frame, RaceClient, RaceEvent};

/// Anything that can report the driver's intent once per tick
pub trait ControlSource: Send {
    fn sample(&mut self) -> ControlInput;
}

/// Fixed input, e.g. a bot holding the throttle
impl ControlSource for ControlInput {
    fn sample(&mut self) -> ControlInput {
        *self
    }
}

/// Latest value published by an input thread
impl ControlSource for watch::Receiver<ControlInput> {
    fn sample(&mut self) -> ControlInput {
        *self.borrow()
    }
}

/// UI requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Ready,
    Quit,
}

/// Where frames and events go
pub struct Presentation {
    pub frames: watch::Sender<Option<Frame>>,
    pub events: mpsc::UnboundedSender<RaceEvent>,
}

/// Drive `client` until the race is decided or the UI goes away.
///
/// On every exit path the relay link is dropped (which disconnects the
/// player) and ticking stops. Returns the outcome, if one was reached.
pub async fn run_race<C, S>(
    mut client: RaceClient<C>,
    mut input: S,
    mut commands: mpsc::Receiver<ClientCommand>,
    link: RelayLink,
    presentation: Presentation,
) -> Option<RaceOutcome>
where
    C: Clock,
    S: ControlSource,
{
    let (outbound, mut inbound) = link.split();
    let mut relay_open = true;
    let mut commands_open = true;

    let mut ticker = interval(Duration::from_micros(TICK_DURATION_MICROS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let dt = last_tick
                    .map(|prev| now.duration_since(prev).as_secs_f32())
                    .unwrap_or_else(tick_delta);
                last_tick = Some(now);

                let output = client.tick(input.sample(), dt, unix_millis());
                presentation.frames.send_replace(Some(output.frame));
                dispatch(&mut client, &outbound, &mut relay_open, &presentation, output.effects).await;
            }

            msg = inbound.recv(), if relay_open => {
                match msg {
                    Some(msg) => {
                        let effects = client.handle_relay_msg(msg, unix_millis());
                        dispatch(&mut client, &outbound, &mut relay_open, &presentation, effects).await;
                    }
                    None => {
                        relay_open = false;
                        client.channel_closed(unix_millis());
                    }
                }
            }

            cmd = commands.recv(), if commands_open => {
                let effects = match cmd {
                    Some(ClientCommand::Ready) => client.mark_ready(),
                    Some(ClientCommand::Quit) => client.quit(unix_millis()),
                    None => {
                        debug!(player_id = %client.player_id(), "Command channel closed");
                        commands_open = false;
                        Effects::default()
                    }
                };
                dispatch(&mut client, &outbound, &mut relay_open, &presentation, effects).await;
            }
        }

        match client.phase() {
            SessionPhase::Finished => break,
            // nobody left to start the race
            SessionPhase::Lobby | SessionPhase::ReadyWait if !relay_open || !commands_open => break,
            _ => {}
        }
    }

    // final frame with frozen timers
    presentation.frames.send_replace(Some(client.frame(unix_millis())));
    drop(outbound);
    drop(inbound);

    info!(player_id = %client.player_id(), outcome = ?client.outcome(), "Race runner stopped");
    client.outcome()
}

async fn dispatch<C: Clock>(
    client: &mut RaceClient<C>,
    outbound: &mpsc::Sender<ClientMsg>,
    relay_open: &mut bool,
    presentation: &Presentation,
    effects: Effects,
) {
    for msg in effects.outbound {
        if *relay_open && !forward(outbound, msg).await {
            *relay_open = false;
            client.channel_closed(unix_millis());
        }
    }
    for event in effects.events {
        let _ = presentation.events.send(event);
    }
}

/// Queue one message on the link. Position updates never wait: they are
/// dropped when the link is backed up. Returns false once the link is closed.
async fn forward(outbound: &mpsc::Sender<ClientMsg>, msg: ClientMsg) -> bool {
    if !matches!(msg, ClientMsg::PositionUpdate { .. }) {
        return outbound.send(msg).await.is_ok();
    }
    match outbound.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Link backed up, dropping position update");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
