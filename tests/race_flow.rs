//! Two clients racing through the in-process relay hub

use std::sync::Arc;

use tokio::sync::mpsc;
use truck_race::client::{Effects, GridSlot, RaceClient, RaceEvent};
use truck_race::config::RaceConfig;
use truck_race::game::{ControlInput, FinishReason, SessionPhase};
use truck_race::relay::RelayHub;
use truck_race::ws::protocol::RelayMsg;
use uuid::Uuid;

const DT: f32 = 1.0 / 60.0;
const TICK_MS: u64 = 16;

struct Racer {
    id: Uuid,
    client: RaceClient,
    rx: mpsc::Receiver<RelayMsg>,
    events: Vec<RaceEvent>,
}

struct Race {
    hub: Arc<RelayHub>,
    game_id: Uuid,
    host: Racer,
    guest: Racer,
    now: u64,
}

impl Race {
    async fn new() -> Self {
        let config = RaceConfig::default();
        let hub = Arc::new(RelayHub::new(config.total_laps, 1_000));
        let created = hub.create_game();
        let joined = hub.join_game(created.game_id).unwrap();

        let host_rx = hub.connect(created.game_id, created.player_id).await.unwrap();
        let guest_rx = hub.connect(created.game_id, joined.player_id).await.unwrap();

        let host = RaceClient::new(
            created.game_id,
            created.player_id,
            GridSlot::Host,
            created.tracks,
            config.clone(),
        )
        .unwrap();
        let guest = RaceClient::new(
            joined.game_id,
            joined.player_id,
            GridSlot::Guest,
            joined.tracks,
            config,
        )
        .unwrap();

        Self {
            hub,
            game_id: created.game_id,
            host: Racer {
                id: created.player_id,
                client: host,
                rx: host_rx,
                events: Vec::new(),
            },
            guest: Racer {
                id: joined.player_id,
                client: guest,
                rx: guest_rx,
                events: Vec::new(),
            },
            now: 1_700_000_000_000,
        }
    }

    async fn send(&self, from: Uuid, effects: Effects) {
        for msg in effects.outbound {
            self.hub.handle(self.game_id, from, msg).await.unwrap();
        }
    }

    /// Apply everything the relay queued for both players
    fn deliver(&mut self) {
        for racer in [&mut self.host, &mut self.guest] {
            while let Ok(msg) = racer.rx.try_recv() {
                let effects = racer.client.handle_relay_msg(msg, self.now);
                assert!(effects.outbound.is_empty());
                racer.events.extend(effects.events);
            }
        }
    }

    async fn start(&mut self) {
        self.deliver();

        let effects = self.host.client.mark_ready();
        self.send(self.host.id, effects).await;
        self.deliver();
        assert_eq!(self.host.client.phase(), SessionPhase::ReadyWait);
        assert_eq!(self.guest.client.phase(), SessionPhase::ReadyWait);

        let effects = self.guest.client.mark_ready();
        self.send(self.guest.id, effects).await;
        self.deliver();
    }

    /// Tick the host only; the guest just listens
    async fn tick_host(&mut self, input: ControlInput) {
        self.now += TICK_MS;
        let output = self.host.client.tick(input, DT, self.now);
        self.host.events.extend(output.effects.events.clone());
        self.send(self.host.id, output.effects).await;
        self.guest.client.tick(ControlInput::IDLE, DT, self.now);
        self.deliver();
    }
}

#[tokio::test]
async fn both_ready_then_game_start_starts_both_clocks() {
    let mut race = Race::new().await;
    race.start().await;

    for racer in [&race.host, &race.guest] {
        assert_eq!(racer.client.phase(), SessionPhase::Racing);
        assert!(racer.events.contains(&RaceEvent::RaceStarted));
    }

    race.tick_host(ControlInput::accelerate()).await;
    assert_eq!(race.host.client.frame(race.now).total_elapsed_ms, TICK_MS);
    assert!(race.host.client.vehicle().speed > 0.0);
}

#[tokio::test]
async fn host_finishing_ten_laps_first_wins_on_both_sides() {
    let mut race = Race::new().await;
    race.start().await;

    let mut ticks = 0;
    while race.host.client.phase() == SessionPhase::Racing {
        race.tick_host(ControlInput::accelerate()).await;
        ticks += 1;
        assert!(ticks < 80_000, "host never finished");
    }

    let host_laps: Vec<u32> = race
        .host
        .events
        .iter()
        .filter_map(|e| match e {
            RaceEvent::LapCompleted { player_id, lap, .. } if *player_id == race.host.id => Some(*lap),
            _ => None,
        })
        .collect();
    assert_eq!(host_laps, (1..=10).collect::<Vec<_>>());

    let outcome = race.host.client.outcome().unwrap();
    assert_eq!(outcome.winner, Some(race.host.id));
    assert_eq!(outcome.reason, FinishReason::LapsCompleted);

    // the guest learns of the win through the relayed lap
    assert_eq!(race.guest.client.phase(), SessionPhase::Finished);
    assert_eq!(race.guest.client.outcome().unwrap().winner, Some(race.host.id));
    assert_eq!(race.guest.client.session().opponent().unwrap().current_lap, 10);

    // every lap at top speed takes well over a minute
    for event in &race.host.events {
        if let RaceEvent::LapCompleted { lap_time, .. } = event {
            assert!(*lap_time >= 80, "lap took {lap_time}s");
        }
    }
}

#[tokio::test]
async fn guest_disconnect_awards_host() {
    let mut race = Race::new().await;
    race.start().await;
    race.tick_host(ControlInput::accelerate()).await;

    race.hub.disconnect(race.game_id, race.guest.id).await;
    race.deliver();

    let outcome = race.host.client.outcome().unwrap();
    assert_eq!(outcome.winner, Some(race.host.id));
    assert_eq!(outcome.reason, FinishReason::OpponentLeft);

    // duplicate notice changes nothing
    let effects = race.host.client.handle_relay_msg(
        RelayMsg::PlayerDisconnected {
            player_id: race.guest.id,
            winner_id: Some(race.host.id),
        },
        race.now,
    );
    assert!(effects.events.is_empty());
}

#[tokio::test]
async fn lobby_disconnect_does_not_decide_anything() {
    let mut race = Race::new().await;
    race.deliver();

    race.hub.disconnect(race.game_id, race.guest.id).await;
    race.deliver();

    assert_eq!(race.host.client.phase(), SessionPhase::Lobby);
    assert!(race.host.client.outcome().is_none());
}
