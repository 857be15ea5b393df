//! Race and lap timing
//!
//! Only the two start timestamps are stored; elapsed values are always
//! derived from "now" so they cannot drift.

/// Wall-clock race timer, in Unix milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaceClock {
    race_start_ms: Option<u64>,
    lap_start_ms: Option<u64>,
}

impl RaceClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the race; a second call is ignored
    pub fn start(&mut self, now_ms: u64) {
        if self.race_start_ms.is_none() {
            self.race_start_ms = Some(now_ms);
            self.lap_start_ms = Some(now_ms);
        }
    }

    pub fn is_running(&self) -> bool {
        self.race_start_ms.is_some()
    }

    pub fn race_start_ms(&self) -> Option<u64> {
        self.race_start_ms
    }

    /// Milliseconds since the race started (0 before the start)
    pub fn total_elapsed_ms(&self, now_ms: u64) -> u64 {
        self.race_start_ms
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0)
    }

    /// Milliseconds since the current lap started (0 before the start)
    pub fn lap_elapsed_ms(&self, now_ms: u64) -> u64 {
        self.lap_start_ms
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0)
    }

    /// Close the current lap at `now_ms`, returning its duration
    pub fn complete_lap(&mut self, now_ms: u64) -> u64 {
        let duration = self.lap_elapsed_ms(now_ms);
        if self.lap_start_ms.is_some() {
            self.lap_start_ms = Some(now_ms);
        }
        duration
    }
}
