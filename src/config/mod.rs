//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::util::rate_limit::POSITION_RATE_LIMIT;
use crate::util::time::POSITION_UPDATE_INTERVAL_MICROS;

/// Laps per race
pub const DEFAULT_TOTAL_LAPS: u32 = 10;

/// Waiting games nobody connects to are dropped after this long
pub const DEFAULT_IDLE_GAME_TIMEOUT: Duration = Duration::from_secs(600);

/// Relay configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS (`*` or comma-separated list)
    pub client_origin: String,
    /// Laps a player must complete to finish
    pub total_laps: u32,
    /// Inbound position messages accepted per player per second
    pub position_rate_limit: u32,
    /// How long a waiting game may go without any connection before it is dropped
    pub idle_game_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR so hosted platforms can inject it
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8001".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            total_laps: parse_var("TOTAL_LAPS")?.unwrap_or(DEFAULT_TOTAL_LAPS),
            position_rate_limit: parse_var("POSITION_RATE_LIMIT")?.unwrap_or(POSITION_RATE_LIMIT),
            idle_game_timeout: parse_var("IDLE_GAME_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_IDLE_GAME_TIMEOUT),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            total_laps: DEFAULT_TOTAL_LAPS,
            position_rate_limit: POSITION_RATE_LIMIT,
            idle_game_timeout: DEFAULT_IDLE_GAME_TIMEOUT,
        }
    }
}

/// Tunables for one racing client.
///
/// Every value here is read by the simulation at runtime; none of them are
/// baked into the components.
#[derive(Clone, Debug)]
pub struct RaceConfig {
    /// Laps needed to win
    pub total_laps: u32,
    /// Seconds a vehicle may stay off track before it is stopped and relocated
    pub off_track_penalty_secs: f32,
    /// Maximum lateral distance from the centerline that still counts as on track
    pub track_half_width: f32,
    /// Fraction of the remaining distance the opponent shadow covers per tick
    pub interpolation_blend: f32,
    /// Minimum spacing between outbound position updates
    pub position_update_interval: Duration,
    /// How long a closed relay channel may go without an explicit
    /// disconnect notice before the race is awarded to the local player
    pub disconnect_timeout: Duration,
    /// Upper bound on a single tick delta, in seconds
    pub max_tick_delta: f32,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            total_laps: DEFAULT_TOTAL_LAPS,
            off_track_penalty_secs: 5.0,
            track_half_width: 10.0,
            interpolation_blend: 0.1,
            position_update_interval: Duration::from_micros(POSITION_UPDATE_INTERVAL_MICROS),
            disconnect_timeout: Duration::from_secs(10),
            max_tick_delta: 0.1,
        }
    }
}

impl RaceConfig {
    /// Defaults overridden by any `RACE_*` variables present in the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            total_laps: parse_var("RACE_TOTAL_LAPS")?.unwrap_or(defaults.total_laps),
            off_track_penalty_secs: parse_var("RACE_OFF_TRACK_PENALTY_SECS")?
                .unwrap_or(defaults.off_track_penalty_secs),
            track_half_width: parse_var("RACE_TRACK_HALF_WIDTH")?
                .unwrap_or(defaults.track_half_width),
            interpolation_blend: parse_var("RACE_INTERPOLATION_BLEND")?
                .unwrap_or(defaults.interpolation_blend),
            position_update_interval: parse_var("RACE_POSITION_UPDATE_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.position_update_interval),
            disconnect_timeout: parse_var("RACE_DISCONNECT_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.disconnect_timeout),
            max_tick_delta: parse_var("RACE_MAX_TICK_DELTA")?.unwrap_or(defaults.max_tick_delta),
        })
    }
}

/// Read an optional variable, failing only when it is present but unparseable
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_defaults_match_game_rules() {
        let config = RaceConfig::default();
        assert_eq!(config.total_laps, 10);
        assert_eq!(config.off_track_penalty_secs, 5.0);
        assert_eq!(config.position_update_interval, Duration::from_millis(50));
    }

    #[test]
    fn unparseable_variable_is_reported_by_name() {
        env::set_var("RACE_TEST_ONLY_LAPS", "ten");
        let result: Result<Option<u32>, _> = parse_var("RACE_TEST_ONLY_LAPS");
        assert!(matches!(result, Err(ConfigError::Invalid("RACE_TEST_ONLY_LAPS"))));
        env::remove_var("RACE_TEST_ONLY_LAPS");
    }

    #[test]
    fn race_variables_override_defaults() {
        env::set_var("RACE_OFF_TRACK_PENALTY_SECS", "2.5");
        env::set_var("RACE_DISCONNECT_TIMEOUT_MS", "3000");
        let config = RaceConfig::from_env().unwrap();
        env::remove_var("RACE_OFF_TRACK_PENALTY_SECS");
        env::remove_var("RACE_DISCONNECT_TIMEOUT_MS");

        assert_eq!(config.off_track_penalty_secs, 2.5);
        assert_eq!(config.disconnect_timeout, Duration::from_secs(3));
        assert_eq!(config.total_laps, DEFAULT_TOTAL_LAPS);
    }

    #[test]
    fn missing_variable_falls_back() {
        let result: Option<u32> = parse_var("RACE_TEST_ONLY_MISSING").unwrap();
        assert!(result.is_none());
    }
}
