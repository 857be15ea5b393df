//! Two-player truck racing core
//!
//! - `game`: vehicle dynamics, tracks, lap validation, timing, opponent
//!   smoothing and the session state machine
//! - `client`: per-player orchestration and its async runner
//! - `relay`, `ws`, `http`: the message relay and its network surface

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod relay;
pub mod util;
pub mod ws;
