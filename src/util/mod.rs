//! Shared helpers: wall-clock time and rate limiting

pub mod rate_limit;
pub mod time;
