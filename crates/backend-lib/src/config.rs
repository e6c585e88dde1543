// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Path to the newline-delimited word list
    pub word_list: Option<PathBuf>,
    /// Room document TTL in the shared store, seconds
    pub room_ttl_secs: u64,
    /// Default max concurrent player connections per room
    pub default_capacity: u32,
    /// Consonants drawn per round
    pub consonants_per_round: usize,
    /// Rounds before a game completes
    pub rounds_per_game: u32,
    /// Grace period before an empty, closed room is evicted from the
    /// local cache, seconds
    pub failover_grace_secs: u64,
    /// Pause after game-state persists before dependent re-reads,
    /// milliseconds. A convergence wait, not a guarantee; 0 in tests.
    pub propagation_delay_ms: u64,
    /// Interval of the cache sweep task, seconds
    pub sweep_interval_secs: u64,
    /// Rate limit settings
    pub rate_limit: RateLimitSettings,
}

/// Sliding-window rate limit knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Calls allowed per window
    pub max_calls: usize,
    /// Window width in milliseconds
    pub window_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            word_list: None,
            room_ttl_secs: 60 * 60 * 4,
            default_capacity: 8,
            consonants_per_round: 5,
            rounds_per_game: 10,
            failover_grace_secs: 5,
            propagation_delay_ms: 25,
            sweep_interval_secs: 60,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_calls: 3,
            window_ms: 1_000,
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` (if present) overlaid with
    /// `WORDRUSH_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load settings from an explicit file path plus environment.
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("WORDRUSH").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Settings tuned for tests: no propagation waits, short grace.
    pub fn for_tests() -> Self {
        Self {
            propagation_delay_ms: 0,
            failover_grace_secs: 0,
            ..Self::default()
        }
    }
}
