//! Configuration for the ingestion service
//!
//! Loads configuration from environment variables.
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestionError, Result};

pub const DEFAULT_STREAM_NAME: &str = "analytics_events";

#[derive(Debug, Clone)]
pub struct Config {
    /// Redis URL of the durable log
    pub redis_url: String,
    /// Stream events are appended to
    pub stream_name: String,
    pub rate: RateConfig,
    /// Emit a progress snapshot every this many appended events
    pub progress_log_interval: u64,
}

/// Event rate and burst schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RateConfig {
    /// Baseline target rate
    pub events_per_second: u32,
    /// Rate factor applied while a burst is active
    pub burst_multiplier: u32,
    /// Time between burst starts, measured from producer start
    pub burst_interval: Duration,
    /// How long each burst lasts
    pub burst_duration: Duration,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            events_per_second: 10,
            burst_multiplier: 10,
            burst_interval: Duration::from_millis(300_000),
            burst_duration: Duration::from_millis(30_000),
        }
    }
}

impl RateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.events_per_second == 0 {
            return Err(IngestionError::Config(
                "EVENTS_PER_SECOND must be greater than 0".to_string(),
            ));
        }
        if self.burst_multiplier == 0 {
            return Err(IngestionError::Config(
                "BURST_MULTIPLIER must be at least 1".to_string(),
            ));
        }
        if self.burst_interval.is_zero() || self.burst_duration.is_zero() {
            return Err(IngestionError::Config(
                "BURST_INTERVAL_MS and BURST_DURATION_MS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let redis_url = std::env::var("REDIS_URL").map_err(|_| {
            IngestionError::Config("REDIS_URL environment variable not set".to_string())
        })?;

        let defaults = RateConfig::default();
        let rate = RateConfig {
            events_per_second: env_or("EVENTS_PER_SECOND", defaults.events_per_second)?,
            burst_multiplier: env_or("BURST_MULTIPLIER", defaults.burst_multiplier)?,
            burst_interval: Duration::from_millis(env_or(
                "BURST_INTERVAL_MS",
                defaults.burst_interval.as_millis() as u64,
            )?),
            burst_duration: Duration::from_millis(env_or(
                "BURST_DURATION_MS",
                defaults.burst_duration.as_millis() as u64,
            )?),
        };
        rate.validate()?;

        let progress_log_interval = env_or("PROGRESS_LOG_INTERVAL", 100u64)?;
        if progress_log_interval == 0 {
            return Err(IngestionError::Config(
                "PROGRESS_LOG_INTERVAL must be greater than 0".to_string(),
            ));
        }

        Ok(Config {
            redis_url,
            stream_name: env_or("STREAM_NAME", DEFAULT_STREAM_NAME.to_string())?,
            rate,
            progress_log_interval,
        })
    }
}

/// Unset or blank means default; set but unparseable is a configuration error.
///
/// Same rules as `db_pool::env_utils::parse_env_or`, without pulling the database
/// stack into the producer.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            IngestionError::Config(format!("{key}={raw:?} is not a valid value"))
        }),
        _ => Ok(default),
    }
}
