//! Configuration for the consumer service
//!
//! Loads configuration from environment variables.
use db_pool::env_utils::{parse_env_or, parse_env_required};
use db_pool::DbConfig;
use event_log::StreamGroup;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConsumerError, Result};

pub const SERVICE_NAME: &str = "consumer-service";
pub const DEFAULT_STREAM_NAME: &str = "analytics_events";
pub const DEFAULT_GROUP_NAME: &str = "analytics_consumers";
pub const DEFAULT_CONSUMER_NAME: &str = "consumer-1";

/// Upper bound on `BATCH_SIZE`; keeps one multi-row insert under the PostgreSQL
/// bind parameter limit.
pub const MAX_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub database: DbConfig,
    pub consumer: ConsumerConfig,
    pub monitor: MonitorConfig,
    pub reclaim: ReclaimConfig,
    /// Port of the health/metrics endpoint
    pub http_port: u16,
    pub run_migrations: bool,
}

/// Consumer group membership and batch pacing
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    pub stream_name: String,
    pub group_name: String,
    pub consumer_name: String,
    pub batch_size: usize,
    /// Longest wait for new entries in one pull
    pub block: Duration,
    /// Pause after a short batch so the next pull can fill up
    pub min_batch_delay: Duration,
    /// Pause after a failed iteration
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            group_name: DEFAULT_GROUP_NAME.to_string(),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            batch_size: 100,
            block: Duration::from_millis(1000),
            min_batch_delay: Duration::from_millis(100),
            error_backoff: Duration::from_millis(1000),
        }
    }
}

impl ConsumerConfig {
    pub fn stream_group(&self) -> StreamGroup {
        StreamGroup::new(&self.stream_name, &self.group_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// CSV file receiving one row per sample
    pub metrics_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10_000),
            metrics_file: PathBuf::from("metrics.csv"),
        }
    }
}

/// Recovery of entries stuck in the group's pending set
#[derive(Debug, Clone, PartialEq)]
pub struct ReclaimConfig {
    pub interval: Duration,
    /// Entries idle for less than this are left with their current owner
    pub min_idle: Duration,
    pub batch_size: usize,
    /// Deliveries after which an entry goes to the dead-letter stream
    pub max_deliveries: u64,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            min_idle: Duration::from_millis(60_000),
            batch_size: 100,
            max_deliveries: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let redis_url: String = parse_env_required("REDIS_URL").map_err(ConsumerError::Config)?;
        let database = DbConfig::from_env(SERVICE_NAME).map_err(ConsumerError::Config)?;

        let defaults = ConsumerConfig::default();
        let consumer = ConsumerConfig {
            stream_name: env_or("STREAM_NAME", defaults.stream_name)?,
            group_name: env_or("CONSUMER_GROUP", defaults.group_name)?,
            consumer_name: env_or("CONSUMER_NAME", defaults.consumer_name)?,
            batch_size: env_or("BATCH_SIZE", defaults.batch_size)?,
            block: env_millis("BLOCK_MS", defaults.block)?,
            min_batch_delay: env_millis("MIN_BATCH_DELAY_MS", defaults.min_batch_delay)?,
            error_backoff: env_millis("ERROR_BACKOFF_MS", defaults.error_backoff)?,
        };
        if !(1..=MAX_BATCH_SIZE).contains(&consumer.batch_size) {
            return Err(ConsumerError::Config(format!(
                "BATCH_SIZE must be between 1 and {MAX_BATCH_SIZE}, got {}",
                consumer.batch_size
            )));
        }

        let defaults = MonitorConfig::default();
        let monitor = MonitorConfig {
            interval: env_millis("MONITORING_INTERVAL_MS", defaults.interval)?,
            metrics_file: env_or("METRICS_FILE", defaults.metrics_file)?,
        };

        let defaults = ReclaimConfig::default();
        let reclaim = ReclaimConfig {
            interval: env_millis("RECLAIM_INTERVAL_MS", defaults.interval)?,
            min_idle: env_millis("RECLAIM_MIN_IDLE_MS", defaults.min_idle)?,
            batch_size: env_or("RECLAIM_BATCH_SIZE", defaults.batch_size)?,
            max_deliveries: env_or("MAX_DELIVERIES", defaults.max_deliveries)?,
        };
        if reclaim.max_deliveries == 0 || reclaim.batch_size == 0 {
            return Err(ConsumerError::Config(
                "MAX_DELIVERIES and RECLAIM_BATCH_SIZE must be greater than 0".to_string(),
            ));
        }

        if monitor.interval.is_zero() || reclaim.interval.is_zero() {
            return Err(ConsumerError::Config(
                "MONITORING_INTERVAL_MS and RECLAIM_INTERVAL_MS must be greater than 0"
                    .to_string(),
            ));
        }

        Ok(Config {
            redis_url,
            database,
            consumer,
            monitor,
            reclaim,
            http_port: env_or("PORT", 8080u16)?,
            run_migrations: env_or("RUN_MIGRATIONS", true)?,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    parse_env_or(key, default).map_err(ConsumerError::Config)
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_millis(env_or(key, default.as_millis() as u64)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 17] = [
        "REDIS_URL",
        "DATABASE_URL",
        "STREAM_NAME",
        "CONSUMER_GROUP",
        "CONSUMER_NAME",
        "BATCH_SIZE",
        "BLOCK_MS",
        "MIN_BATCH_DELAY_MS",
        "ERROR_BACKOFF_MS",
        "MONITORING_INTERVAL_MS",
        "METRICS_FILE",
        "RECLAIM_INTERVAL_MS",
        "RECLAIM_MIN_IDLE_MS",
        "RECLAIM_BATCH_SIZE",
        "MAX_DELIVERIES",
        "PORT",
        "RUN_MIGRATIONS",
    ];

    fn reset_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
        std::env::set_var("REDIS_URL", "redis://localhost:6379");
        std::env::set_var("DATABASE_URL", "postgres://localhost/analytics");
    }

    #[test]
    #[serial]
    fn test_default_values() {
        reset_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.consumer, ConsumerConfig::default());
        assert_eq!(config.consumer.batch_size, 100);
        assert_eq!(config.consumer.block, Duration::from_secs(1));
        assert_eq!(config.consumer.min_batch_delay, Duration::from_millis(100));
        assert_eq!(config.monitor.metrics_file, PathBuf::from("metrics.csv"));
        assert_eq!(config.reclaim.max_deliveries, 5);
        assert_eq!(config.http_port, 8080);
        assert!(config.run_migrations);
        assert_eq!(config.database.service_name, SERVICE_NAME);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        reset_env();
        std::env::set_var("CONSUMER_NAME", "consumer-7");
        std::env::set_var("BATCH_SIZE", "250");
        std::env::set_var("MIN_BATCH_DELAY_MS", "0");
        std::env::set_var("METRICS_FILE", "/tmp/pipeline.csv");
        std::env::set_var("RUN_MIGRATIONS", "false");

        let config = Config::from_env().unwrap();

        assert_eq!(config.consumer.consumer_name, "consumer-7");
        assert_eq!(config.consumer.batch_size, 250);
        assert!(config.consumer.min_batch_delay.is_zero());
        assert_eq!(config.monitor.metrics_file, PathBuf::from("/tmp/pipeline.csv"));
        assert!(!config.run_migrations);
        assert_eq!(
            config.consumer.stream_group(),
            StreamGroup::new("analytics_events", "analytics_consumers")
        );

        reset_env();
    }

    #[test]
    #[serial]
    fn test_batch_size_bounds() {
        reset_env();

        std::env::set_var("BATCH_SIZE", "0");
        assert!(matches!(Config::from_env(), Err(ConsumerError::Config(_))));

        std::env::set_var("BATCH_SIZE", "5001");
        assert!(matches!(Config::from_env(), Err(ConsumerError::Config(_))));

        std::env::set_var("BATCH_SIZE", "5000");
        assert_eq!(Config::from_env().unwrap().consumer.batch_size, 5000);

        reset_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_fatal() {
        reset_env();
        std::env::set_var("BLOCK_MS", "soon");
        assert!(Config::from_env().is_err());

        reset_env();
        std::env::set_var("MAX_DELIVERIES", "0");
        assert!(Config::from_env().is_err());

        reset_env();
        std::env::remove_var("DATABASE_URL");
        assert!(Config::from_env().is_err());

        reset_env();
    }
}
