//! Ingestion service: synthetic analytics traffic with periodic bursts, appended
//! to the durable event log.

pub mod config;
pub mod error;
pub mod generator;
pub mod producer;
pub mod rate;

pub use config::{Config, RateConfig};
pub use error::{IngestionError, Result};
pub use producer::{ProducerStats, ProgressSnapshot, Producer};
pub use rate::{RateController, RateTransition};
