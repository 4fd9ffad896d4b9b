//! Consumer service: drains the analytics stream through a consumer group into
//! PostgreSQL, acknowledging exactly the entries whose batch committed.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod monitor;
pub mod persister;
pub mod processor;
pub mod reader;
pub mod reclaim;
pub mod stats;
pub mod store;
pub mod validator;

pub use config::{Config, ConsumerConfig, MonitorConfig, ReclaimConfig};
pub use error::{ConsumerError, Result};
pub use monitor::{LagMonitor, MetricsSample};
pub use persister::{BatchOutcome, Persister};
pub use processor::Processor;
pub use reader::BatchReader;
pub use reclaim::PendingReclaimer;
pub use stats::ConsumerStats;
pub use store::{EventStore, MemoryEventStore, PgEventStore};
pub use validator::{validate_batch, ValidatedBatch};
