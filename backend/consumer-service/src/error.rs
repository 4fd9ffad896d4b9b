use event_log::LogError;
use event_schema::SchemaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsumerError>;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Event log error: {0}")]
    Log(#[from] LogError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The store refused to commit a batch transaction.
    #[error("Commit failed: {0}")]
    CommitFailed(String),
}

impl ConsumerError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ConsumerError::Log(e) => e.is_transient(),
            ConsumerError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
            ),
            ConsumerError::Io(_) | ConsumerError::CommitFailed(_) => true,
            _ => false,
        }
    }
}
