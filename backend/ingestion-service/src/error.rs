use event_log::LogError;
use event_schema::SchemaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestionError>;

#[derive(Error, Debug)]
pub enum IngestionError {
    /// Generated event failed its own schema. Indicates a generator bug.
    #[error("Generated event rejected: {0}")]
    Schema(#[from] SchemaError),

    #[error("Event log error: {0}")]
    Log(#[from] LogError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
