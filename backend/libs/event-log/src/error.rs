use thiserror::Error;

pub type LogResult<T> = Result<T, LogError>;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Consumer group {group} does not exist on stream {stream}")]
    GroupMissing { stream: String, group: String },

    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    #[error("Event log connection closed")]
    Closed,
}

impl LogError {
    /// Whether retrying the same operation later can succeed
    pub fn is_transient(&self) -> bool {
        match self {
            LogError::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.kind() == redis::ErrorKind::TryAgain
                    || e.kind() == redis::ErrorKind::BusyLoadingError
            }
            LogError::Unavailable(_) => true,
            LogError::GroupMissing { .. } | LogError::InvalidEntryId(_) | LogError::Closed => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_transient() {
        let err = LogError::from(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "redis command timed out",
        )));
        assert!(err.is_transient());
    }

    #[test]
    fn test_server_rejections_are_not_transient() {
        let err = LogError::from(redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "WRONGTYPE",
        )));
        assert!(!err.is_transient());
        assert!(!LogError::Closed.is_transient());
        assert!(LogError::Unavailable("down".into()).is_transient());
    }
}
