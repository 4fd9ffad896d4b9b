use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo, RedisError};
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::info;

const DEFAULT_REDIS_COMMAND_TIMEOUT_MS: u64 = 3_000;
const MIN_REDIS_COMMAND_TIMEOUT_MS: u64 = 500;

/// Redis connection handle backed by a reconnecting [`ConnectionManager`].
///
/// The manager multiplexes commands over one connection, so clones are cheap and
/// share the same socket.
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let info = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;

        let client = Client::open(info).context("failed to construct Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        let pool = Self {
            manager,
            command_timeout: redis_command_timeout()?,
        };
        pool.ping().await.context("Redis did not answer PING")?;

        info!(timeout_ms = pool.command_timeout.as_millis() as u64, "Connected to Redis");
        Ok(pool)
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub async fn ping(&self) -> Result<(), RedisError> {
        let mut conn = self.manager.clone();
        run_with_timeout(
            self.command_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await
        .map(|_| ())
    }
}

/// Per-command timeout from `REDIS_COMMAND_TIMEOUT_MS`, read once per process.
///
/// Unset or empty means the default; a value that does not parse is an error.
pub fn redis_command_timeout() -> Result<Duration> {
    static TIMEOUT: OnceCell<Duration> = OnceCell::new();
    TIMEOUT.get_or_try_init(command_timeout_from_env).copied()
}

fn command_timeout_from_env() -> Result<Duration> {
    let ms = match std::env::var("REDIS_COMMAND_TIMEOUT_MS") {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("REDIS_COMMAND_TIMEOUT_MS={raw:?} is not a valid value"))?,
        _ => DEFAULT_REDIS_COMMAND_TIMEOUT_MS,
    };
    Ok(Duration::from_millis(ms.max(MIN_REDIS_COMMAND_TIMEOUT_MS)))
}

/// Bound a Redis future by `limit`. An elapsed timer surfaces as an I/O error so
/// callers treat it like a dropped connection.
pub async fn run_with_timeout<F, T>(limit: Duration, future: F) -> Result<T, RedisError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match timeout(limit, future).await {
        Ok(res) => res,
        Err(_) => Err(RedisError::from((
            redis::ErrorKind::IoError,
            "redis command timed out",
        ))),
    }
}
