use anyhow::{Context, Result};
use event_log::{EventLog, RedisEventLog};
use ingestion_service::{Config, Producer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use redis_utils::RedisPool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ingestion_service=debug".into());

    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting ingestion-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        stream = %config.stream_name,
        events_per_second = config.rate.events_per_second,
        burst_multiplier = config.rate.burst_multiplier,
        burst_interval_secs = config.rate.burst_interval.as_secs_f64(),
        burst_duration_secs = config.rate.burst_duration.as_secs_f64(),
        "Configuration loaded"
    );

    let redis = RedisPool::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let log: Arc<dyn EventLog> = Arc::new(RedisEventLog::new(&redis));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let producer = Producer::new(
        log,
        config.stream_name.clone(),
        config.rate.clone(),
        config.progress_log_interval,
        StdRng::from_entropy(),
    );
    let stats = producer.run(shutdown_rx).await;

    info!(
        total_events = stats.total_events,
        errors = stats.errors,
        "ingestion-service stopped"
    );
    Ok(())
}
