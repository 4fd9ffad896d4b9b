use anyhow::{Context, Result};
use consumer_service::{http, Config, PgEventStore, Processor};
use event_log::{EventLog, RedisEventLog};
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
        .unwrap_or_else(|_| "info,consumer_service=debug".into());

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

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting consumer-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        stream = %config.consumer.stream_name,
        group = %config.consumer.group_name,
        consumer = %config.consumer.consumer_name,
        batch_size = config.consumer.batch_size,
        block_ms = config.consumer.block.as_millis() as u64,
        min_batch_delay_ms = config.consumer.min_batch_delay.as_millis() as u64,
        "Configuration loaded"
    );

    config.database.log_config();
    let pool = db_pool::create_pool(config.database.clone())
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store = PgEventStore::new(pool);
    if config.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let redis = RedisPool::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let log: Arc<dyn EventLog> = Arc::new(RedisEventLog::new(&redis));

    let processor = Processor::new(
        log,
        Arc::new(store),
        &config.consumer,
        &config.monitor,
        &config.reclaim,
    );
    processor
        .start()
        .await
        .context("Failed to create consumer group")?;

    let server = http::bind(config.http_port).context("Failed to bind HTTP server")?;
    let server_handle = server.handle();
    info!(port = config.http_port, "Health and metrics endpoint listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let consumer_task = tokio::spawn(async move {
        let stats = processor.run(shutdown_rx).await;
        server_handle.stop(true).await;
        stats
    });

    server.await.context("HTTP server failed")?;
    let stats = consumer_task.await.context("Consumer task panicked")?;

    info!(
        total_processed = stats.total_processed,
        total_errors = stats.total_errors,
        "consumer-service stopped"
    );
    Ok(())
}
