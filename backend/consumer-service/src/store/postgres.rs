use async_trait::async_trait;
use db_pool::acquire_with_metrics;
use event_schema::EventRow;
use sqlx::migrate::Migrator;
use sqlx::{Connection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info};

use super::EventStore;
use crate::config::SERVICE_NAME;
use crate::error::Result;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// [`EventStore`] backed by the `events` table
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert_batch(&self, rows: &[EventRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = acquire_with_metrics(&self.pool, SERVICE_NAME).await?;
        let mut tx = conn.begin().await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO events (time, event_id, event_type, user_id, properties) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.time)
                .push_bind(row.event_id)
                .push_bind(row.event_type.as_str())
                .push_bind(row.user_id.clone())
                .push_bind(row.properties.clone());
        });
        builder.push(" ON CONFLICT (event_id, time) DO NOTHING");

        let inserted = match builder.build().execute(&mut *tx).await {
            Ok(result) => result.rows_affected(),
            Err(e) => {
                error!(error = %e, batch_size = rows.len(), "Batch insert failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                return Err(e.into());
            }
        };

        tx.commit().await?;
        debug!(batch_size = rows.len(), inserted, "Batch committed");
        Ok(inserted)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
