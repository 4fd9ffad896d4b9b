use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, RedisError, Value};
use redis_utils::{run_with_timeout, RedisPool};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    EntryId, EventLog, GroupStatus, LogError, LogResult, PendingEntry, RawEntry, StreamGroup,
};

/// [`EventLog`] on Redis Streams
pub struct RedisEventLog {
    conn: RwLock<Option<ConnectionManager>>,
    command_timeout: Duration,
}

impl RedisEventLog {
    pub fn new(pool: &RedisPool) -> Self {
        Self {
            conn: RwLock::new(Some(pool.manager())),
            command_timeout: pool.command_timeout(),
        }
    }

    async fn conn(&self) -> LogResult<ConnectionManager> {
        self.conn.read().await.clone().ok_or(LogError::Closed)
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn append(&self, stream: &str, fields: &[(&str, &[u8])]) -> LogResult<EntryId> {
        let mut conn = self.conn().await?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (name, value) in fields {
            cmd.arg(*name).arg(*value);
        }

        let id: String =
            run_with_timeout(self.command_timeout, cmd.query_async(&mut conn)).await?;
        Ok(EntryId::new(id))
    }

    async fn ensure_group(&self, group: &StreamGroup) -> LogResult<GroupStatus> {
        let mut conn = self.conn().await?;

        let created = run_with_timeout(
            self.command_timeout,
            conn.xgroup_create_mkstream::<_, _, _, ()>(&group.stream, &group.group, "0"),
        )
        .await;

        match created {
            Ok(()) => {
                info!(stream = %group.stream, group = %group.group, "Created consumer group");
                Ok(GroupStatus::Created)
            }
            Err(e) if is_busy_group(&e) => {
                debug!(stream = %group.stream, group = %group.group, "Consumer group already exists");
                Ok(GroupStatus::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(
        &self,
        group: &StreamGroup,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> LogResult<Vec<RawEntry>> {
        let mut conn = self.conn().await?;

        let mut opts = StreamReadOptions::default()
            .group(&group.group, consumer)
            .count(count);
        if !block.is_zero() {
            opts = opts.block(block.as_millis() as usize);
        }

        // the server holds the reply for up to `block`
        let limit = self.command_timeout + block;
        let reply: Option<StreamReadReply> = run_with_timeout(
            limit,
            conn.xread_options(&[group.stream.as_str()], &[">"], &opts),
        )
        .await
        .map_err(|e| group_error(e, group))?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect::<Vec<_>>())
            .unwrap_or_default();

        entries.into_iter().map(raw_entry).collect()
    }

    async fn ack(&self, group: &StreamGroup, ids: &[EntryId]) -> LogResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let ids: Vec<&str> = ids.iter().map(EntryId::as_str).collect();

        let acked: u64 = run_with_timeout(
            self.command_timeout,
            conn.xack(&group.stream, &group.group, &ids),
        )
        .await?;
        Ok(acked)
    }

    async fn stream_len(&self, stream: &str) -> LogResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = run_with_timeout(self.command_timeout, conn.xlen(stream)).await?;
        Ok(len)
    }

    async fn group_lag(&self, group: &StreamGroup) -> LogResult<Option<u64>> {
        let mut conn = self.conn().await?;

        let groups: Vec<HashMap<String, Value>> = run_with_timeout(
            self.command_timeout,
            redis::cmd("XINFO")
                .arg("GROUPS")
                .arg(&group.stream)
                .query_async(&mut conn),
        )
        .await?;

        for info in &groups {
            let name = match info.get("name") {
                Some(v) => redis::from_redis_value::<String>(v)?,
                None => continue,
            };
            if name != group.group {
                continue;
            }
            // `lag` is absent before Redis 7 and nil when the server cannot compute it
            return match info.get("lag") {
                Some(v) => Ok(redis::from_redis_value::<Option<u64>>(v)?),
                None => Ok(None),
            };
        }

        Ok(None)
    }

    async fn pending(&self, group: &StreamGroup, count: usize) -> LogResult<Vec<PendingEntry>> {
        let mut conn = self.conn().await?;

        let reply: StreamPendingCountReply = run_with_timeout(
            self.command_timeout,
            conn.xpending_count(&group.stream, &group.group, "-", "+", count),
        )
        .await
        .map_err(|e| group_error(e, group))?;

        Ok(reply
            .ids
            .into_iter()
            .map(|p| PendingEntry {
                id: EntryId::new(p.id),
                consumer: p.consumer,
                idle: Duration::from_millis(p.last_delivered_ms as u64),
                deliveries: p.times_delivered as u64,
            })
            .collect())
    }

    async fn claim(
        &self,
        group: &StreamGroup,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> LogResult<Vec<RawEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let ids: Vec<&str> = ids.iter().map(EntryId::as_str).collect();

        let reply: StreamClaimReply = run_with_timeout(
            self.command_timeout,
            conn.xclaim(
                &group.stream,
                &group.group,
                consumer,
                min_idle.as_millis() as u64,
                &ids,
            ),
        )
        .await
        .map_err(|e| group_error(e, group))?;

        reply.ids.into_iter().map(raw_entry).collect()
    }

    async fn close(&self) -> LogResult<()> {
        if self.conn.write().await.take().is_some() {
            info!("Redis event log connection released");
        }
        Ok(())
    }
}

fn raw_entry(entry: StreamId) -> LogResult<RawEntry> {
    let mut fields = entry
        .map
        .iter()
        .map(|(name, value)| Ok((name.clone(), redis::from_redis_value::<Vec<u8>>(value)?)))
        .collect::<Result<Vec<_>, RedisError>>()?;
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(RawEntry {
        id: EntryId::new(entry.id),
        fields,
    })
}

fn is_busy_group(err: &RedisError) -> bool {
    err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP")
}

fn group_error(err: RedisError, group: &StreamGroup) -> LogError {
    if err.code() == Some("NOGROUP") || err.to_string().contains("NOGROUP") {
        LogError::GroupMissing {
            stream: group.stream.clone(),
            group: group.group.clone(),
        }
    } else {
        LogError::Redis(err)
    }
}
