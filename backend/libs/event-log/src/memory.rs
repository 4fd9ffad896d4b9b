use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::{
    EntryId, EventLog, GroupStatus, LogError, LogResult, PendingEntry, RawEntry, StreamGroup,
};

/// In-process [`EventLog`] with consumer-group semantics.
///
/// Entry ids are `<seq>-0` with `seq` starting at 1 per stream. Time is measured with
/// [`tokio::time::Instant`], so idle times follow a paused test clock.
#[derive(Default)]
pub struct MemoryEventLog {
    state: Mutex<State>,
    appended: Notify,
    unavailable: AtomicBool,
    closed: AtomicBool,
}

#[derive(Default)]
struct State {
    streams: HashMap<String, Stream>,
}

#[derive(Default)]
struct Stream {
    entries: Vec<Vec<(String, Vec<u8>)>>,
    groups: HashMap<String, Group>,
}

#[derive(Default)]
struct Group {
    last_delivered: u64,
    pending: BTreeMap<u64, Delivery>,
}

struct Delivery {
    consumer: String,
    delivered_at: Instant,
    deliveries: u64,
}

impl Stream {
    fn entry(&self, seq: u64) -> Option<RawEntry> {
        let fields = self.entries.get(seq.checked_sub(1)? as usize)?;
        Some(RawEntry {
            id: entry_id(seq),
            fields: fields.clone(),
        })
    }

    fn last_seq(&self) -> u64 {
        self.entries.len() as u64
    }
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`LogError::Unavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every entry of `stream` in append order.
    pub async fn entries(&self, stream: &str) -> Vec<RawEntry> {
        let state = self.state.lock().await;
        state
            .streams
            .get(stream)
            .map(|s| (1..=s.last_seq()).filter_map(|seq| s.entry(seq)).collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> LogResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LogError::Unavailable("memory event log offline".to_string()));
        }
        Ok(())
    }

    /// Hand out undelivered entries, or `None` when there are none yet.
    async fn deliver(
        &self,
        group: &StreamGroup,
        consumer: &str,
        count: usize,
    ) -> LogResult<Option<Vec<RawEntry>>> {
        let mut state = self.state.lock().await;
        let stream = state
            .streams
            .get_mut(&group.stream)
            .ok_or_else(|| missing(group))?;
        let last_seq = stream.last_seq();
        let g = stream.groups.get(&group.group).ok_or_else(|| missing(group))?;

        let first = g.last_delivered + 1;
        if first > last_seq || count == 0 {
            return Ok(None);
        }
        let last = last_seq.min(g.last_delivered + count as u64);

        let entries: Vec<RawEntry> = (first..=last).filter_map(|seq| stream.entry(seq)).collect();

        let now = Instant::now();
        let g = stream
            .groups
            .get_mut(&group.group)
            .ok_or_else(|| missing(group))?;
        g.last_delivered = last;
        for seq in first..=last {
            g.pending.insert(
                seq,
                Delivery {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    deliveries: 1,
                },
            );
        }

        Ok(Some(entries))
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, stream: &str, fields: &[(&str, &[u8])]) -> LogResult<EntryId> {
        self.check_available()?;

        let id = {
            let mut state = self.state.lock().await;
            let s = state.streams.entry(stream.to_string()).or_default();
            s.entries.push(
                fields
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_vec()))
                    .collect(),
            );
            entry_id(s.last_seq())
        };

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn ensure_group(&self, group: &StreamGroup) -> LogResult<GroupStatus> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        let stream = state.streams.entry(group.stream.clone()).or_default();
        if stream.groups.contains_key(&group.group) {
            return Ok(GroupStatus::AlreadyExists);
        }
        stream.groups.insert(group.group.clone(), Group::default());
        Ok(GroupStatus::Created)
    }

    async fn read_group(
        &self,
        group: &StreamGroup,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> LogResult<Vec<RawEntry>> {
        let deadline = Instant::now() + block;

        loop {
            self.check_available()?;

            // register interest before looking, so an append in between is not missed
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(entries) = self.deliver(group, consumer, count).await? {
                return Ok(entries);
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, group: &StreamGroup, ids: &[EntryId]) -> LogResult<u64> {
        self.check_available()?;

        let seqs = ids.iter().map(parse_seq).collect::<LogResult<Vec<_>>>()?;

        let mut state = self.state.lock().await;
        let g = state
            .streams
            .get_mut(&group.stream)
            .and_then(|s| s.groups.get_mut(&group.group))
            .ok_or_else(|| missing(group))?;

        Ok(seqs
            .into_iter()
            .filter(|seq| g.pending.remove(seq).is_some())
            .count() as u64)
    }

    async fn stream_len(&self, stream: &str) -> LogResult<u64> {
        self.check_available()?;

        let state = self.state.lock().await;
        Ok(state.streams.get(stream).map(Stream::last_seq).unwrap_or(0))
    }

    async fn group_lag(&self, group: &StreamGroup) -> LogResult<Option<u64>> {
        self.check_available()?;

        let state = self.state.lock().await;
        Ok(state.streams.get(&group.stream).and_then(|s| {
            s.groups
                .get(&group.group)
                .map(|g| s.last_seq() - g.last_delivered)
        }))
    }

    async fn pending(&self, group: &StreamGroup, count: usize) -> LogResult<Vec<PendingEntry>> {
        self.check_available()?;

        let state = self.state.lock().await;
        let g = state
            .streams
            .get(&group.stream)
            .and_then(|s| s.groups.get(&group.group))
            .ok_or_else(|| missing(group))?;

        let now = Instant::now();
        Ok(g.pending
            .iter()
            .take(count)
            .map(|(seq, d)| PendingEntry {
                id: entry_id(*seq),
                consumer: d.consumer.clone(),
                idle: now.saturating_duration_since(d.delivered_at),
                deliveries: d.deliveries,
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
        self.check_available()?;

        let seqs = ids.iter().map(parse_seq).collect::<LogResult<Vec<_>>>()?;

        let mut state = self.state.lock().await;
        let stream = state
            .streams
            .get_mut(&group.stream)
            .ok_or_else(|| missing(group))?;

        let now = Instant::now();
        let mut claimed_seqs = Vec::new();
        {
            let g = stream
                .groups
                .get_mut(&group.group)
                .ok_or_else(|| missing(group))?;
            for seq in seqs {
                if let Some(d) = g.pending.get_mut(&seq) {
                    if now.saturating_duration_since(d.delivered_at) >= min_idle {
                        d.consumer = consumer.to_string();
                        d.delivered_at = now;
                        d.deliveries += 1;
                        claimed_seqs.push(seq);
                    }
                }
            }
        }

        Ok(claimed_seqs
            .into_iter()
            .filter_map(|seq| stream.entry(seq))
            .collect())
    }

    async fn close(&self) -> LogResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.appended.notify_waiters();
        Ok(())
    }
}

fn entry_id(seq: u64) -> EntryId {
    EntryId::new(format!("{seq}-0"))
}

fn parse_seq(id: &EntryId) -> LogResult<u64> {
    id.as_str()
        .strip_suffix("-0")
        .and_then(|seq| seq.parse().ok())
        .ok_or_else(|| LogError::InvalidEntryId(id.to_string()))
}

fn missing(group: &StreamGroup) -> LogError {
    LogError::GroupMissing {
        stream: group.stream.clone(),
        group: group.group.clone(),
    }
}
