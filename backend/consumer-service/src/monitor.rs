//! Periodic lag sampling with a CSV metrics record

use chrono::{DateTime, SecondsFormat, Utc};
use event_log::{EventLog, StreamGroup};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::metrics;
use crate::stats::ConsumerStats;

pub const CSV_HEADER: &str = "timestamp,events_processed,lag,batch_time_ms,processing_rate";

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub events_processed: u64,
    pub stream_length: u64,
    /// Group lag, or the stream length when the group reported none
    pub lag: u64,
    pub batch_time_ms: u64,
    pub processing_rate: f64,
}

/// One row of the metrics record. Field order is the column order.
#[derive(Debug, Serialize)]
struct MetricsRecord {
    timestamp: String,
    events_processed: u64,
    lag: u64,
    batch_time_ms: u64,
    processing_rate: String,
}

impl From<&MetricsSample> for MetricsRecord {
    fn from(sample: &MetricsSample) -> Self {
        Self {
            timestamp: sample.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            events_processed: sample.events_processed,
            lag: sample.lag,
            batch_time_ms: sample.batch_time_ms,
            processing_rate: format!("{:.2}", sample.processing_rate),
        }
    }
}

pub struct LagMonitor {
    log: Arc<dyn EventLog>,
    group: StreamGroup,
    metrics_file: PathBuf,
}

impl LagMonitor {
    pub fn new(log: Arc<dyn EventLog>, group: StreamGroup, metrics_file: impl Into<PathBuf>) -> Self {
        Self {
            log,
            group,
            metrics_file: metrics_file.into(),
        }
    }

    pub fn metrics_file(&self) -> &Path {
        &self.metrics_file
    }

    /// Take one sample, publish it, and start a new throughput window.
    ///
    /// Returns `None` when the stream length cannot be read; nothing is published
    /// for that interval. Read and write failures are logged and never fail the
    /// caller.
    pub async fn sample(&self, stats: &mut ConsumerStats) -> Option<MetricsSample> {
        let processing_rate = stats.take_window(Instant::now());

        let stream_length = match self.log.stream_len(&self.group.stream).await {
            Ok(len) => len,
            Err(e) => {
                warn!(
                    error = %e,
                    stream = %self.group.stream,
                    total_processed = stats.total_processed,
                    "Failed to read stream length, skipping metrics sample"
                );
                return None;
            }
        };

        let lag = match self.log.group_lag(&self.group).await {
            Ok(Some(lag)) => lag,
            Ok(None) => stream_length,
            Err(e) => {
                warn!(error = %e, group = %self.group.group, "Failed to read group lag, using stream length");
                stream_length
            }
        };

        let sample = MetricsSample {
            timestamp: Utc::now(),
            events_processed: stats.total_processed,
            stream_length,
            lag,
            batch_time_ms: stats.last_batch_time.as_millis() as u64,
            processing_rate,
        };

        metrics::STREAM_LENGTH.set(clamp_i64(sample.stream_length));
        metrics::GROUP_LAG.set(clamp_i64(sample.lag));
        metrics::PROCESSING_RATE.set(sample.processing_rate);

        info!(
            total_processed = sample.events_processed,
            total_errors = stats.total_errors,
            total_invalid = stats.total_invalid,
            stream_length = sample.stream_length,
            lag = sample.lag,
            batch_time_ms = sample.batch_time_ms,
            processing_rate = %format!("{:.2}", sample.processing_rate),
            "Consumer metrics"
        );

        if let Err(e) = append_record(&self.metrics_file, &sample).await {
            warn!(
                error = %e,
                path = %self.metrics_file.display(),
                "Failed to write metrics record"
            );
        }

        Some(sample)
    }
}

/// Encode `sample` as CSV, preceded by the header when `with_header` is set.
pub fn encode_record(sample: &MetricsSample, with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(with_header)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.serialize(MetricsRecord::from(sample))?;
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(bytes)
}

/// Append one row, writing the header first when the file is missing or empty.
pub async fn append_record(path: &Path, sample: &MetricsSample) -> Result<()> {
    let needs_header = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len() == 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };
    let record = encode_record(sample, needs_header)?;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&record).await?;
    file.flush().await?;
    Ok(())
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MetricsSample {
        MetricsSample {
            timestamp: DateTime::parse_from_rfc3339("2025-03-01T12:00:05.120Z")
                .unwrap()
                .with_timezone(&Utc),
            events_processed: 1500,
            stream_length: 1620,
            lag: 120,
            batch_time_ms: 42,
            processing_rate: 98.766,
        }
    }

    #[test]
    fn test_record_row_format() {
        let bytes = encode_record(&sample(), false).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "2025-03-01T12:00:05.120Z,1500,120,42,98.77\n"
        );
    }

    #[test]
    fn test_record_header_matches_columns() {
        let bytes = encode_record(&sample(), true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(lines.next(), Some("2025-03-01T12:00:05.120Z,1500,120,42,98.77"));
        assert_eq!(lines.next(), None);
    }
}
