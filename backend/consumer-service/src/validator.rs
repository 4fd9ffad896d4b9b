//! Decoding of raw stream entries into typed events

use event_log::{EntryId, RawEntry};
use event_schema::{decode_event, AnalyticsEvent, SchemaError, EVENT_DATA_FIELD};
use thiserror::Error;
use tracing::warn;

/// Why an entry could not become an event
#[derive(Error, Debug)]
pub enum EntryRejection {
    #[error("entry has no `data` field")]
    MissingData,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidEvent {
    pub id: EntryId,
    pub event: AnalyticsEvent,
}

#[derive(Debug)]
pub struct InvalidEntry {
    pub id: EntryId,
    pub reason: EntryRejection,
}

/// A batch split into decodable events and rejected entries, both in delivery order
#[derive(Debug, Default)]
pub struct ValidatedBatch {
    pub valid: Vec<ValidEvent>,
    pub invalid: Vec<InvalidEntry>,
}

pub fn validate_entry(entry: &RawEntry) -> Result<AnalyticsEvent, EntryRejection> {
    let payload = entry
        .field(EVENT_DATA_FIELD)
        .ok_or(EntryRejection::MissingData)?;
    Ok(decode_event(payload)?)
}

pub fn validate_batch(entries: Vec<RawEntry>) -> ValidatedBatch {
    let mut batch = ValidatedBatch::default();

    for entry in entries {
        match validate_entry(&entry) {
            Ok(event) => batch.valid.push(ValidEvent {
                id: entry.id,
                event,
            }),
            Err(reason) => {
                warn!(entry_id = %entry.id, error = %reason, "Invalid event data");
                batch.invalid.push(InvalidEntry {
                    id: entry.id,
                    reason,
                });
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_VIEW: &str = r#"{
        "event_id": "3f0c1a52-9d7e-4b8a-a1c2-5e6f7a8b9c0d",
        "timestamp": "2025-03-01T12:00:00Z",
        "event_type": "page_view",
        "user_id": "user_042",
        "properties": {
            "page_url": "https://example.com/pricing",
            "referrer": "https://google.com",
            "session_id": "8a7b6c5d-4e3f-4a1b-9c8d-7e6f5a4b3c2d",
            "viewport_width": 1440,
            "viewport_height": 900
        }
    }"#;

    fn entry(id: &str, fields: &[(&str, &[u8])]) -> RawEntry {
        RawEntry {
            id: EntryId::new(id),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_partitions_in_delivery_order() {
        let batch = validate_batch(vec![
            entry("1-0", &[("data", PAGE_VIEW.as_bytes())]),
            entry("2-0", &[("data", &b"{\"event_type\":\"page_view\"}"[..])]),
            entry("3-0", &[("other", PAGE_VIEW.as_bytes())]),
            entry("4-0", &[("data", &[0xff, 0xfe][..])]),
            entry("5-0", &[("data", PAGE_VIEW.as_bytes())]),
        ]);

        let valid: Vec<_> = batch.valid.iter().map(|v| v.id.as_str()).collect();
        let invalid: Vec<_> = batch.invalid.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(valid, ["1-0", "5-0"]);
        assert_eq!(invalid, ["2-0", "3-0", "4-0"]);
        assert!(matches!(batch.invalid[1].reason, EntryRejection::MissingData));
    }

    #[test]
    fn test_constraint_violation_is_invalid() {
        let bad_viewport = PAGE_VIEW.replace("\"viewport_width\": 1440", "\"viewport_width\": 0");

        let err = validate_entry(&entry("1-0", &[("data", bad_viewport.as_bytes())])).unwrap_err();
        assert!(matches!(err, EntryRejection::Schema(SchemaError::Constraint { .. })));
    }

    #[test]
    fn test_unknown_event_type_is_invalid() {
        let unknown = PAGE_VIEW.replace("page_view", "scroll");

        let err = validate_entry(&entry("1-0", &[("data", unknown.as_bytes())])).unwrap_err();
        assert!(matches!(err, EntryRejection::Schema(SchemaError::Json(_))));
    }
}
