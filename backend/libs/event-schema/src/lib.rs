//! Analytics event schema shared by the ingestion and consumer services
//!
//! Every event travelling through the pipeline is an [`AnalyticsEvent`]: a tagged
//! union keyed by `event_type` whose `properties` shape is fixed per variant.
//! The wire form is a single JSON object stored under the [`EVENT_DATA_FIELD`]
//! field of a stream entry.
use serde::{Deserialize, Serialize};

mod error;
pub mod events;

pub use error::{SchemaError, SchemaResult};
pub use events::{
    AnalyticsEvent, ApiCallProperties, ButtonClickProperties, ErrorProperties, EventEnvelope,
    EventType, HttpMethod, PageViewProperties,
};

/// Name of the stream entry field carrying the JSON-encoded event
pub const EVENT_DATA_FIELD: &str = "data";

/// Number of synthetic users events are attributed to
pub const USER_POOL_SIZE: u32 = 100;

/// Target share of each event type in generated traffic
pub const EVENT_DISTRIBUTION: [(EventType, f64); 4] = [
    (EventType::PageView, 0.70),
    (EventType::ButtonClick, 0.15),
    (EventType::ApiCall, 0.10),
    (EventType::Error, 0.05),
];

/// Serialize an event into its wire form.
pub fn encode_event(event: &AnalyticsEvent) -> SchemaResult<Vec<u8>> {
    Ok(serde_json::to_vec(event)?)
}

/// Parse raw bytes into a validated event.
///
/// This is the only way a payload becomes an [`AnalyticsEvent`] on the consumer side:
/// JSON decoding selects the variant from `event_type`, then the variant's property
/// constraints are checked. Any failure makes the whole payload invalid.
pub fn decode_event(payload: &[u8]) -> SchemaResult<AnalyticsEvent> {
    let event: AnalyticsEvent = serde_json::from_slice(payload)?;
    event.validate()?;
    Ok(event)
}

/// Summary row of a persisted event, as stored in the `events` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub time: chrono::DateTime<chrono::Utc>,
    pub event_id: uuid::Uuid,
    pub event_type: EventType,
    pub user_id: String,
    pub properties: serde_json::Value,
}

impl EventRow {
    pub fn from_event(event: &AnalyticsEvent) -> SchemaResult<Self> {
        Ok(Self {
            time: event.timestamp(),
            event_id: event.event_id(),
            event_type: event.event_type(),
            user_id: event.user_id().to_string(),
            properties: event.properties_json()?,
        })
    }
}
