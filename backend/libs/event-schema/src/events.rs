use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{SchemaError, SchemaResult};

/// Closed set of analytics event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    ButtonClick,
    ApiCall,
    Error,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::PageView,
        EventType::ButtonClick,
        EventType::ApiCall,
        EventType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::ButtonClick => "button_click",
            EventType::ApiCall => "api_call",
            EventType::Error => "error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every event, with variant-specific `properties`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<P> {
    /// Unique event identifier (UUID v4)
    pub event_id: Uuid,
    /// Generation time, RFC 3339 in UTC with a `Z` suffix
    #[serde(deserialize_with = "deserialize_utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Synthetic user the event is attributed to
    pub user_id: String,
    pub properties: P,
}

fn deserialize_utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if !raw.ends_with('Z') {
        return Err(de::Error::custom(format!(
            "timestamp {raw:?} must be UTC with a Z suffix"
        )));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(de::Error::custom)
}

impl<P> EventEnvelope<P> {
    pub fn new(user_id: impl Into<String>, properties: P) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: user_id.into(),
            properties,
        }
    }
}

/// An analytics event.
///
/// The `event_type` tag selects the properties schema, so a `page_view` can never
/// carry `api_call` properties: such a payload fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    PageView(EventEnvelope<PageViewProperties>),
    ButtonClick(EventEnvelope<ButtonClickProperties>),
    ApiCall(EventEnvelope<ApiCallProperties>),
    Error(EventEnvelope<ErrorProperties>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewProperties {
    pub page_url: String,
    pub referrer: String,
    pub session_id: Uuid,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonClickProperties {
    pub button_id: String,
    pub button_text: String,
    pub page_url: String,
    pub session_id: Uuid,
    pub click_x: i32,
    pub click_y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallProperties {
    pub endpoint: String,
    pub method: HttpMethod,
    pub status_code: u16,
    pub duration_ms: u32,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorProperties {
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub page_url: String,
    pub browser: String,
    pub os: String,
}

impl AnalyticsEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            AnalyticsEvent::PageView(_) => EventType::PageView,
            AnalyticsEvent::ButtonClick(_) => EventType::ButtonClick,
            AnalyticsEvent::ApiCall(_) => EventType::ApiCall,
            AnalyticsEvent::Error(_) => EventType::Error,
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            AnalyticsEvent::PageView(e) => e.event_id,
            AnalyticsEvent::ButtonClick(e) => e.event_id,
            AnalyticsEvent::ApiCall(e) => e.event_id,
            AnalyticsEvent::Error(e) => e.event_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AnalyticsEvent::PageView(e) => e.timestamp,
            AnalyticsEvent::ButtonClick(e) => e.timestamp,
            AnalyticsEvent::ApiCall(e) => e.timestamp,
            AnalyticsEvent::Error(e) => e.timestamp,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            AnalyticsEvent::PageView(e) => &e.user_id,
            AnalyticsEvent::ButtonClick(e) => &e.user_id,
            AnalyticsEvent::ApiCall(e) => &e.user_id,
            AnalyticsEvent::Error(e) => &e.user_id,
        }
    }

    /// Properties as a JSON object, for the `properties` JSONB column
    pub fn properties_json(&self) -> SchemaResult<serde_json::Value> {
        let value = match self {
            AnalyticsEvent::PageView(e) => serde_json::to_value(&e.properties)?,
            AnalyticsEvent::ButtonClick(e) => serde_json::to_value(&e.properties)?,
            AnalyticsEvent::ApiCall(e) => serde_json::to_value(&e.properties)?,
            AnalyticsEvent::Error(e) => serde_json::to_value(&e.properties)?,
        };
        Ok(value)
    }

    /// Check the constraints serde's type checking cannot express.
    pub fn validate(&self) -> SchemaResult<()> {
        validate_uuid_v4("event_id", self.event_id())?;

        match self {
            AnalyticsEvent::PageView(e) => e.properties.validate(),
            AnalyticsEvent::ButtonClick(e) => e.properties.validate(),
            AnalyticsEvent::ApiCall(e) => e.properties.validate(),
            AnalyticsEvent::Error(e) => e.properties.validate(),
        }
    }
}

impl PageViewProperties {
    fn validate(&self) -> SchemaResult<()> {
        validate_url("page_url", &self.page_url)?;
        validate_url("referrer", &self.referrer)?;
        validate_uuid_v4("session_id", self.session_id)?;

        if self.viewport_width == 0 {
            return Err(SchemaError::constraint("viewport_width", "must be positive"));
        }
        if self.viewport_height == 0 {
            return Err(SchemaError::constraint("viewport_height", "must be positive"));
        }

        Ok(())
    }
}

impl ButtonClickProperties {
    fn validate(&self) -> SchemaResult<()> {
        validate_url("page_url", &self.page_url)?;
        validate_uuid_v4("session_id", self.session_id)
    }
}

impl ApiCallProperties {
    fn validate(&self) -> SchemaResult<()> {
        if !(100..=599).contains(&self.status_code) {
            return Err(SchemaError::constraint(
                "status_code",
                format!("{} is outside 100..=599", self.status_code),
            ));
        }
        if self.duration_ms == 0 {
            return Err(SchemaError::constraint("duration_ms", "must be positive"));
        }

        Ok(())
    }
}

impl ErrorProperties {
    fn validate(&self) -> SchemaResult<()> {
        validate_url("page_url", &self.page_url)
    }
}

fn validate_url(field: &'static str, value: &str) -> SchemaResult<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| SchemaError::constraint(field, format!("{value:?} is not a URL: {e}")))
}

fn validate_uuid_v4(field: &'static str, value: Uuid) -> SchemaResult<()> {
    if value.get_version_num() != 4 {
        return Err(SchemaError::constraint(
            field,
            format!("{value} is not a version 4 UUID"),
        ));
    }
    Ok(())
}
