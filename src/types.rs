//! Core data types for the dispatch engine
//!
//! The engine treats destinations as read-only inputs owned by the caller:
//! it never loads or persists them. Counter updates that belong in storage
//! (last success/failure timestamps, failure counts) are handed back as
//! [`DestinationHealthUpdate`] values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A configured delivery endpoint: a webhook URL or a phone number,
/// plus per-destination signing, auth, and payload-shaping settings.
///
/// The loosely structured fields (`auth` config, `headers`,
/// `payload_template`, `field_mapping`) are stored as raw JSON values and
/// shape-checked by [`crate::validation`] before any delivery is attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Webhook endpoint URL. Required for webhook dispatch.
    #[serde(default)]
    pub url: Option<String>,
    /// E.164 phone number. Required for SMS/voice dispatch.
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Shared secret for HMAC payload signing. No secret, no signature headers.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub auth: Option<DestinationAuth>,
    /// Extra outbound headers, a JSON object of string values.
    #[serde(default)]
    pub headers: Option<Value>,
    /// Payload template document with `{{dotted.path}}` placeholders.
    #[serde(default)]
    pub payload_template: Option<Value>,
    /// Field mapping object: target dotted path -> source dotted path.
    #[serde(default)]
    pub field_mapping: Option<Value>,
    /// Event tags this destination subscribes to; `"*"` matches everything.
    #[serde(default = "default_events")]
    pub events: Vec<String>,
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_count: u32,
}

fn default_active() -> bool {
    true
}

fn default_events() -> Vec<String> {
    vec!["*".to_string()]
}

impl Destination {
    /// Minimal webhook destination; every other field takes its default.
    pub fn webhook(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url: Some(url.into()),
            phone_number: None,
            is_active: true,
            secret: None,
            auth: None,
            headers: None,
            payload_template: None,
            field_mapping: None,
            events: default_events(),
            last_success_at: None,
            last_failure_at: None,
            failure_count: 0,
        }
    }

    /// Minimal SMS/voice destination; every other field takes its default.
    pub fn sms(id: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url: None,
            phone_number: Some(phone_number.into()),
            is_active: true,
            secret: None,
            auth: None,
            headers: None,
            payload_template: None,
            field_mapping: None,
            events: default_events(),
            last_success_at: None,
            last_failure_at: None,
            failure_count: 0,
        }
    }

    /// Whether this destination wants the given event tag.
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == "*" || e == event)
    }
}

/// Destination auth descriptor: a scheme tag plus scheme-specific config.
///
/// The scheme is kept as a plain string so that unrecognized schemes
/// deserialize cleanly and reach the warn-and-skip path in
/// [`crate::signing::auth_headers`] instead of failing the whole row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationAuth {
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default)]
    pub config: Value,
}

/// The event payload wrapper sent to every destination.
///
/// Built once per destination per dispatch; the `id` doubles as the
/// delivery id carried in outbound headers. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub organization_id: String,
    pub destination_id: String,
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(
        event: impl Into<String>,
        organization_id: impl Into<String>,
        destination_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event: event.into(),
            organization_id: organization_id.into(),
            destination_id: destination_id.into(),
            data,
        }
    }
}

/// Outcome of one delivery (including all retry attempts it consumed).
///
/// `attempt` is the 1-based ordinal of the attempt that produced this
/// result. `attempt == 0` marks a pre-flight validation rejection that
/// never reached the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub destination_id: String,
    /// The dialed target: webhook URL or phone number.
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn succeeded(
        destination_id: impl Into<String>,
        target: impl Into<String>,
        status: u16,
        response_time_ms: u64,
        attempt: u32,
    ) -> Self {
        Self {
            success: true,
            destination_id: destination_id.into(),
            target: target.into(),
            status: Some(status),
            response_time_ms: Some(response_time_ms),
            response_body: None,
            response_headers: None,
            error: None,
            attempt,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        destination_id: impl Into<String>,
        target: impl Into<String>,
        error: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            success: false,
            destination_id: destination_id.into(),
            target: target.into(),
            status: None,
            response_time_ms: None,
            response_body: None,
            response_headers: None,
            error: Some(error.into()),
            attempt,
            timestamp: Utc::now(),
        }
    }

    /// HTTP 4xx outcomes are permanent; retrying them wastes quota.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(s) if (400..500).contains(&s))
    }
}

/// Aggregate view over a batch of delivery results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage in `0.0..=100.0`, rounded to two decimals. 0 when empty.
    pub success_rate: f64,
    /// Mean latency over successful deliveries that reported one.
    pub avg_response_time_ms: f64,
    /// Failure histogram keyed by error message.
    pub errors: HashMap<String, usize>,
}

/// Health counter update for the caller to persist after a delivery.
///
/// `failure_count` is the new stored value: zero after a success, the
/// prior count plus one after a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationHealthUpdate {
    pub destination_id: String,
    pub succeeded: bool,
    pub at: DateTime<Utc>,
    pub failure_count: u32,
}

impl DestinationHealthUpdate {
    pub fn from_result(destination: &Destination, result: &DeliveryResult) -> Self {
        Self {
            destination_id: destination.id.clone(),
            succeeded: result.success,
            at: result.timestamp,
            failure_count: if result.success {
                0
            } else {
                destination.failure_count.saturating_add(1)
            },
        }
    }
}

/// Batch-level return of the dispatch facade: per-destination results in
/// input order, aggregate stats, and health updates to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub results: Vec<DeliveryResult>,
    pub stats: DispatchStats,
    pub health: Vec<DestinationHealthUpdate>,
}

impl DispatchReport {
    /// Batch-level success: at least one destination accepted the event.
    /// Stricter thresholds (e.g. success rate floors) are the caller's call.
    pub fn any_delivered(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }
}
