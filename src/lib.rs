//! # Alert24 Dispatch
//!
//! Outbound notification dispatch engine for the Alert24 incident management
//! platform, turning platform events (incident state changes, monitoring
//! alerts) into deliveries against customer-configured destinations:
//! - Webhook notifications (HMAC-signed HTTP POST)
//! - SMS notifications via Twilio
//! - Voice call notifications via Twilio
//! - Payload templating and field mapping per destination
//! - Delivery tracking with retry mechanisms
//! - Escalation policy modeling
//!
//! ## Features
//!
//! - **Signed payloads**: HMAC-SHA256 signatures over the exact wire bytes,
//!   plus per-destination auth headers (bearer, basic, API key, custom)
//! - **Payload shaping**: `{{dotted.path}}` templates and field mappings so
//!   destinations receive the shape they expect
//! - **Retry mechanisms**: exponential backoff with permanent-failure and
//!   inactive-destination short-circuits
//! - **Batch fan-out**: chunked concurrent dispatch with order-preserving
//!   results
//! - **Delivery analytics**: success rates, latency averages, and failure
//!   histograms per batch
//! - **Escalation policies**: ordered notification steps with repeat rules
//!
//! ## Usage
//!
//! ```rust,no_run
//! use alert24_dispatch::{DispatchConfig, DispatchService, Destination};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = DispatchService::new(DispatchConfig::default())?;
//!
//!     let destinations = vec![Destination::webhook(
//!         "dest-1",
//!         "https://hooks.example.com/alert24",
//!     )];
//!
//!     let report = service
//!         .dispatch_event(
//!             &destinations,
//!             "incident.created",
//!             "org-1",
//!             &json!({
//!                 "id": "inc-42",
//!                 "title": "API latency above SLO",
//!                 "severity": "critical"
//!             }),
//!         )
//!         .await?;
//!
//!     println!("delivered to {}/{}", report.stats.successful, report.stats.total);
//!     Ok(())
//! }
//! ```

use serde_json::Value;
use tracing::info;

pub mod batch;
pub mod channels;
pub mod config;
pub mod error;
pub mod escalation;
pub mod retry;
pub mod signing;
pub mod stats;
pub mod transform;
pub mod types;
pub mod validation;

pub use channels::{ChannelInfo, DispatchChannel, SmsChannel, WebhookChannel};
pub use config::{DispatchConfig, RetryConfig, SmsConfig, SmsProvider, TwilioConfig, WebhookConfig};
pub use error::{DispatchError, Result};
pub use escalation::{
    EscalationPolicy, EscalationStep, EscalationTarget, RepeatConfig, StepChannel, StepViolation,
    TargetType,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use types::{
    DeliveryResult, Destination, DestinationAuth, DestinationHealthUpdate, DispatchReport,
    DispatchStats, EventEnvelope,
};
pub use validation::DestinationValidation;

/// Main dispatch service struct that coordinates all outbound deliveries
#[derive(Debug, Clone)]
pub struct DispatchService {
    config: DispatchConfig,
    webhook: Option<WebhookChannel>,
    sms: Option<SmsChannel>,
}

impl DispatchService {
    /// Create a new dispatch service with the given configuration.
    ///
    /// The configuration is validated up front; disabled channels are simply
    /// not constructed and dispatching through them returns
    /// [`DispatchError::ChannelDisabled`].
    pub fn new(config: DispatchConfig) -> Result<Self> {
        config.validate().map_err(DispatchError::config)?;

        let webhook = if config.webhook.enabled {
            Some(WebhookChannel::new(&config.webhook, &config.retry)?)
        } else {
            None
        };

        let sms = if config.sms.enabled {
            Some(SmsChannel::new(&config.sms, &config.retry)?)
        } else {
            None
        };

        info!(
            webhook_enabled = webhook.is_some(),
            sms_enabled = sms.is_some(),
            "Dispatch service initialized"
        );

        Ok(Self {
            config,
            webhook,
            sms,
        })
    }

    /// Dispatch an event to every destination subscribed to its tag.
    ///
    /// Destinations not subscribed to `event` are skipped entirely; the
    /// report's results, stats, and health updates cover the subscribed
    /// destinations in their input order.
    pub async fn dispatch_event(
        &self,
        destinations: &[Destination],
        event: &str,
        organization_id: &str,
        data: &Value,
    ) -> Result<DispatchReport> {
        let webhook = self
            .webhook
            .as_ref()
            .ok_or_else(|| DispatchError::channel_disabled("webhook"))?;

        let interested = interested_destinations(destinations, event);
        let results = webhook
            .send_batch(&interested, event, organization_id, data)
            .await;
        Ok(assemble_report(&interested, results))
    }

    /// Send an SMS alert to every phone destination in the list.
    pub async fn dispatch_sms(
        &self,
        destinations: &[Destination],
        body: &str,
    ) -> Result<DispatchReport> {
        let sms = self
            .sms
            .as_ref()
            .ok_or_else(|| DispatchError::channel_disabled("sms"))?;

        let results = sms.send_batch(destinations, body).await;
        Ok(assemble_report(destinations, results))
    }

    /// Place a voice call reading the message to every phone destination.
    pub async fn dispatch_voice(
        &self,
        destinations: &[Destination],
        message: &str,
    ) -> Result<DispatchReport> {
        let sms = self
            .sms
            .as_ref()
            .ok_or_else(|| DispatchError::channel_disabled("voice"))?;

        let results = sms.call_batch(destinations, message).await;
        Ok(assemble_report(destinations, results))
    }

    /// Get service health status
    pub async fn health_check(&self) -> Result<serde_json::Value> {
        let mut health = serde_json::json!({
            "service": "dispatch",
            "status": "healthy",
            "timestamp": chrono::Utc::now(),
            "channels": {}
        });

        let channels = health["channels"].as_object_mut().unwrap();

        if let Some(ref webhook) = self.webhook {
            let healthy = webhook.health_check().await.unwrap_or(false);
            channels.insert(
                "webhook".to_string(),
                serde_json::json!({
                    "enabled": true,
                    "status": if healthy { "healthy" } else { "unhealthy" }
                }),
            );
        } else {
            channels.insert(
                "webhook".to_string(),
                serde_json::json!({ "enabled": false }),
            );
        }

        if let Some(ref sms) = self.sms {
            let healthy = sms.health_check().await.unwrap_or(false);
            channels.insert(
                "sms".to_string(),
                serde_json::json!({
                    "enabled": true,
                    "status": if healthy { "healthy" } else { "unhealthy" }
                }),
            );
        } else {
            channels.insert("sms".to_string(), serde_json::json!({ "enabled": false }));
        }

        Ok(health)
    }

    /// Access the webhook channel for advanced operations, if enabled.
    pub fn webhook(&self) -> Option<&WebhookChannel> {
        self.webhook.as_ref()
    }

    /// Access the SMS channel for advanced operations, if enabled.
    pub fn sms(&self) -> Option<&SmsChannel> {
        self.sms.as_ref()
    }

    /// The active configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

/// Filter destinations down to the ones subscribed to an event tag.
pub fn interested_destinations(destinations: &[Destination], event: &str) -> Vec<Destination> {
    destinations
        .iter()
        .filter(|d| d.subscribes_to(event))
        .cloned()
        .collect()
}

fn assemble_report(destinations: &[Destination], results: Vec<DeliveryResult>) -> DispatchReport {
    let stats = stats::summarize(&results);
    let health = destinations
        .iter()
        .zip(results.iter())
        .map(|(destination, result)| DestinationHealthUpdate::from_result(destination, result))
        .collect();
    DispatchReport {
        results,
        stats,
        health,
    }
}
