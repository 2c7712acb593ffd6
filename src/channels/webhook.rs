//! Webhook delivery channel
//!
//! Sends signed event payloads as HTTP POST requests. Every delivery runs
//! through the shared retry state machine; fan-out to many destinations is
//! chunked so a large organization cannot saturate the outbound connection
//! pool.

use std::collections::HashMap;
use std::time::Instant;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::batch::{run_batched, BatchOptions};
use crate::channels::{ChannelInfo, DispatchChannel};
use crate::config::{RetryConfig, WebhookConfig};
use crate::error::{DispatchError, Result};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::signing;
use crate::transform;
use crate::types::{DeliveryResult, Destination, EventEnvelope};
use crate::validation;

/// Captured response bodies are truncated to keep results small.
const MAX_CAPTURED_BODY: usize = 4096;

/// Webhook notification channel
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    config: WebhookConfig,
    retry: RetryPolicy,
    client: Client,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(config: &WebhookConfig, retry: &RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| DispatchError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            retry: RetryPolicy::from_config(retry),
            client,
        })
    }

    /// Deliver one event to one destination, retries included.
    pub async fn send_event(
        &self,
        destination: &Destination,
        event: &str,
        organization_id: &str,
        data: &Value,
    ) -> DeliveryResult {
        let envelope = transform::build_envelope(event, organization_id, &destination.id, data);
        self.deliver_with_retry(destination, &envelope).await
    }

    /// Deliver an envelope with the full retry state machine.
    ///
    /// Validation failures are reported with `attempt == 0` and never dial
    /// out. The payload is transformed and serialized exactly once, so the
    /// signature covers the same bytes on every attempt.
    pub async fn deliver_with_retry(
        &self,
        destination: &Destination,
        envelope: &EventEnvelope,
    ) -> DeliveryResult {
        let target = destination.url.clone().unwrap_or_default();

        let validation = validation::validate_destination(destination);
        if !validation.is_valid() {
            warn!(
                destination_id = %destination.id,
                errors = ?validation.errors,
                "Destination failed validation, delivery not attempted"
            );
            return DeliveryResult::failed(
                &destination.id,
                &target,
                format!("Validation failed: {}", validation.errors.join("; ")),
                0,
            );
        }

        let payload = transform::transform_payload(destination, envelope);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryResult::failed(
                    &destination.id,
                    &target,
                    format!("Payload serialization failed: {}", e),
                    0,
                );
            }
        };

        if body.len() > self.config.max_payload_size {
            warn!(
                destination_id = %destination.id,
                size = body.len(),
                limit = self.config.max_payload_size,
                "Payload exceeds size limit, delivery not attempted"
            );
            return DeliveryResult::failed(
                &destination.id,
                &target,
                oversize_message(body.len(), self.config.max_payload_size),
                0,
            );
        }

        let headers = signing::build_headers(destination, envelope, &body);

        let mut attempt = 1u32;
        loop {
            let result = self
                .deliver_once(destination, &target, &body, &headers, attempt)
                .await;

            match self.retry.assess(&result, destination.is_active, attempt) {
                RetryDecision::Delivered => return result,
                RetryDecision::Rejected => {
                    if !destination.is_active && !result.is_client_error() {
                        info!(
                            destination_id = %destination.id,
                            "Destination inactive, not retrying"
                        );
                    }
                    return result;
                }
                RetryDecision::Exhausted => {
                    warn!(
                        destination_id = %destination.id,
                        attempts = attempt,
                        "Retry budget exhausted"
                    );
                    return result;
                }
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        destination_id = %destination.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Single delivery attempt with already-prepared wire bytes.
    ///
    /// The size ceiling is enforced here as well: an oversized payload is a
    /// local failure and is never sent.
    pub async fn deliver_once(
        &self,
        destination: &Destination,
        url: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
        attempt: u32,
    ) -> DeliveryResult {
        if body.len() > self.config.max_payload_size {
            return DeliveryResult::failed(
                &destination.id,
                url,
                oversize_message(body.len(), self.config.max_payload_size),
                attempt,
            );
        }

        debug!(
            destination_id = %destination.id,
            url = %url,
            attempt,
            "Sending webhook"
        );

        let started = Instant::now();
        let mut request = self.client.post(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        match request.body(body.to_vec()).send().await {
            Ok(response) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let status = response.status().as_u16();
                let response_headers: HashMap<String, String> = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
                    })
                    .collect();
                let body_text = truncate_body(response.text().await.unwrap_or_default());

                if status < 400 {
                    info!(
                        destination_id = %destination.id,
                        status,
                        elapsed_ms,
                        "Webhook delivered"
                    );
                    let mut result =
                        DeliveryResult::succeeded(&destination.id, url, status, elapsed_ms, attempt);
                    result.response_body = Some(body_text);
                    result.response_headers = Some(response_headers);
                    result
                } else {
                    warn!(
                        destination_id = %destination.id,
                        status,
                        attempt,
                        "Webhook rejected by destination"
                    );
                    let mut result = DeliveryResult::failed(
                        &destination.id,
                        url,
                        format!("HTTP {}", status),
                        attempt,
                    );
                    result.status = Some(status);
                    result.response_time_ms = Some(elapsed_ms);
                    result.response_body = Some(body_text);
                    result.response_headers = Some(response_headers);
                    result
                }
            }
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let message = if e.is_timeout() {
                    format!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    format!("Connection failed: {}", e)
                } else {
                    format!("Request error: {}", e)
                };
                error!(
                    destination_id = %destination.id,
                    error = %message,
                    attempt,
                    "Webhook request failed"
                );
                let mut result =
                    DeliveryResult::failed(&destination.id, url, message, attempt);
                result.response_time_ms = Some(elapsed_ms);
                result
            }
        }
    }

    /// Fan an event out to many destinations in rate-disciplined chunks.
    ///
    /// `results[i]` always corresponds to `destinations[i]`, regardless of
    /// completion order inside a chunk.
    pub async fn send_batch(
        &self,
        destinations: &[Destination],
        event: &str,
        organization_id: &str,
        data: &Value,
    ) -> Vec<DeliveryResult> {
        if destinations.is_empty() {
            return Vec::new();
        }

        info!(
            event = %event,
            organization_id = %organization_id,
            destinations = destinations.len(),
            "Dispatching webhook batch"
        );

        let options = BatchOptions::new(self.config.batch_size, self.config.batch_delay());
        run_batched(
            destinations.len(),
            &options,
            |i| {
                let channel = self.clone();
                let destination = destinations[i].clone();
                let envelope =
                    transform::build_envelope(event, organization_id, &destination.id, data);
                async move { channel.deliver_with_retry(&destination, &envelope).await }
            },
            |i, _err| {
                let destination = &destinations[i];
                DeliveryResult::failed(
                    &destination.id,
                    destination.url.clone().unwrap_or_default(),
                    "Dispatch task failed unexpectedly",
                    1,
                )
            },
        )
        .await
    }
}

#[async_trait::async_trait]
impl DispatchChannel for WebhookChannel {
    async fn health_check(&self) -> Result<bool> {
        debug!("Webhook channel health check");
        Ok(true)
    }

    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            name: "Webhook".to_string(),
            description: "Signed HTTP POST event delivery".to_string(),
            enabled: self.config.enabled,
            batch_size: self.config.batch_size,
            batch_delay_ms: self.config.batch_delay_ms,
            supports_retry: true,
        }
    }
}

fn oversize_message(size: usize, limit: usize) -> String {
    format!("Payload size {} exceeds limit of {} bytes", size, limit)
}

fn truncate_body(body: String) -> String {
    if body.len() <= MAX_CAPTURED_BODY {
        return body;
    }
    let mut end = MAX_CAPTURED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
