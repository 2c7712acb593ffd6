//! SMS and voice delivery channel
//!
//! Talks to the Twilio REST API: `Messages.json` for text messages and
//! `Calls.json` for voice calls that read the message aloud. Both paths run
//! through the shared retry state machine; provider 4xx responses (bad
//! number, bad credentials) are permanent and never retried because this is
//! paid traffic.

use std::borrow::Cow;
use std::time::Instant;

use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::batch::{run_batched, BatchOptions};
use crate::channels::{ChannelInfo, DispatchChannel};
use crate::config::{RetryConfig, SmsConfig, TwilioConfig};
use crate::error::{DispatchError, Result};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{DeliveryResult, Destination};
use crate::validation;

/// Provider limit on message bodies; longer texts are truncated, not rejected.
const MAX_SMS_BODY: usize = 1600;

/// SMS notification channel
#[derive(Debug, Clone)]
pub struct SmsChannel {
    config: SmsConfig,
    retry: RetryPolicy,
    client: Client,
}

impl SmsChannel {
    /// Create a new SMS channel
    pub fn new(config: &SmsConfig, retry: &RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DispatchError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            retry: RetryPolicy::from_config(retry),
            client,
        })
    }

    /// Send an SMS with retries.
    ///
    /// Phone validation failures are reported with `attempt == 0` and never
    /// reach the provider.
    pub async fn send_with_retry(&self, destination: &Destination, body: &str) -> DeliveryResult {
        let target = destination.phone_number.clone().unwrap_or_default();

        let validation = validation::validate_sms_destination(destination);
        if !validation.is_valid() {
            warn!(
                destination_id = %destination.id,
                errors = ?validation.errors,
                "SMS destination failed validation, delivery not attempted"
            );
            return DeliveryResult::failed(
                &destination.id,
                &target,
                format!("Validation failed: {}", validation.errors.join("; ")),
                0,
            );
        }

        let mut attempt = 1u32;
        loop {
            let result = self.send_once(destination, body, attempt).await;
            match self.retry.assess(&result, destination.is_active, attempt) {
                RetryDecision::Delivered | RetryDecision::Rejected => return result,
                RetryDecision::Exhausted => {
                    warn!(
                        destination_id = %destination.id,
                        attempts = attempt,
                        "SMS retry budget exhausted"
                    );
                    return result;
                }
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        destination_id = %destination.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying SMS after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Place a voice call with retries, same state machine as SMS.
    pub async fn call_with_retry(&self, destination: &Destination, message: &str) -> DeliveryResult {
        let target = destination.phone_number.clone().unwrap_or_default();

        let validation = validation::validate_sms_destination(destination);
        if !validation.is_valid() {
            warn!(
                destination_id = %destination.id,
                errors = ?validation.errors,
                "Voice destination failed validation, delivery not attempted"
            );
            return DeliveryResult::failed(
                &destination.id,
                &target,
                format!("Validation failed: {}", validation.errors.join("; ")),
                0,
            );
        }

        let mut attempt = 1u32;
        loop {
            let result = self.call_once(destination, message, attempt).await;
            match self.retry.assess(&result, destination.is_active, attempt) {
                RetryDecision::Delivered | RetryDecision::Rejected => return result,
                RetryDecision::Exhausted => {
                    warn!(
                        destination_id = %destination.id,
                        attempts = attempt,
                        "Voice retry budget exhausted"
                    );
                    return result;
                }
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        destination_id = %destination.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying voice call after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Single SMS send attempt.
    pub async fn send_once(
        &self,
        destination: &Destination,
        body: &str,
        attempt: u32,
    ) -> DeliveryResult {
        let target = destination.phone_number.clone().unwrap_or_default();
        let twilio = match &self.config.twilio {
            Some(twilio) => twilio,
            None => {
                return DeliveryResult::failed(
                    &destination.id,
                    &target,
                    "Twilio configuration is missing",
                    attempt,
                )
            }
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            twilio.api_base_url.trim_end_matches('/'),
            twilio.account_sid
        );
        let message = clip_body(body);
        let params = vec![
            ("To", target.clone()),
            ("From", twilio.from_phone.clone()),
            ("Body", message.into_owned()),
        ];

        self.provider_call(twilio, destination, &target, &url, &params, attempt)
            .await
    }

    /// Single voice call attempt. The message is wrapped in TwiML and read
    /// aloud by the provider.
    pub async fn call_once(
        &self,
        destination: &Destination,
        message: &str,
        attempt: u32,
    ) -> DeliveryResult {
        let target = destination.phone_number.clone().unwrap_or_default();
        let twilio = match &self.config.twilio {
            Some(twilio) => twilio,
            None => {
                return DeliveryResult::failed(
                    &destination.id,
                    &target,
                    "Twilio configuration is missing",
                    attempt,
                )
            }
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            twilio.api_base_url.trim_end_matches('/'),
            twilio.account_sid
        );
        let twiml = format!("<Response><Say>{}</Say></Response>", xml_escape(message));
        let params = vec![
            ("To", target.clone()),
            ("From", twilio.from_phone.clone()),
            ("Twiml", twiml),
        ];

        self.provider_call(twilio, destination, &target, &url, &params, attempt)
            .await
    }

    /// Send the same message to many phone destinations in chunks.
    ///
    /// `results[i]` always corresponds to `destinations[i]`.
    pub async fn send_batch(
        &self,
        destinations: &[Destination],
        body: &str,
    ) -> Vec<DeliveryResult> {
        if destinations.is_empty() {
            return Vec::new();
        }

        info!(destinations = destinations.len(), "Dispatching SMS batch");

        let options = BatchOptions::new(self.config.batch_size, self.config.batch_delay());
        let message = body.to_string();
        run_batched(
            destinations.len(),
            &options,
            |i| {
                let channel = self.clone();
                let destination = destinations[i].clone();
                let message = message.clone();
                async move { channel.send_with_retry(&destination, &message).await }
            },
            |i, _err| {
                let destination = &destinations[i];
                DeliveryResult::failed(
                    &destination.id,
                    destination.phone_number.clone().unwrap_or_default(),
                    "Dispatch task failed unexpectedly",
                    1,
                )
            },
        )
        .await
    }

    /// Place the same voice call to many phone destinations in chunks.
    pub async fn call_batch(
        &self,
        destinations: &[Destination],
        message: &str,
    ) -> Vec<DeliveryResult> {
        if destinations.is_empty() {
            return Vec::new();
        }

        info!(destinations = destinations.len(), "Dispatching voice batch");

        let options = BatchOptions::new(self.config.batch_size, self.config.batch_delay());
        let message = message.to_string();
        run_batched(
            destinations.len(),
            &options,
            |i| {
                let channel = self.clone();
                let destination = destinations[i].clone();
                let message = message.clone();
                async move { channel.call_with_retry(&destination, &message).await }
            },
            |i, _err| {
                let destination = &destinations[i];
                DeliveryResult::failed(
                    &destination.id,
                    destination.phone_number.clone().unwrap_or_default(),
                    "Dispatch task failed unexpectedly",
                    1,
                )
            },
        )
        .await
    }

    async fn provider_call(
        &self,
        twilio: &TwilioConfig,
        destination: &Destination,
        target: &str,
        url: &str,
        params: &[(&str, String)],
        attempt: u32,
    ) -> DeliveryResult {
        debug!(
            destination_id = %destination.id,
            url = %url,
            attempt,
            "Calling SMS provider"
        );

        let started = Instant::now();
        let request = self
            .client
            .post(url)
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(params);

        match request.send().await {
            Ok(response) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let status = response.status().as_u16();
                let body_text = response.text().await.unwrap_or_default();

                if status < 400 {
                    info!(
                        destination_id = %destination.id,
                        status,
                        elapsed_ms,
                        "Provider accepted message"
                    );
                    let mut result = DeliveryResult::succeeded(
                        &destination.id,
                        target,
                        status,
                        elapsed_ms,
                        attempt,
                    );
                    result.response_body = Some(body_text);
                    result
                } else {
                    warn!(
                        destination_id = %destination.id,
                        status,
                        attempt,
                        "Provider rejected message"
                    );
                    let mut result = DeliveryResult::failed(
                        &destination.id,
                        target,
                        format!("HTTP {}", status),
                        attempt,
                    );
                    result.status = Some(status);
                    result.response_time_ms = Some(elapsed_ms);
                    result.response_body = Some(body_text);
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
                    "Provider request failed"
                );
                let mut result = DeliveryResult::failed(&destination.id, target, message, attempt);
                result.response_time_ms = Some(elapsed_ms);
                result
            }
        }
    }
}

#[async_trait::async_trait]
impl DispatchChannel for SmsChannel {
    async fn health_check(&self) -> Result<bool> {
        let ready = self
            .config
            .twilio
            .as_ref()
            .map(|t| !t.account_sid.is_empty() && !t.auth_token.is_empty())
            .unwrap_or(false);
        debug!(ready, "SMS channel health check");
        Ok(ready)
    }

    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            name: "SMS".to_string(),
            description: "SMS and voice delivery via Twilio".to_string(),
            enabled: self.config.enabled,
            batch_size: self.config.batch_size,
            batch_delay_ms: self.config.batch_delay_ms,
            supports_retry: true,
        }
    }
}

fn clip_body(body: &str) -> Cow<'_, str> {
    if body.len() <= MAX_SMS_BODY {
        return Cow::Borrowed(body);
    }
    warn!(len = body.len(), "SMS body exceeds provider limit, truncating");
    let mut end = MAX_SMS_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(body[..end].to_string())
}

fn xml_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
