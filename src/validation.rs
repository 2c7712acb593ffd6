//! Pre-flight destination validation
//!
//! Validation is pure and collecting: every problem found is reported as a
//! human-readable string rather than failing fast on the first one. The
//! channels refuse to dial a destination that carries errors; warnings flag
//! configuration that is suspicious but still deliverable.

use crate::types::{Destination, DestinationAuth};
use serde_json::Value;
use url::Url;

/// Outcome of validating one destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DestinationValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a webhook destination before dispatch.
pub fn validate_destination(destination: &Destination) -> DestinationValidation {
    let mut validation = DestinationValidation::default();

    match destination.url.as_deref() {
        None | Some("") => validation
            .errors
            .push("webhook URL is required".to_string()),
        Some(raw) => match Url::parse(raw) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => validation.errors.push(format!(
                "webhook URL has unsupported scheme '{}'",
                url.scheme()
            )),
            Err(e) => validation
                .errors
                .push(format!("webhook URL is invalid: {e}")),
        },
    }

    if let Some(auth) = &destination.auth {
        validate_auth(auth, &mut validation);
    }

    if let Some(headers) = &destination.headers {
        if !is_string_object(headers) {
            validation
                .errors
                .push("custom headers must be a JSON object of string values".to_string());
        }
    }

    if let Some(template) = &destination.payload_template {
        if !template.is_object() {
            validation
                .errors
                .push("payload template must be a JSON object".to_string());
        }
    }

    if let Some(mapping) = &destination.field_mapping {
        if !is_string_object(mapping) {
            validation.errors.push(
                "field mapping must be a JSON object of dotted-path string values".to_string(),
            );
        }
    }

    if destination.payload_template.is_some() && destination.field_mapping.is_some() {
        validation.warnings.push(
            "payload template and field mapping are both configured; field mapping is ignored"
                .to_string(),
        );
    }

    validation
}

/// Validate an SMS/voice destination before dispatch.
pub fn validate_sms_destination(destination: &Destination) -> DestinationValidation {
    let mut validation = DestinationValidation::default();

    match destination.phone_number.as_deref() {
        None | Some("") => validation
            .errors
            .push("phone number is required".to_string()),
        Some(phone) => {
            if !is_plausible_phone(phone) {
                validation
                    .errors
                    .push(format!("phone number '{phone}' is not a plausible E.164 number"));
            }
        }
    }

    validation
}

fn validate_auth(auth: &DestinationAuth, validation: &mut DestinationValidation) {
    let config = &auth.config;

    match auth.auth_type.as_str() {
        "bearer" => {
            require_str(config, "token", "bearer auth", validation);
        }
        "basic" => {
            require_str(config, "username", "basic auth", validation);
            require_str(config, "password", "basic auth", validation);
        }
        "api_key" => {
            require_str(config, "header", "api_key auth", validation);
            require_str(config, "value", "api_key auth", validation);
        }
        "custom" => {
            let ok = config
                .get("headers")
                .map(is_string_object)
                .unwrap_or(false);
            if !ok {
                validation
                    .errors
                    .push("custom auth requires a 'headers' object of string values".to_string());
            }
        }
        // Unknown schemes are deliverable without auth; the signing layer
        // warns at dispatch time instead.
        _ => {}
    }
}

fn require_str(config: &Value, key: &str, scheme: &str, validation: &mut DestinationValidation) {
    let present = config
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    if !present {
        validation
            .errors
            .push(format!("{scheme} requires a non-empty '{key}'"));
    }
}

fn is_string_object(value: &Value) -> bool {
    value
        .as_object()
        .map(|map| map.values().all(|v| v.is_string()))
        .unwrap_or(false)
}

fn is_plausible_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}
