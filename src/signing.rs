//! Payload signing and outbound auth headers
//!
//! Signatures are HMAC-SHA256 over the exact bytes written to the wire,
//! computed after payload transformation and serialization. The digest is
//! emitted twice for receiver compatibility: once as raw hex and once in
//! the GitHub-style `sha256=<hex>` form.

use crate::types::{Destination, DestinationAuth, EventEnvelope};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the raw hex digest.
pub const SIGNATURE_HEADER: &str = "X-Alert24-Signature";
/// Header carrying the `sha256=<hex>` digest.
pub const SIGNATURE_SHA256_HEADER: &str = "X-Alert24-Signature-256";
pub const EVENT_HEADER: &str = "X-Alert24-Event";
pub const DELIVERY_HEADER: &str = "X-Alert24-Delivery";
pub const DESTINATION_HEADER: &str = "X-Alert24-Destination";
pub const TIMESTAMP_HEADER: &str = "X-Alert24-Timestamp";

/// Compute the hex HMAC-SHA256 digest of a serialized payload.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature header pair for a signed delivery.
pub fn signature_headers(secret: &str, body: &[u8]) -> HashMap<String, String> {
    let signature = sign_payload(secret, body);
    let mut headers = HashMap::with_capacity(2);
    headers.insert(
        SIGNATURE_SHA256_HEADER.to_string(),
        format!("sha256={signature}"),
    );
    headers.insert(SIGNATURE_HEADER.to_string(), signature);
    headers
}

/// Build auth headers from a destination's auth descriptor.
///
/// Unknown schemes are logged and produce no headers; delivery still
/// proceeds without auth.
pub fn auth_headers(auth: &DestinationAuth) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let config = &auth.config;

    match auth.auth_type.as_str() {
        "bearer" => {
            if let Some(token) = config.get("token").and_then(|v| v.as_str()) {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
        }
        "basic" => {
            let username = config
                .get("username")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let password = config
                .get("password")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let credentials = BASE64_STANDARD.encode(format!("{username}:{password}"));
            headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
        }
        "api_key" => {
            if let (Some(header), Some(value)) = (
                config.get("header").and_then(|v| v.as_str()),
                config.get("value").and_then(|v| v.as_str()),
            ) {
                headers.insert(header.to_string(), value.to_string());
            }
        }
        "custom" => {
            if let Some(map) = config.get("headers").and_then(|v| v.as_object()) {
                for (name, value) in map {
                    if let Some(value) = value.as_str() {
                        headers.insert(name.clone(), value.to_string());
                    }
                }
            }
        }
        other => {
            warn!(
                scheme = %other,
                "Unknown destination auth scheme, sending without auth headers"
            );
        }
    }

    headers
}

/// Standard headers attached to every outbound webhook call.
pub fn standard_headers(envelope: &EventEnvelope) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert(EVENT_HEADER.to_string(), envelope.event.clone());
    headers.insert(DELIVERY_HEADER.to_string(), envelope.id.clone());
    headers.insert(
        DESTINATION_HEADER.to_string(),
        envelope.destination_id.clone(),
    );
    headers.insert(
        TIMESTAMP_HEADER.to_string(),
        envelope.timestamp.to_rfc3339(),
    );
    headers
}

/// Assemble the full header set for one delivery.
///
/// Merge order: standard headers, destination custom headers, auth
/// headers, signature headers. Later layers win on name collision.
pub fn build_headers(
    destination: &Destination,
    envelope: &EventEnvelope,
    body: &[u8],
) -> HashMap<String, String> {
    let mut headers = standard_headers(envelope);

    if let Some(custom) = destination.headers.as_ref().and_then(|v| v.as_object()) {
        for (name, value) in custom {
            if let Some(value) = value.as_str() {
                headers.insert(name.clone(), value.to_string());
            }
        }
    }

    if let Some(auth) = &destination.auth {
        headers.extend(auth_headers(auth));
    }

    if let Some(secret) = destination.secret.as_deref().filter(|s| !s.is_empty()) {
        headers.extend(signature_headers(secret, body));
    }

    headers
}
