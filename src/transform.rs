//! Payload transformation
//!
//! Turns an event envelope into the exact document a destination receives.
//! Precedence: payload template, then field mapping, then the unchanged
//! envelope. Template substitution walks the template tree and rewrites
//! leaf strings in place, so substituted values can never corrupt the
//! document structure; unresolved `{{tokens}}` are left verbatim for the
//! receiver to see. Transformation never fails a delivery: mis-shaped
//! config degrades to the unchanged envelope with a warning.

use crate::types::{Destination, EventEnvelope};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static TEMPLATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("token pattern compiles"));

/// Build the envelope for one destination, normalizing well-known event
/// families into the wrapper shapes receivers expect.
pub fn build_envelope(
    event: &str,
    organization_id: &str,
    destination_id: &str,
    data: &Value,
) -> EventEnvelope {
    EventEnvelope::new(
        event,
        organization_id,
        destination_id,
        normalize_event_data(event, data),
    )
}

/// Project event data into the documented wrapper shape for well-known
/// event tags. Unknown tags pass through unchanged.
pub fn normalize_event_data(event: &str, data: &Value) -> Value {
    match event {
        "incident.created" | "incident.updated" | "incident.resolved" => wrap_projection(
            "incident",
            data,
            &[
                "id",
                "title",
                "description",
                "severity",
                "status",
                "service_id",
                "created_at",
                "updated_at",
                "url",
            ],
        ),
        "service.down" | "service.up" | "service.degraded" => wrap_projection(
            "service",
            data,
            &["id", "name", "status", "previous_status", "updated_at", "url"],
        ),
        "monitoring.alert" => wrap_projection(
            "alert",
            data,
            &[
                "check_id",
                "check_name",
                "status",
                "response_time",
                "error_message",
                "timestamp",
                "url",
            ],
        ),
        _ => data.clone(),
    }
}

fn wrap_projection(key: &str, data: &Value, fields: &[&str]) -> Value {
    // Already wrapped by the caller; leave it alone.
    if data.get(key).map(Value::is_object).unwrap_or(false) {
        return data.clone();
    }

    let mut projected = Map::new();
    if let Some(source) = data.as_object() {
        for field in fields {
            if let Some(value) = source.get(*field) {
                projected.insert((*field).to_string(), value.clone());
            }
        }
    }

    let mut wrapper = Map::new();
    wrapper.insert(key.to_string(), Value::Object(projected));
    Value::Object(wrapper)
}

/// Produce the final payload document for a destination.
pub fn transform_payload(destination: &Destination, envelope: &EventEnvelope) -> Value {
    let envelope_doc = serde_json::to_value(envelope).unwrap_or(Value::Null);

    if let Some(template) = &destination.payload_template {
        if destination.field_mapping.is_some() {
            warn!(
                destination_id = %destination.id,
                "Destination configures both payload template and field mapping; mapping ignored"
            );
        }
        if template.is_object() {
            let namespace = template_namespace(envelope);
            return substitute(template, &namespace);
        }
        warn!(
            destination_id = %destination.id,
            "Payload template is not a JSON object, sending envelope unchanged"
        );
        return envelope_doc;
    }

    if let Some(mapping) = &destination.field_mapping {
        if let Some(map) = mapping.as_object() {
            return apply_field_mapping(map, &envelope_doc);
        }
        warn!(
            destination_id = %destination.id,
            "Field mapping is not a JSON object, sending envelope unchanged"
        );
        return envelope_doc;
    }

    envelope_doc
}

/// The template lookup namespace: the envelope object with the event data's
/// own fields overlaid at the top level. Data fields win on name collision,
/// so templates can say `{{title}}` as well as `{{data.title}}`.
fn template_namespace(envelope: &EventEnvelope) -> Value {
    let mut namespace = serde_json::to_value(envelope).unwrap_or(Value::Null);
    if let (Some(ns), Some(data)) = (namespace.as_object_mut(), envelope.data.as_object()) {
        for (key, value) in data {
            ns.insert(key.clone(), value.clone());
        }
    }
    namespace
}

fn substitute(template: &Value, namespace: &Value) -> Value {
    match template {
        Value::String(s) => Value::String(substitute_str(s, namespace)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| substitute(v, namespace)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, namespace)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(input: &str, namespace: &Value) -> String {
    TEMPLATE_TOKEN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            match lookup_path(namespace, &caps[1]) {
                Some(value) => render_value(value),
                // Unresolved tokens stay verbatim.
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_field_mapping(mapping: &Map<String, Value>, envelope_doc: &Value) -> Value {
    let mut result = Value::Object(Map::new());
    for (target_path, source) in mapping {
        let source_path = match source.as_str() {
            Some(path) => path,
            None => {
                warn!(target = %target_path, "Field mapping value is not a string path, skipping");
                continue;
            }
        };
        // Unresolvable source paths are omitted, not nulled.
        if let Some(value) = lookup_path(envelope_doc, source_path) {
            set_path(&mut result, target_path, value.clone());
        }
    }
    result
}

/// Walk `value` down a dotted path. `None` when a segment is missing or a
/// non-object is traversed.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set `path` in `doc` to `new_value`, creating intermediate objects and
/// replacing scalar intermediates as needed.
pub fn set_path(doc: &mut Value, path: &str, new_value: Value) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    match path.split_once('.') {
        None => {
            if let Some(map) = doc.as_object_mut() {
                map.insert(path.to_string(), new_value);
            }
        }
        Some((head, rest)) => {
            if let Some(map) = doc.as_object_mut() {
                let child = map.entry(head.to_string()).or_insert(Value::Null);
                set_path(child, rest, new_value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn envelope_with(data: Value) -> EventEnvelope {
        EventEnvelope::new("incident.created", "org-1", "dest-1", data)
    }

    #[test]
    fn test_lookup_path() {
        let doc = json!({"a": {"b": {"c": 42}}});
        assert_eq!(lookup_path(&doc, "a.b.c"), Some(&json!(42)));
        assert_eq!(lookup_path(&doc, "a.b"), Some(&json!({"c": 42})));
        assert_eq!(lookup_path(&doc, "a.x.c"), None);
        // Traversing through a scalar resolves nothing.
        assert_eq!(lookup_path(&doc, "a.b.c.d"), None);
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut doc = json!({});
        set_path(&mut doc, "alert.incident.title", json!("DB down"));
        assert_eq!(doc, json!({"alert": {"incident": {"title": "DB down"}}}));

        set_path(&mut doc, "alert.severity", json!("critical"));
        assert_eq!(
            doc,
            json!({"alert": {"incident": {"title": "DB down"}, "severity": "critical"}})
        );
    }

    #[test]
    fn test_set_path_replaces_scalar_intermediate() {
        let mut doc = json!({"alert": "flat"});
        set_path(&mut doc, "alert.title", json!("nested now"));
        assert_eq!(doc, json!({"alert": {"title": "nested now"}}));
    }

    #[test]
    fn test_template_substitution_embedded_token() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.payload_template = Some(json!({"text": "Hello {{data.name}}"}));
        let envelope = envelope_with(json!({"name": "Ann"}));
        // normalize is bypassed here: the envelope carries raw data.
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(payload, json!({"text": "Hello Ann"}));
    }

    #[test]
    fn test_template_unresolved_token_stays_verbatim() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.payload_template = Some(json!({"text": "Hello {{data.missing}}"}));
        let envelope = envelope_with(json!({"name": "Ann"}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(payload, json!({"text": "Hello {{data.missing}}"}));
    }

    #[test]
    fn test_template_token_whitespace_and_envelope_fields() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.payload_template = Some(json!({
            "summary": "{{ event }} for {{organization_id}}"
        }));
        let envelope = envelope_with(json!({}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(
            payload,
            json!({"summary": "incident.created for org-1"})
        );
    }

    #[test]
    fn test_template_renders_non_string_values() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.payload_template = Some(json!({
            "count": "{{data.count}}",
            "flags": "{{data.flags}}",
            "nested": {"deep": ["{{data.ok}}"]}
        }));
        let envelope = envelope_with(json!({"count": 42, "flags": {"paged": true}, "ok": true}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(
            payload,
            json!({
                "count": "42",
                "flags": "{\"paged\":true}",
                "nested": {"deep": ["true"]}
            })
        );
    }

    #[test]
    fn test_template_namespace_overlay_prefers_data() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.payload_template = Some(json!({"tag": "{{event}}", "title": "{{title}}"}));
        let envelope = envelope_with(json!({"event": "shadowed", "title": "DB down"}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(payload, json!({"tag": "shadowed", "title": "DB down"}));
    }

    #[test]
    fn test_field_mapping_builds_fresh_document() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.field_mapping = Some(json!({
            "alert.title": "data.title",
            "alert.source": "event",
            "never": "data.absent"
        }));
        let envelope = envelope_with(json!({"title": "DB down"}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(
            payload,
            json!({"alert": {"title": "DB down", "source": "incident.created"}})
        );
    }

    #[test]
    fn test_template_wins_over_mapping() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.payload_template = Some(json!({"via": "template"}));
        dest.field_mapping = Some(json!({"via": "event"}));
        let envelope = envelope_with(json!({}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(payload, json!({"via": "template"}));
    }

    #[test]
    fn test_no_config_sends_envelope_unchanged() {
        let dest = Destination::webhook("dest-1", "https://example.com/hook");
        let envelope = envelope_with(json!({"title": "DB down"}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(payload["event"], json!("incident.created"));
        assert_eq!(payload["organization_id"], json!("org-1"));
        assert_eq!(payload["destination_id"], json!("dest-1"));
        assert_eq!(payload["data"], json!({"title": "DB down"}));
        assert_eq!(payload["id"], json!(envelope.id));
    }

    #[test]
    fn test_mis_shaped_template_falls_back_to_envelope() {
        let mut dest = Destination::webhook("dest-1", "https://example.com/hook");
        dest.payload_template = Some(json!("not an object"));
        let envelope = envelope_with(json!({}));
        let payload = transform_payload(&dest, &envelope);
        assert_eq!(payload["event"], json!("incident.created"));
    }

    #[test]
    fn test_normalize_incident_projection() {
        let data = json!({
            "id": "inc-9",
            "title": "DB down",
            "severity": "critical",
            "internal_notes": "do not leak"
        });
        let normalized = normalize_event_data("incident.created", &data);
        assert_eq!(
            normalized,
            json!({"incident": {"id": "inc-9", "title": "DB down", "severity": "critical"}})
        );
    }

    #[test]
    fn test_normalize_service_and_alert_shapes() {
        let normalized =
            normalize_event_data("service.down", &json!({"id": "svc-1", "status": "down"}));
        assert_eq!(normalized, json!({"service": {"id": "svc-1", "status": "down"}}));

        let normalized = normalize_event_data(
            "monitoring.alert",
            &json!({"check_id": "chk-1", "response_time": 1200}),
        );
        assert_eq!(
            normalized,
            json!({"alert": {"check_id": "chk-1", "response_time": 1200}})
        );
    }

    #[test]
    fn test_normalize_unknown_tag_passes_through() {
        let data = json!({"anything": ["goes", 1]});
        assert_eq!(normalize_event_data("maintenance.started", &data), data);
    }

    #[test]
    fn test_normalize_keeps_pre_wrapped_data() {
        let data = json!({"incident": {"id": "inc-9", "custom": true}});
        assert_eq!(normalize_event_data("incident.created", &data), data);
    }

    #[test]
    fn test_build_envelope_normalizes_and_stamps() {
        let envelope = build_envelope(
            "incident.resolved",
            "org-1",
            "dest-1",
            &json!({"id": "inc-9", "status": "resolved"}),
        );
        assert_eq!(envelope.event, "incident.resolved");
        assert_eq!(envelope.organization_id, "org-1");
        assert_eq!(envelope.destination_id, "dest-1");
        assert_eq!(
            envelope.data,
            json!({"incident": {"id": "inc-9", "status": "resolved"}})
        );
        assert!(!envelope.id.is_empty());
    }
}
