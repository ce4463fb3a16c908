//! Record normalization for the tracking tool
//!
//! The tracking API names boolean fields with a trailing `?` (`archived?`) and
//! returns some maps keyed by runtime ids. Both are awkward for columnar
//! engines, so records are rewritten before landing.

use crate::types::{JsonObject, JsonValue};

/// Names that become `is_{name}` once their `?` is dropped
pub const BOOLEAN_INDICATORS: &[&str] = &[
    "archived",
    "published",
    "active",
    "enabled",
    "disabled",
    "show_resources",
    "published_for_web",
    "visible",
    "hidden",
    "required",
    "optional",
    "default",
];

/// Fields whose object value is keyed by ids rather than by a fixed schema
pub const DYNAMIC_MAP_FIELDS: &[&str] = &["roles_users"];

/// Target name of a key ending in `?`; other keys are returned unchanged
pub fn normalized_key(key: &str) -> String {
    match key.strip_suffix('?') {
        Some(base) if BOOLEAN_INDICATORS.contains(&base) => format!("is_{base}"),
        Some(base) => base.to_string(),
        None => key.to_string(),
    }
}

/// Recursively rename `?`-suffixed keys in objects and arrays
pub fn rename_question_keys(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(key, inner)| (normalized_key(&key), rename_question_keys(inner)))
                .collect(),
        ),
        JsonValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(rename_question_keys).collect())
        }
        other => other,
    }
}

/// Recursively turn `{"k": v, ...}` under a dynamic field into `[{"key": k, "value": v}]`
pub fn normalize_dynamic_maps(value: JsonValue, fields: &[&str]) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(key, inner)| {
                    let inner = match inner {
                        JsonValue::Object(entries) if fields.contains(&key.as_str()) => {
                            JsonValue::Array(entries.into_iter().map(key_value_pair).collect())
                        }
                        other => normalize_dynamic_maps(other, fields),
                    };
                    (key, inner)
                })
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|item| normalize_dynamic_maps(item, fields))
                .collect(),
        ),
        other => other,
    }
}

fn key_value_pair((key, value): (String, JsonValue)) -> JsonValue {
    let mut pair = JsonObject::new();
    pair.insert("key".to_string(), JsonValue::String(key));
    pair.insert("value".to_string(), value);
    JsonValue::Object(pair)
}

/// Full normalization applied to every tracking-tool record
pub fn normalize_tracking_record(record: JsonValue) -> JsonValue {
    normalize_dynamic_maps(rename_question_keys(record), DYNAMIC_MAP_FIELDS)
}
