//! Common types used throughout the pipeline
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Source
// ============================================================================

/// The SaaS system a record was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Sales CRM (deals, companies)
    Crm,
    /// Implementation-tracking tool (tasks, lists, users, ...)
    Tracking,
}

impl Source {
    /// Path segment used in landing and state layouts
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Crm => "crm",
            Source::Tracking => "tracking",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crm" | "hubspot" => Ok(Source::Crm),
            "tracking" | "scope" => Ok(Source::Tracking),
            other => Err(crate::Error::invalid_value(
                "source",
                format!("unknown source '{other}' (expected crm or tracking)"),
            )),
        }
    }
}

// ============================================================================
// Sync Mode
// ============================================================================

/// Synchronization mode for an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full refresh - the API has no modification filter, pull everything
    #[default]
    FullRefresh,
    /// Incremental - only fetch records modified since the watermark
    Incremental,
}

// ============================================================================
// Cursor Kind
// ============================================================================

/// What a watermark cursor holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    /// Maximum modification time observed, RFC 3339
    #[default]
    Timestamp,
    /// Opaque continuation token returned by the API
    PageToken,
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

// ============================================================================
// Timestamps
// ============================================================================

/// Parse a source timestamp.
///
/// Accepts RFC 3339 (`2024-01-15T12:34:56.789Z`), bare dates (`2024-01-15`)
/// and epoch milliseconds (as a number or a numeric string, the CRM uses both).
pub fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => parse_timestamp_str(s),
        JsonValue::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// String form of [`parse_timestamp`]
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if s.len() >= 10 && !s.contains('T') && s.as_bytes()[4] == b'-' {
        if let Ok(date) = NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    }
    None
}

/// Format a timestamp the way cursors are persisted and sent to APIs
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Render a record id as a string regardless of its JSON type
pub fn id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
