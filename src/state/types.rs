//! Watermark types
//!
//! These types are serialized to JSON and persisted between runs.

use crate::types::{format_timestamp, parse_timestamp_str, CursorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last successfully committed cursor of one (source, entity type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Entity type the cursor belongs to
    pub entity_type: String,
    /// Cursor value (RFC 3339 timestamp or opaque token)
    pub cursor: String,
    /// How to interpret `cursor`
    #[serde(default)]
    pub cursor_kind: CursorKind,
    /// When the watermark was written
    pub updated_at: DateTime<Utc>,
}

impl Watermark {
    /// Timestamp watermark at the given instant
    pub fn timestamp(entity_type: impl Into<String>, at: &DateTime<Utc>) -> Self {
        Self {
            entity_type: entity_type.into(),
            cursor: format_timestamp(at),
            cursor_kind: CursorKind::Timestamp,
            updated_at: Utc::now(),
        }
    }

    /// Opaque page-token watermark
    pub fn page_token(entity_type: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            cursor: token.into(),
            cursor_kind: CursorKind::PageToken,
            updated_at: Utc::now(),
        }
    }

    /// The cursor as an instant, for timestamp watermarks
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.cursor_kind {
            CursorKind::Timestamp => parse_timestamp_str(&self.cursor),
            CursorKind::PageToken => None,
        }
    }
}

/// What committing a candidate watermark would do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// No watermark existed yet
    Initial,
    /// Candidate is ahead of the stored cursor
    Forward,
    /// Candidate equals the stored cursor
    Unchanged,
    /// Candidate is behind the stored cursor (clock skew); keep the stored one
    Regressed,
}

impl Advance {
    /// Whether the candidate should be written
    pub fn should_write(&self) -> bool {
        matches!(self, Advance::Initial | Advance::Forward)
    }
}

/// Compare a candidate watermark against the stored one.
///
/// Timestamp cursors are compared as instants. Page tokens carry no order, so
/// any different token counts as forward progress.
pub fn plan_advance(previous: Option<&Watermark>, candidate: &Watermark) -> Advance {
    let Some(previous) = previous else {
        return Advance::Initial;
    };

    if previous.cursor == candidate.cursor {
        return Advance::Unchanged;
    }

    match (previous.as_timestamp(), candidate.as_timestamp()) {
        (Some(prev), Some(next)) if next > prev => Advance::Forward,
        (Some(prev), Some(next)) if next == prev => Advance::Unchanged,
        (Some(_), Some(_)) => Advance::Regressed,
        // Unparseable stored cursor is replaced by a readable one
        (None, Some(_)) => Advance::Forward,
        (Some(_), None) => Advance::Regressed,
        (None, None) => Advance::Forward,
    }
}
