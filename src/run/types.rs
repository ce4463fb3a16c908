//! Run identity, status, and the per-entity run state machine

use crate::error::{Error, Result};
use crate::types::Source;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `strftime` format of a run id (ISO-8601 basic, UTC)
pub const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

// ============================================================================
// Run Id
// ============================================================================

/// Identifier of one invocation, e.g. `20240101T000000Z`.
///
/// The string form sorts lexicographically in time order, which the landing
/// layout and the resolver both rely on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Run id for the current instant
    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    /// Run id for a given instant (sub-second precision is dropped)
    pub fn from_datetime(ts: &DateTime<Utc>) -> Self {
        Self(ts.format(RUN_ID_FORMAT).to_string())
    }

    /// Parse and validate a run id
    pub fn parse(value: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(value, RUN_ID_FORMAT).map_err(|_| Error::InvalidRunId {
            value: value.to_string(),
        })?;
        Ok(Self(value.to_string()))
    }

    /// The run id string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The instant the run id encodes
    pub fn timestamp(&self) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(&self.0, RUN_ID_FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_default()
    }

    /// `dt=` partition value (`YYYY-MM-DD`)
    pub fn date_partition(&self) -> String {
        self.timestamp().format("%Y-%m-%d").to_string()
    }

    /// `hr=` partition value (`HH`)
    pub fn hour_partition(&self) -> String {
        self.timestamp().format("%H").to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RunId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RunId> for String {
    fn from(run_id: RunId) -> Self {
        run_id.0
    }
}

// ============================================================================
// Run Status
// ============================================================================

/// Persisted outcome of a run; readers only trust `Succeeded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Started, not finalized (or the process died mid-run)
    #[serde(rename = "in_progress")]
    Pending,
    /// Every page was written and the watermark committed
    #[serde(rename = "success")]
    Succeeded,
    /// Aborted; its landing objects are orphaned
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Pending => "in_progress",
            RunStatus::Succeeded => "success",
            RunStatus::Failed => "failed",
        })
    }
}

// ============================================================================
// Run Phase (state machine)
// ============================================================================

/// In-process phase of one (source, entity type) extraction.
///
/// ```text
/// PENDING -> FETCHING <-> WRITING
///               |            |
///               +--> SUCCEEDED <--+
///               +--> FAILED   <---+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Pending,
    Fetching,
    Writing,
    Succeeded,
    Failed,
}

impl RunPhase {
    /// Whether `self -> next` is a legal edge
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::{Failed, Fetching, Pending, Succeeded, Writing};
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Writing)
                | (Writing, Fetching)
                | (Fetching | Writing, Succeeded)
                | (Fetching | Writing, Failed)
        )
    }

    /// Terminal phases accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Succeeded | RunPhase::Failed)
    }

    /// Status persisted for this phase
    pub fn status(self) -> RunStatus {
        match self {
            RunPhase::Succeeded => RunStatus::Succeeded,
            RunPhase::Failed => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Pending => "PENDING",
            RunPhase::Fetching => "FETCHING",
            RunPhase::Writing => "WRITING",
            RunPhase::Succeeded => "SUCCEEDED",
            RunPhase::Failed => "FAILED",
        })
    }
}

// ============================================================================
// Run Record
// ============================================================================

/// One run of one (source, entity type), as stored in the run ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub source: Source,
    pub entity_type: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub pages_written: u32,
    #[serde(default)]
    pub records_written: u64,
    #[serde(default)]
    pub records_skipped: u64,
    /// Watermark cursor the run started from
    #[serde(default)]
    pub cursor_before: Option<String>,
    /// Watermark cursor committed by the run
    #[serde(default)]
    pub cursor_after: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunRecord {
    /// A freshly started run
    pub fn started(run_id: RunId, source: Source, entity_type: impl Into<String>) -> Self {
        Self {
            run_id,
            source,
            entity_type: entity_type.into(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Pending,
            pages_written: 0,
            records_written: 0,
            records_skipped: 0,
            cursor_before: None,
            cursor_after: None,
            error: None,
        }
    }

    /// Mark the run finished with the given status
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.error = error;
    }

    /// Whether downstream readers may trust this run
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
