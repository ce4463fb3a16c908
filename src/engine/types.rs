//! Engine types
//!
//! Runner configuration, per-entity outcomes and the state machine tracker.

use crate::error::{Error, Result};
use crate::run::{RunId, RunPhase};
use crate::types::Source;
use serde::Serialize;
use tracing::{debug, info};

/// Configuration for extraction runs
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Largest tolerated share of records without an id (0.0 - 1.0)
    pub max_skip_ratio: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_skip_ratio: 0.05,
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the skip-ratio threshold
    #[must_use]
    pub fn with_max_skip_ratio(mut self, ratio: f64) -> Self {
        self.max_skip_ratio = ratio.clamp(0.0, 1.0);
        self
    }
}

/// Statistics from one entity run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractStats {
    /// Pages received from the API
    pub pages_fetched: u32,
    /// Landing objects written
    pub pages_written: u32,
    /// Records seen in API responses
    pub records_seen: usize,
    /// Records landed
    pub records_written: usize,
    /// Records dropped for lacking an id
    pub records_skipped: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExtractStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&mut self, seen: usize, written: usize) {
        self.pages_fetched += 1;
        self.records_seen += seen;
        self.records_written += written;
        self.records_skipped += seen - written;
    }

    pub fn add_written_page(&mut self) {
        self.pages_written += 1;
    }

    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }

    /// Share of seen records that were skipped
    pub fn skip_ratio(&self) -> f64 {
        if self.records_seen == 0 {
            0.0
        } else {
            self.records_skipped as f64 / self.records_seen as f64
        }
    }
}

/// Final state of one entity type in an invocation
#[derive(Debug, Clone, Serialize)]
pub struct EntityOutcome {
    pub source: Source,
    pub entity_type: String,
    /// `Succeeded` or `Failed`
    pub phase: RunPhase,
    pub stats: ExtractStats,
    /// Watermark cursor after the run
    pub watermark: Option<String>,
    pub error: Option<String>,
}

impl EntityOutcome {
    pub fn is_success(&self) -> bool {
        self.phase == RunPhase::Succeeded
    }
}

/// Outcomes of every entity type of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvocationReport {
    pub source: Source,
    pub run_id: RunId,
    pub outcomes: Vec<EntityOutcome>,
}

impl InvocationReport {
    /// True only if every entity type reached `SUCCEEDED`
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(EntityOutcome::is_success)
    }

    /// Entity types that failed
    pub fn failed(&self) -> Vec<&EntityOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success()).collect()
    }

    /// Process exit code: zero only if nothing failed
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_succeeded())
    }
}

/// Enforces legal phase transitions of one run and logs each of them
#[derive(Debug)]
pub struct RunTracker {
    source: Source,
    entity_type: String,
    run_id: RunId,
    phase: RunPhase,
}

impl RunTracker {
    pub fn new(source: Source, entity_type: impl Into<String>, run_id: RunId) -> Self {
        Self {
            source,
            entity_type: entity_type.into(),
            run_id,
            phase: RunPhase::Pending,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to `next`, rejecting edges the state machine does not have
    pub fn transition(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        let per_page = matches!(
            (self.phase, next),
            (RunPhase::Fetching, RunPhase::Writing) | (RunPhase::Writing, RunPhase::Fetching)
        );
        if per_page {
            debug!(entity = %self.entity_type, "{} -> {}", self.phase, next);
        } else {
            info!(
                source = %self.source,
                entity = %self.entity_type,
                run_id = %self.run_id,
                "{} -> {}",
                self.phase,
                next
            );
        }
        self.phase = next;
        Ok(())
    }

    /// Move to `FAILED` if still possible
    pub fn fail(&mut self) {
        if self.phase.can_transition_to(RunPhase::Failed) {
            self.phase = RunPhase::Failed;
        }
    }
}
