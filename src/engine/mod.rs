//! Execution engine module
//!
//! Drives one source client end-to-end for each of its entity types.
//!
//! # Overview
//!
//! The engine module provides:
//! - `ExtractionRunner` - per-entity state machine: read watermark, stream
//!   pages into landing objects, commit watermark, finalize the run
//! - `RunnerConfig` - skip-ratio threshold for records without an id
//! - `InvocationReport` - outcomes of every entity type, and the exit code
//!
//! A failed entity type never aborts its siblings. Dependency levels run in
//! order; entity types within a level run with bounded parallelism.

mod types;

pub use types::{EntityOutcome, ExtractStats, InvocationReport, RunTracker, RunnerConfig};

use crate::error::{Error, Result};
use crate::output::LandingWriter;
use crate::run::{RunId, RunLedger, RunPhase, RunRecord, RunStatus};
use crate::source::{execution_levels, paginate, EntitySpec, SourceClient};
use crate::state::{plan_advance, Advance, Watermark, WatermarkStore};
use crate::types::{id_string, CursorKind, JsonValue};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs extractions for one source under one run id
pub struct ExtractionRunner<'a> {
    client: &'a dyn SourceClient,
    writer: &'a LandingWriter,
    watermarks: &'a dyn WatermarkStore,
    ledger: &'a RunLedger,
    run_id: RunId,
    config: RunnerConfig,
}

/// Result of streaming every page of one entity type
struct Extracted {
    max_modified: Option<DateTime<Utc>>,
    last_token: Option<String>,
}

impl<'a> ExtractionRunner<'a> {
    pub fn new(
        client: &'a dyn SourceClient,
        writer: &'a LandingWriter,
        watermarks: &'a dyn WatermarkStore,
        ledger: &'a RunLedger,
        run_id: RunId,
    ) -> Self {
        Self {
            client,
            writer,
            watermarks,
            ledger,
            run_id,
            config: RunnerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Run every entity type the client knows
    pub async fn run_all(&self) -> Result<InvocationReport> {
        self.run(&self.client.entities()).await
    }

    /// Run the given entity types in dependency order.
    ///
    /// Only a dependency cycle is an error here; entity failures are reported
    /// in the returned outcomes.
    pub async fn run(&self, entities: &[EntitySpec]) -> Result<InvocationReport> {
        let levels = execution_levels(entities)?;
        let concurrency = self.client.max_concurrency().max(1);
        let source = self.client.source();

        info!(
            %source,
            run_id = %self.run_id,
            entities = entities.len(),
            levels = levels.len(),
            concurrency,
            "Starting extraction"
        );

        let mut outcomes = Vec::with_capacity(entities.len());
        for level in levels {
            let mut level_outcomes: Vec<EntityOutcome> = stream::iter(level)
                .map(|entity| self.run_entity(entity))
                .buffered(concurrency)
                .collect()
                .await;
            outcomes.append(&mut level_outcomes);
        }

        let report = InvocationReport {
            source,
            run_id: self.run_id.clone(),
            outcomes,
        };
        info!(
            %source,
            run_id = %self.run_id,
            succeeded = report.outcomes.len() - report.failed().len(),
            failed = report.failed().len(),
            "Extraction finished"
        );
        Ok(report)
    }

    /// Run one entity type to `SUCCEEDED` or `FAILED`
    pub async fn run_entity(&self, entity: EntitySpec) -> EntityOutcome {
        let started = Instant::now();
        let source = self.client.source();
        let mut tracker = RunTracker::new(source, entity.name, self.run_id.clone());
        let mut run = RunRecord::started(self.run_id.clone(), source, entity.name);
        let mut stats = ExtractStats::new();

        let result = self
            .execute(&entity, &mut tracker, &mut run, &mut stats)
            .await;
        stats.set_duration(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        match result {
            Ok(watermark) => {
                info!(
                    %source,
                    entity = entity.name,
                    run_id = %self.run_id,
                    pages = stats.pages_written,
                    records = stats.records_written,
                    skipped = stats.records_skipped,
                    duration_ms = stats.duration_ms,
                    "Entity succeeded"
                );
                EntityOutcome {
                    source,
                    entity_type: entity.name.to_string(),
                    phase: tracker.phase(),
                    stats,
                    watermark,
                    error: None,
                }
            }
            Err(e) => {
                tracker.fail();
                error!(%source, entity = entity.name, run_id = %self.run_id, error = %e, "Entity failed");

                run.pages_written = stats.pages_written;
                run.records_written = stats.records_written as u64;
                run.records_skipped = stats.records_skipped as u64;
                run.finish(RunStatus::Failed, Some(e.to_string()));
                if let Err(ledger_err) = self.ledger.record(&run).await {
                    warn!(entity = entity.name, error = %ledger_err, "Could not record failed run");
                }

                EntityOutcome {
                    source,
                    entity_type: entity.name.to_string(),
                    phase: tracker.phase(),
                    stats,
                    watermark: run.cursor_after.clone().or_else(|| run.cursor_before.clone()),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// The state machine body. Returns the watermark cursor in force afterwards.
    async fn execute(
        &self,
        entity: &EntitySpec,
        tracker: &mut RunTracker,
        run: &mut RunRecord,
        stats: &mut ExtractStats,
    ) -> Result<Option<String>> {
        let source = self.client.source();

        // PENDING -> FETCHING
        tracker.transition(RunPhase::Fetching)?;
        let previous = self.watermarks.get(source, entity.name).await?;
        run.cursor_before = previous.as_ref().map(|w| w.cursor.clone());
        self.ledger.record(run).await?;

        let since = self.since(entity, previous.as_ref());
        info!(
            %source,
            entity = entity.name,
            since = ?since,
            watermark = ?run.cursor_before,
            "Fetching"
        );

        let extracted = self.stream_pages(entity, since, tracker, stats).await?;

        if stats.skip_ratio() > self.config.max_skip_ratio {
            return Err(Error::DataShape {
                entity: entity.name.to_string(),
                skipped: stats.records_skipped,
                seen: stats.records_seen,
                threshold: self.config.max_skip_ratio,
            });
        }
        if stats.records_skipped > 0 {
            warn!(
                entity = entity.name,
                skipped = stats.records_skipped,
                seen = stats.records_seen,
                "Skipped records without an id"
            );
        }

        // Every page is staged; commit the watermark
        let candidate = match entity.cursor_kind {
            CursorKind::Timestamp => extracted
                .max_modified
                .map(|ts| Watermark::timestamp(entity.name, &ts)),
            CursorKind::PageToken => extracted
                .last_token
                .map(|token| Watermark::page_token(entity.name, token)),
        };
        let committed = self
            .commit_watermark(entity, previous.as_ref(), candidate)
            .await?;

        run.pages_written = stats.pages_written;
        run.records_written = stats.records_written as u64;
        run.records_skipped = stats.records_skipped as u64;
        run.cursor_after = committed.as_ref().map(|w| w.cursor.clone());
        run.finish(RunStatus::Succeeded, None);
        if let Err(e) = self.ledger.record(run).await {
            run.cursor_after = run.cursor_before.clone();
            if let Err(restore) = self
                .restore_watermark(entity, previous.as_ref(), committed.as_ref())
                .await
            {
                run.cursor_after = committed.map(|w| w.cursor);
                return Err(Error::state(format!(
                    "{e}; watermark left advanced to {}: {restore}",
                    run.cursor_after.as_deref().unwrap_or("none")
                )));
            }
            return Err(e);
        }

        if stats.pages_written > 0 {
            if let Err(e) = self
                .writer
                .write_success_marker(source, entity.name, &self.run_id)
                .await
            {
                warn!(entity = entity.name, error = %e, "Could not write _SUCCESS marker");
            }
        }

        tracker.transition(RunPhase::Succeeded)?;
        Ok(run.cursor_after.clone())
    }

    /// Lower bound of the modification-time filter
    fn since(&self, entity: &EntitySpec, previous: Option<&Watermark>) -> Option<DateTime<Utc>> {
        if !entity.is_incremental() {
            return None;
        }
        previous
            .and_then(Watermark::as_timestamp)
            .or_else(|| Some(self.client.default_since(Utc::now())))
    }

    /// FETCHING <-> WRITING, one landing object per non-empty page
    async fn stream_pages(
        &self,
        entity: &EntitySpec,
        since: Option<DateTime<Utc>>,
        tracker: &mut RunTracker,
        stats: &mut ExtractStats,
    ) -> Result<Extracted> {
        let source = self.client.source();
        let mut pages = paginate(self.client, *entity, since);
        let mut max_modified: Option<DateTime<Utc>> = None;
        let mut last_token = None;

        while let Some(page) = pages.try_next().await? {
            let seen = page.records.len();
            let records: Vec<JsonValue> = page
                .records
                .into_iter()
                .filter(|record| record.get("id").and_then(id_string).is_some())
                .collect();

            for record in &records {
                if let Some(ts) = entity.modified_at(record) {
                    max_modified = Some(max_modified.map_or(ts, |current| current.max(ts)));
                }
            }
            if page.next_cursor.is_some() {
                last_token = page.next_cursor;
            }
            stats.add_page(seen, records.len());

            if records.is_empty() {
                continue;
            }

            tracker.transition(RunPhase::Writing)?;
            self.writer
                .write(source, entity.name, &self.run_id, stats.pages_written, &records)
                .await?;
            stats.add_written_page();
            tracker.transition(RunPhase::Fetching)?;
        }

        Ok(Extracted {
            max_modified,
            last_token,
        })
    }

    /// Write the candidate watermark if it moves forward.
    ///
    /// Returns the watermark in force after the call.
    async fn commit_watermark(
        &self,
        entity: &EntitySpec,
        previous: Option<&Watermark>,
        candidate: Option<Watermark>,
    ) -> Result<Option<Watermark>> {
        let Some(candidate) = candidate else {
            return Ok(previous.cloned());
        };

        match plan_advance(previous, &candidate) {
            advance if advance.should_write() => {
                self.watermarks
                    .set(self.client.source(), &candidate)
                    .await?;
                info!(entity = entity.name, cursor = %candidate.cursor, "Watermark advanced");
                Ok(Some(candidate))
            }
            Advance::Regressed => {
                warn!(
                    entity = entity.name,
                    stored = ?previous.map(|w| &w.cursor),
                    observed = %candidate.cursor,
                    "Observed cursor is behind the stored watermark, keeping it"
                );
                Ok(previous.cloned())
            }
            _ => Ok(previous.cloned()),
        }
    }

    /// Put back the watermark in force before a run that could not be marked successful
    async fn restore_watermark(
        &self,
        entity: &EntitySpec,
        previous: Option<&Watermark>,
        committed: Option<&Watermark>,
    ) -> Result<()> {
        if committed == previous {
            return Ok(());
        }
        let source = self.client.source();
        match previous {
            Some(previous) => self.watermarks.set(source, previous).await?,
            None => self.watermarks.clear(source, entity.name).await?,
        }
        warn!(
            entity = entity.name,
            restored = ?previous.map(|w| &w.cursor),
            "Watermark rolled back"
        );
        Ok(())
    }
}
