//! Latest-run resolver
//!
//! Read-side counterpart of the landing writer: picks the run to trust for an
//! entity type, unions its parts, and reduces them to one current record per
//! id.
//!
//! # Overview
//!
//! 1. List landing objects and group them by run id
//! 2. Select runs (`SelectionPolicy`, `RunScope`); only runs that landed
//!    objects are eligible, so an empty successful run does not hide data
//! 3. Parse lines, tolerating up to `max_bad_records` broken ones
//! 4. Deduplicate by id keeping the latest modification time
//! 5. Drop ids whose surviving record is archived
//!
//! The archived filter runs after deduplication, so archiving a record hides
//! its older, unarchived copies too.

mod dedup;
mod types;

pub use dedup::{dedup_latest, is_archived, modified_at, Candidate};
pub use types::{Resolution, ResolverConfig, RunScope, SelectionPolicy};

use crate::error::{Error, Result};
use crate::output::{decode_gz_lines, entity_prefix, parse_landing_path, CloudDestination};
use crate::run::{RunId, RunLedger};
use crate::types::{id_string, JsonValue, Source};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Resolves the trusted records of an entity type from storage
#[derive(Debug, Clone)]
pub struct LatestRunResolver {
    destination: CloudDestination,
    ledger: RunLedger,
}

impl LatestRunResolver {
    pub fn new(destination: CloudDestination) -> Self {
        Self {
            ledger: RunLedger::new(destination.clone()),
            destination,
        }
    }

    /// Landing object keys of every run, grouped by run id and ordered by part
    pub async fn runs_with_objects(
        &self,
        source: Source,
        entity_type: &str,
    ) -> Result<BTreeMap<RunId, Vec<(u32, String)>>> {
        let keys = self
            .destination
            .list(&entity_prefix(source, entity_type))
            .await?;

        let mut runs: BTreeMap<RunId, Vec<(u32, String)>> = BTreeMap::new();
        for key in keys {
            if let Some(parsed) = parse_landing_path(&key) {
                runs.entry(parsed.run_id).or_default().push((parsed.part, key));
            }
        }
        for parts in runs.values_mut() {
            parts.sort();
        }
        Ok(runs)
    }

    /// Run ids whose objects should be read, ascending
    pub async fn select_runs(
        &self,
        source: Source,
        entity_type: &str,
        present: &BTreeMap<RunId, Vec<(u32, String)>>,
        config: &ResolverConfig,
    ) -> Result<Vec<RunId>> {
        let eligible: Vec<RunId> = match config.policy {
            SelectionPolicy::LexicographicMax => present.keys().cloned().collect(),
            SelectionPolicy::LatestSuccessful => {
                let successful = self.ledger.successful_runs(source, entity_type).await?;
                let eligible: Vec<RunId> = present
                    .keys()
                    .filter(|run_id| successful.contains(*run_id))
                    .cloned()
                    .collect();
                if let (Some(newest), Some(trusted)) = (present.keys().last(), eligible.last()) {
                    if newest != trusted {
                        warn!(
                            %source,
                            entity = entity_type,
                            skipped = %newest,
                            selected = %trusted,
                            "Newest landed run is not successful, using an older run"
                        );
                    }
                }
                eligible
            }
        };

        Ok(match config.scope {
            RunScope::LatestRun => eligible.last().cloned().into_iter().collect(),
            RunScope::AllRuns => eligible,
        })
    }

    /// Resolve an entity type to its current records
    pub async fn resolve(
        &self,
        source: Source,
        entity_type: &str,
        config: &ResolverConfig,
    ) -> Result<Resolution> {
        let present = self.runs_with_objects(source, entity_type).await?;
        let runs = self.select_runs(source, entity_type, &present, config).await?;

        let mut candidates = Vec::new();
        let mut bad_records = 0usize;
        for run_id in &runs {
            let Some(parts) = present.get(run_id) else {
                continue;
            };
            for (part, key) in parts {
                let Some(bytes) = self.destination.get(key).await? else {
                    continue;
                };
                for (line_no, line) in decode_gz_lines(&bytes)?.into_iter().enumerate() {
                    match parse_line(&line) {
                        Some((id, record)) => candidates.push(Candidate {
                            id,
                            modified_at: modified_at(&record, &config.modified_fields),
                            run_id: run_id.clone(),
                            part: *part,
                            line: line_no,
                            record,
                        }),
                        None => {
                            bad_records += 1;
                            debug!(key = %key, line = line_no, "Unreadable landing record");
                        }
                    }
                }
            }
        }

        if bad_records > config.max_bad_records {
            return Err(Error::BadRecords {
                entity: entity_type.to_string(),
                bad: bad_records,
                allowed: config.max_bad_records,
            });
        }

        let total = candidates.len();
        let latest = dedup_latest(candidates);
        let duplicates = total - latest.len();

        let before_filter = latest.len();
        let records: Vec<JsonValue> = latest
            .into_iter()
            .filter(|c| !is_archived(&c.record, &config.archived_fields))
            .map(|c| c.record)
            .collect();
        let archived = before_filter - records.len();

        info!(
            %source,
            entity = entity_type,
            runs = runs.len(),
            records = records.len(),
            duplicates,
            archived,
            bad_records,
            "Resolved entity"
        );

        Ok(Resolution {
            runs,
            records,
            bad_records,
            duplicates,
            archived,
        })
    }
}

/// A JSON object with a usable id, or `None`
fn parse_line(line: &str) -> Option<(String, JsonValue)> {
    let record: JsonValue = serde_json::from_str(line).ok()?;
    if !record.is_object() {
        return None;
    }
    let id = record.get("id").and_then(id_string)?;
    Some((id, record))
}
