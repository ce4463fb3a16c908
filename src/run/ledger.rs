//! Run ledger
//!
//! Persists one JSON document per run at
//! `state/{source}/{entity_type}/runs/run={run_id}.json`. The ledger, not the
//! presence of landing objects, decides whether a run succeeded.

use super::types::{RunId, RunRecord, RunStatus};
use crate::error::{Error, Result};
use crate::output::CloudDestination;
use crate::types::Source;
use bytes::Bytes;
use std::collections::BTreeSet;
use tracing::debug;

/// Prefix holding the run documents of one entity type
pub fn runs_prefix(source: Source, entity_type: &str) -> String {
    format!("state/{source}/{entity_type}/runs")
}

/// Key of one run document
pub fn run_record_key(source: Source, entity_type: &str, run_id: &RunId) -> String {
    format!("{}/run={run_id}.json", runs_prefix(source, entity_type))
}

/// Storage-backed run ledger
#[derive(Debug, Clone)]
pub struct RunLedger {
    destination: CloudDestination,
}

impl RunLedger {
    /// Create a ledger on the given destination
    pub fn new(destination: CloudDestination) -> Self {
        Self { destination }
    }

    /// Write (or overwrite) a run document
    pub async fn record(&self, run: &RunRecord) -> Result<()> {
        let key = run_record_key(run.source, &run.entity_type, &run.run_id);
        let body = serde_json::to_vec_pretty(run)
            .map_err(|e| Error::run_ledger(format!("Failed to serialize run: {e}")))?;
        self.destination
            .put(&key, Bytes::from(body))
            .await
            .map_err(|e| Error::run_ledger(format!("Failed to write {key}: {e}")))?;
        debug!(run_id = %run.run_id, entity = %run.entity_type, status = %run.status, "Recorded run");
        Ok(())
    }

    /// Fetch one run document
    pub async fn get(
        &self,
        source: Source,
        entity_type: &str,
        run_id: &RunId,
    ) -> Result<Option<RunRecord>> {
        let key = run_record_key(source, entity_type, run_id);
        match self.destination.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::run_ledger(format!("Failed to parse {key}: {e}"))),
            None => Ok(None),
        }
    }

    /// All runs of an entity type, oldest first
    pub async fn list(&self, source: Source, entity_type: &str) -> Result<Vec<RunRecord>> {
        let keys = self
            .destination
            .list(&runs_prefix(source, entity_type))
            .await?;

        let mut runs = Vec::with_capacity(keys.len());
        for key in keys.iter().filter(|k| k.ends_with(".json")) {
            if let Some(bytes) = self.destination.get(key).await? {
                let run: RunRecord = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::run_ledger(format!("Failed to parse {key}: {e}")))?;
                runs.push(run);
            }
        }
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(runs)
    }

    /// Ids of the runs that reached `success`
    pub async fn successful_runs(
        &self,
        source: Source,
        entity_type: &str,
    ) -> Result<BTreeSet<RunId>> {
        Ok(self
            .list(source, entity_type)
            .await?
            .into_iter()
            .filter(|run| run.status == RunStatus::Succeeded)
            .map(|run| run.run_id)
            .collect())
    }
}
