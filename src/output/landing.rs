//! Landing layout and writer
//!
//! Layout:
//! `raw/{source}/{entity_type}/dt={YYYY-MM-DD}/hr={HH}/run={run_id}/part-{00000}.json.gz`
//!
//! Every component of the path is derived from the run metadata, so writing
//! the same `(run_id, part)` twice overwrites the same object.

use super::cloud::CloudDestination;
use super::codec::{empty_gz, encode_ndjson_gz};
use crate::error::Result;
use crate::run::RunId;
use crate::types::{JsonValue, Source};
use tracing::debug;

/// Root of all landing objects
pub const LANDING_ROOT: &str = "raw";

/// Name of the empty object written once a run succeeds
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Prefix holding every run of one entity type
pub fn entity_prefix(source: Source, entity_type: &str) -> String {
    format!("{LANDING_ROOT}/{source}/{entity_type}")
}

/// Directory of one run
pub fn run_prefix(source: Source, entity_type: &str, run_id: &RunId) -> String {
    format!(
        "{}/dt={}/hr={}/run={run_id}",
        entity_prefix(source, entity_type),
        run_id.date_partition(),
        run_id.hour_partition(),
    )
}

/// Key of one landing object
pub fn landing_path(source: Source, entity_type: &str, run_id: &RunId, part: u32) -> String {
    format!(
        "{}/part-{part:05}.json.gz",
        run_prefix(source, entity_type, run_id)
    )
}

/// A landing object key broken into its run metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingKey {
    pub run_id: RunId,
    pub part: u32,
}

/// Parse a key below an entity prefix into `(run_id, part)`.
///
/// Returns `None` for keys that are not data parts (markers, foreign files).
pub fn parse_landing_path(key: &str) -> Option<LandingKey> {
    let mut run_id = None;
    let mut part = None;
    for segment in key.split('/') {
        if let Some(value) = segment.strip_prefix("run=") {
            run_id = RunId::parse(value).ok();
        } else if let Some(rest) = segment.strip_prefix("part-") {
            part = rest
                .strip_suffix(".json.gz")
                .and_then(|digits| digits.parse::<u32>().ok());
        }
    }
    Some(LandingKey {
        run_id: run_id?,
        part: part?,
    })
}

/// Writes pages of records as gzip NDJSON landing objects
#[derive(Debug, Clone)]
pub struct LandingWriter {
    destination: CloudDestination,
}

impl LandingWriter {
    /// Create a writer on the given destination
    pub fn new(destination: CloudDestination) -> Self {
        Self { destination }
    }

    /// The underlying destination
    pub fn destination(&self) -> &CloudDestination {
        &self.destination
    }

    /// Serialize, compress and store one page. Returns the written key.
    pub async fn write(
        &self,
        source: Source,
        entity_type: &str,
        run_id: &RunId,
        part: u32,
        records: &[JsonValue],
    ) -> Result<String> {
        let key = landing_path(source, entity_type, run_id, part);
        let body = encode_ndjson_gz(records)?;
        let bytes = body.len();
        self.destination.put(&key, body).await?;
        debug!(
            %source,
            entity = entity_type,
            %run_id,
            part,
            records = records.len(),
            bytes,
            "Wrote landing object"
        );
        Ok(key)
    }

    /// Write the `_SUCCESS` marker of a run
    pub async fn write_success_marker(
        &self,
        source: Source,
        entity_type: &str,
        run_id: &RunId,
    ) -> Result<String> {
        let key = format!(
            "{}/{SUCCESS_MARKER}",
            run_prefix(source, entity_type, run_id)
        );
        self.destination.put(&key, empty_gz()?).await?;
        Ok(key)
    }
}
