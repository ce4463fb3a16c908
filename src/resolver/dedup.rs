//! Deterministic deduplication of landed records

use crate::run::RunId;
use crate::types::{parse_timestamp, JsonValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One parsed landing record together with where it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub run_id: RunId,
    pub part: u32,
    /// Zero-based line within the part
    pub line: usize,
    pub record: JsonValue,
}

impl Candidate {
    /// Ordering key: newer modification time wins; a record without one
    /// loses to any record that has one. Remaining ties go to the later run,
    /// then the later part, then the later line.
    fn rank(&self) -> (Option<DateTime<Utc>>, &RunId, u32, usize) {
        (self.modified_at, &self.run_id, self.part, self.line)
    }
}

/// First parseable modification time among `fields`
pub fn modified_at(record: &JsonValue, fields: &[String]) -> Option<DateTime<Utc>> {
    fields
        .iter()
        .find_map(|field| record.get(field.as_str()).and_then(parse_timestamp))
}

/// Whether any soft-delete flag of the record is set
pub fn is_archived(record: &JsonValue, fields: &[String]) -> bool {
    fields.iter().any(|field| match record.get(field.as_str()) {
        Some(JsonValue::Bool(flag)) => *flag,
        Some(JsonValue::String(text)) => text.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Keep exactly one candidate per id, the highest ranked. Output is sorted by id.
pub fn dedup_latest(candidates: impl IntoIterator<Item = Candidate>) -> Vec<Candidate> {
    let mut latest: BTreeMap<String, Candidate> = BTreeMap::new();
    for candidate in candidates {
        match latest.get(&candidate.id) {
            Some(current) if current.rank() >= candidate.rank() => {}
            _ => {
                latest.insert(candidate.id.clone(), candidate);
            }
        }
    }
    latest.into_values().collect()
}
