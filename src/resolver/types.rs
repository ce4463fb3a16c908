//! Resolver configuration and results

use crate::error::{Error, Result};
use crate::run::RunId;
use crate::source::EntitySpec;
use crate::types::JsonValue;
use std::fmt;
use std::str::FromStr;

/// How the trusted run is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Highest run id among runs the ledger marks `success`
    #[default]
    LatestSuccessful,
    /// Highest run id present in storage, whatever its status.
    ///
    /// A failed run with a higher id shadows the last good one. Kept for
    /// comparison with readers that still select by path alone.
    LexicographicMax,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionPolicy::LatestSuccessful => "successful",
            SelectionPolicy::LexicographicMax => "lexicographic",
        })
    }
}

impl FromStr for SelectionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "successful" | "latest-successful" => Ok(SelectionPolicy::LatestSuccessful),
            "lexicographic" | "max" => Ok(SelectionPolicy::LexicographicMax),
            other => Err(Error::invalid_value(
                "policy",
                format!("'{other}' (expected successful or lexicographic)"),
            )),
        }
    }
}

/// Which selected runs contribute records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunScope {
    /// Only the single trusted run
    #[default]
    LatestRun,
    /// Every eligible run, deduplicated together (incremental entity types)
    AllRuns,
}

impl fmt::Display for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunScope::LatestRun => "latest",
            RunScope::AllRuns => "all",
        })
    }
}

impl FromStr for RunScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latest" => Ok(RunScope::LatestRun),
            "all" => Ok(RunScope::AllRuns),
            other => Err(Error::invalid_value(
                "scope",
                format!("'{other}' (expected latest or all)"),
            )),
        }
    }
}

/// Resolver settings for one entity type
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub policy: SelectionPolicy,
    pub scope: RunScope,
    /// Unparseable or id-less lines tolerated before failing
    pub max_bad_records: usize,
    /// Soft-delete flags
    pub archived_fields: Vec<String>,
    /// Modification-time fields, first present wins
    pub modified_fields: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            scope: RunScope::default(),
            max_bad_records: 0,
            archived_fields: vec!["archived".into(), "is_archived".into()],
            modified_fields: vec![
                "updated_at".into(),
                "updatedAt".into(),
                "modifiedAt".into(),
                "hs_lastmodifieddate".into(),
            ],
        }
    }
}

impl ResolverConfig {
    /// Field names taken from an entity descriptor
    pub fn for_entity(entity: &EntitySpec) -> Self {
        Self {
            archived_fields: entity.archived_fields.iter().map(|f| f.to_string()).collect(),
            modified_fields: entity.modified_fields.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: RunScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_max_bad_records(mut self, max: usize) -> Self {
        self.max_bad_records = max;
        self
    }
}

/// Output of resolving one entity type
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Runs whose objects were read, ascending
    pub runs: Vec<RunId>,
    /// One record per id, sorted by id, archived records removed
    pub records: Vec<JsonValue>,
    /// Lines that were not JSON objects with an id
    pub bad_records: usize,
    /// Older copies dropped by deduplication
    pub duplicates: usize,
    /// Ids dropped because their latest copy is archived
    pub archived: usize,
}
