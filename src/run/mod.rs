//! Run tracking module
//!
//! A run is one extraction attempt for one (source, entity type) pair.
//!
//! # Overview
//!
//! - `RunId` - sortable, timestamp-derived run identifier
//! - `RunPhase` - in-process state machine (`PENDING -> FETCHING -> WRITING -> SUCCEEDED | FAILED`)
//! - `RunStatus` - persisted outcome (`in_progress | success | failed`)
//! - `RunLedger` - storage of run documents consulted by the resolver

mod ledger;
mod types;

pub use ledger::{run_record_key, runs_prefix, RunLedger};
pub use types::{RunId, RunPhase, RunRecord, RunStatus, RUN_ID_FORMAT};
