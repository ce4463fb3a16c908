//! CLI module
//!
//! Command-line interface for the landing pipeline.
//!
//! # Commands
//!
//! - `extract` - Land new records of a source and advance watermarks
//! - `resolve` - Print the current records of an entity type as NDJSON
//! - `watermarks` - Show the stored watermarks of a source
//! - `runs` - Show the run ledger of an entity type
//! - `entities` - List the entity types of a source

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
