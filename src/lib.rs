// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # saas-landing
//!
//! Extraction core of a SaaS-to-object-storage landing pipeline. Records of
//! a CRM and a tracking tool are paged out of their APIs, landed as
//! run-scoped gzip NDJSON, and read back as one current record per id.
//!
//! ## Features
//!
//! - **Incremental extraction**: per-entity watermarks that only move forward
//! - **Run-scoped landing**: `raw/{source}/{entity}/dt=/hr=/run=/part-NNNNN.json.gz`
//! - **Run ledger**: every run's outcome is recorded next to the watermarks
//! - **Latest-run resolution**: trusted-run selection, dedup, archived filter
//! - **Any object store**: S3, GCS, Azure, local filesystem, in-memory
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use saas_landing::config::PipelineConfig;
//! use saas_landing::engine::ExtractionRunner;
//! use saas_landing::output::LandingWriter;
//! use saas_landing::run::{RunId, RunLedger};
//! use saas_landing::state::ObjectWatermarkStore;
//! use saas_landing::Source;
//!
//! let config = PipelineConfig::load(None)?.with_env();
//! let destination = config.destination()?;
//! let client = config.source_client(Source::Tracking)?;
//!
//! let writer = LandingWriter::new(destination.clone());
//! let watermarks = ObjectWatermarkStore::new(destination.clone());
//! let ledger = RunLedger::new(destination);
//!
//! let report = ExtractionRunner::new(client.as_ref(), &writer, &watermarks, &ledger, RunId::now())
//!     .run_all()
//!     .await?;
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ExtractionRunner                          │
//! │  PENDING → FETCHING ⇄ WRITING → SUCCEEDED | FAILED (per entity)  │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌───────────┬───────────┬───────┴──────┬─────────────┬────────────┐
//! │  Source   │   HTTP    │  Pagination  │   Landing   │   State    │
//! ├───────────┼───────────┼──────────────┼─────────────┼────────────┤
//! │ CRM       │ Retry     │ After cursor │ gzip NDJSON │ Watermarks │
//! │ Tracking  │ Rate limit│ Offset       │ _SUCCESS    │ Run ledger │
//! └───────────┴───────────┴──────────────┴─────────────┴────────────┘
//!                                 │
//!                        LatestRunResolver
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// HTTP client with retry and rate limiting
pub mod http;

/// Pagination strategies
pub mod pagination;

/// CRM and tracking-tool sources
pub mod source;

/// Watermark storage
pub mod state;

/// Run ids, phases and the run ledger
pub mod run;

/// Object storage and the landing layout
pub mod output;

/// Extraction runner
pub mod engine;

/// Latest-run resolver
pub mod resolver;

/// Pipeline configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::PipelineConfig;
pub use engine::{ExtractionRunner, InvocationReport};
pub use resolver::LatestRunResolver;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
