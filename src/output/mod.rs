//! Output module
//!
//! Handles object storage access and the landing layout.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Storage destinations (S3, GCS, Azure, local, in-memory) with bounded calls
//! - Gzip NDJSON encoding and decoding
//! - Deterministic run-scoped landing paths
//! - Writing landing pages and `_SUCCESS` markers

mod cloud;
mod codec;
mod landing;

pub use cloud::{CloudDestination, DEFAULT_STORAGE_TIMEOUT};
pub use codec::{decode_gz_lines, decode_ndjson_gz, empty_gz, encode_ndjson_gz};
pub use landing::{
    entity_prefix, landing_path, parse_landing_path, run_prefix, LandingKey, LandingWriter,
    LANDING_ROOT, SUCCESS_MARKER,
};

#[cfg(test)]
mod tests;
