//! State management module
//!
//! Handles watermark tracking between runs.
//! A watermark is read before each run and written only after every page of
//! the run is durably staged.
//!
//! # Overview
//!
//! The state module provides:
//! - `Watermark` - last committed cursor of one entity type
//! - `WatermarkStore` - get/set/clear interface with object-storage and in-memory backends
//! - `plan_advance` - monotonic commit rule (a regressing cursor is a no-op)

mod store;
mod types;

pub use store::{watermark_key, MemoryWatermarkStore, ObjectWatermarkStore, WatermarkStore};
pub use types::{plan_advance, Advance, Watermark};
