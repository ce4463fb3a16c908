//! Pagination module
//!
//! Supports: opaque after-cursor (CRM) and offset/limit (tracking tool)
//!
//! # Overview
//!
//! The pagination module provides a unified interface for the two API
//! pagination patterns. Each strategy computes the paging fields for the next
//! request body and decides when iteration is complete.

mod strategies;
mod types;

pub use strategies::{AfterCursorPaginator, OffsetPaginator};
pub use types::{
    check_stop_condition, lookup_path, NextPage, PaginationState, Paginator, StopCondition,
    StopResult,
};
