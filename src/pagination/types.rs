//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all strategies.
//! Both source APIs take their paging parameters in the JSON request body,
//! so a paginator produces a body fragment rather than query parameters.

use crate::types::JsonObject;
use serde_json::Value;

/// Result of the next page computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// More pages available; request them with the paginator's next params
    Continue,
    /// No more pages
    Done,
}

impl NextPage {
    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if this is a continue result
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// Stop conditions for pagination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopCondition {
    /// Stop when page is empty (no records)
    EmptyPage,

    /// Stop when a page holds fewer records than requested
    #[default]
    ShortPage,
}

/// Result of checking a stop condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    /// Continue pagination
    Continue,
    /// Stop pagination
    Stop,
}

/// Tracks pagination state during iteration
#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    /// Zero-based index of the page about to be requested
    pub page_index: u32,
    /// Current offset (for offset-based pagination)
    pub offset: u64,
    /// Current cursor value (for cursor-based pagination)
    pub cursor: Option<String>,
    /// Total records fetched so far
    pub total_fetched: u64,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create a new pagination state
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Move on to the next page index
    pub fn next_page(&mut self) {
        self.page_index += 1;
    }

    /// Add offset
    pub fn add_offset(&mut self, amount: u64) {
        self.offset += amount;
    }

    /// Set cursor
    pub fn set_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }

    /// Add to total fetched
    pub fn add_fetched(&mut self, count: u64) {
        self.total_fetched += count;
    }
}

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// Paging fields to merge into the request body for the current state
    fn page_params(&self, state: &PaginationState) -> JsonObject;

    /// Process a response and determine if there's a next page.
    ///
    /// On `Continue` the state has already been advanced.
    fn process_response(
        &self,
        body: &Value,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage;

    /// Number of records requested per page
    fn page_size(&self) -> u32;
}

/// Check a stop condition against a page
pub fn check_stop_condition(
    condition: StopCondition,
    records_count: usize,
    page_size: u32,
) -> StopResult {
    let stop = match condition {
        StopCondition::EmptyPage => records_count == 0,
        StopCondition::ShortPage => records_count == 0 || records_count < page_size as usize,
    };
    if stop {
        StopResult::Stop
    } else {
        StopResult::Continue
    }
}

/// Look up a dot-separated path (`paging.next.after`) in a JSON document
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    path.split('.')
        .filter(|part| !part.is_empty())
        .try_fold(value, |current, part| match current {
            Value::Object(map) => map.get(part),
            _ => None,
        })
}
