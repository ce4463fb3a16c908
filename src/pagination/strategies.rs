//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{
    check_stop_condition, lookup_path, NextPage, PaginationState, Paginator, StopCondition,
    StopResult,
};
use crate::types::JsonObject;
use serde_json::Value;

// ============================================================================
// After-Cursor Pagination
// ============================================================================

/// Opaque "after" cursor pagination (the CRM search API)
///
/// The response carries the next cursor at `paging.next.after`; the next
/// request echoes it back as `{"after": "<cursor>"}`. A missing cursor or a
/// short page ends iteration.
#[derive(Debug, Clone)]
pub struct AfterCursorPaginator {
    /// Body field name for the cursor
    pub cursor_param: String,
    /// Dot path to the next cursor in the response
    pub cursor_path: String,
    /// Body field name for the page size
    pub limit_param: String,
    /// Records per page
    pub limit: u32,
    /// Stop condition
    pub stop_condition: StopCondition,
}

impl AfterCursorPaginator {
    /// Create a paginator with the CRM's field names
    pub fn new(limit: u32) -> Self {
        Self {
            cursor_param: "after".to_string(),
            cursor_path: "paging.next.after".to_string(),
            limit_param: "limit".to_string(),
            limit,
            stop_condition: StopCondition::ShortPage,
        }
    }

    /// Set stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = condition;
        self
    }
}

impl Paginator for AfterCursorPaginator {
    fn page_params(&self, state: &PaginationState) -> JsonObject {
        let mut params = JsonObject::new();
        params.insert(self.limit_param.clone(), Value::from(self.limit));
        if let Some(cursor) = &state.cursor {
            params.insert(self.cursor_param.clone(), Value::String(cursor.clone()));
        }
        params
    }

    fn process_response(
        &self,
        body: &Value,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(records_count as u64);

        if check_stop_condition(self.stop_condition, records_count, self.limit)
            == StopResult::Stop
        {
            state.mark_done();
            return NextPage::Done;
        }

        let cursor = lookup_path(body, &self.cursor_path).and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        match cursor {
            Some(cursor) => {
                state.set_cursor(cursor);
                state.next_page();
                NextPage::Continue
            }
            None => {
                state.mark_done();
                NextPage::Done
            }
        }
    }

    fn page_size(&self) -> u32 {
        self.limit
    }
}

// ============================================================================
// Offset Pagination
// ============================================================================

/// Offset-based pagination (the tracking tool's search endpoints)
///
/// Sends `{"offset": n, "limit": k}` and advances by `k` after every full page.
#[derive(Debug, Clone)]
pub struct OffsetPaginator {
    /// Body field name for offset
    pub offset_param: String,
    /// Body field name for limit
    pub limit_param: String,
    /// Number of records per page
    pub limit: u32,
    /// Stop condition
    pub stop_condition: StopCondition,
}

impl OffsetPaginator {
    /// Create a paginator with the tracking tool's field names
    pub fn new(limit: u32) -> Self {
        Self {
            offset_param: "offset".to_string(),
            limit_param: "limit".to_string(),
            limit,
            stop_condition: StopCondition::ShortPage,
        }
    }

    /// Set stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = condition;
        self
    }
}

impl Paginator for OffsetPaginator {
    fn page_params(&self, state: &PaginationState) -> JsonObject {
        let mut params = JsonObject::new();
        params.insert(self.offset_param.clone(), Value::from(state.offset));
        params.insert(self.limit_param.clone(), Value::from(self.limit));
        params
    }

    fn process_response(
        &self,
        _body: &Value,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(records_count as u64);

        if check_stop_condition(self.stop_condition, records_count, self.limit)
            == StopResult::Stop
        {
            state.mark_done();
            return NextPage::Done;
        }

        state.add_offset(u64::from(self.limit));
        state.next_page();
        NextPage::Continue
    }

    fn page_size(&self) -> u32 {
        self.limit
    }
}
