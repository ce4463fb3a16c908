//! Source client interface and entity descriptors

use crate::error::{Error, Result};
use crate::pagination::{PaginationState, Paginator};
use crate::types::{parse_timestamp, CursorKind, JsonObject, JsonValue, Source, SyncMode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};

// ============================================================================
// Entity Spec
// ============================================================================

/// Declarative description of one entity type of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpec {
    /// Entity type name, used in paths and state keys
    pub name: &'static str,
    /// API resource the entity is read from
    pub resource: &'static str,
    /// Records requested per page
    pub page_size: u32,
    /// Whether the API can filter by modification time
    pub sync_mode: SyncMode,
    /// What the committed watermark holds
    pub cursor_kind: CursorKind,
    /// Fields holding the record's modification time, first present wins
    pub modified_fields: &'static [&'static str],
    /// Soft-delete flags; a record with any of them `true` is archived
    pub archived_fields: &'static [&'static str],
    /// Entity types that must be extracted first
    pub depends_on: &'static [&'static str],
}

impl EntitySpec {
    /// Same entity with another page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn is_incremental(&self) -> bool {
        self.sync_mode == SyncMode::Incremental
    }

    /// Modification time of a record, if it carries one
    pub fn modified_at(&self, record: &JsonValue) -> Option<DateTime<Utc>> {
        self.modified_fields
            .iter()
            .find_map(|field| record.get(*field).and_then(parse_timestamp))
    }
}

// ============================================================================
// Pages
// ============================================================================

/// Raw response of one page request, records already extracted and normalized
#[derive(Debug, Clone)]
pub struct PageResponse {
    /// Full response document, consulted by the paginator
    pub body: JsonValue,
    /// Records of this page
    pub records: Vec<JsonValue>,
}

/// One page yielded by `paginate`
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-based position in the run
    pub index: u32,
    pub records: Vec<JsonValue>,
    /// Continuation token reported by the API, if any
    pub next_cursor: Option<String>,
    /// Whether this is the final page
    pub last: bool,
}

// ============================================================================
// Source Client
// ============================================================================

/// One SaaS API, able to fetch pages of each of its entity types
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Which source this client reads
    fn source(&self) -> Source;

    /// Entity types this client knows, in catalog order
    fn entities(&self) -> Vec<EntitySpec>;

    /// Look up an entity type by name
    fn entity(&self, name: &str) -> Result<EntitySpec> {
        self.entities()
            .into_iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| Error::unknown_entity(self.source().as_str(), name))
    }

    /// Pagination strategy for an entity type
    fn paginator(&self, entity: &EntitySpec) -> Box<dyn Paginator>;

    /// Lower bound used when no watermark exists yet
    fn default_since(&self, now: DateTime<Utc>) -> DateTime<Utc>;

    /// Entity types run concurrently within one dependency level
    fn max_concurrency(&self) -> usize {
        1
    }

    /// Fetch one page. `params` carries the paginator's fields.
    async fn fetch_page(
        &self,
        entity: &EntitySpec,
        since: Option<DateTime<Utc>>,
        params: JsonObject,
    ) -> Result<PageResponse>;
}

/// Lazily page through an entity type.
///
/// Each page is requested only when the previous one has been consumed, so
/// callers can write pages as they arrive. The first error ends the stream.
pub fn paginate<'a>(
    client: &'a dyn SourceClient,
    entity: EntitySpec,
    since: Option<DateTime<Utc>>,
) -> BoxStream<'a, Result<Page>> {
    let paginator = client.paginator(&entity);
    let initial = Some((paginator, PaginationState::new()));

    stream::try_unfold(initial, move |cursor| async move {
        let Some((paginator, mut state)) = cursor else {
            return Ok(None);
        };

        let index = state.page_index;
        let params = paginator.page_params(&state);
        let response = client.fetch_page(&entity, since, params).await?;
        let next = paginator.process_response(&response.body, response.records.len(), &mut state);

        let page = Page {
            index,
            records: response.records,
            next_cursor: state.cursor.clone(),
            last: next.is_done(),
        };
        let remaining = if next.is_done() {
            None
        } else {
            Some((paginator, state))
        };
        Ok(Some((page, remaining)))
    })
    .boxed()
}
