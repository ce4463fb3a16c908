//! Source module
//!
//! One `SourceClient` per SaaS API. Entity types are declared in static
//! catalogs and driven by a single generic `paginate` stream.
//!
//! # Overview
//!
//! - `EntitySpec` - entity type name, resource, page size, sync mode, dependencies
//! - `CrmClient` - deals and companies via the CRM search endpoints
//! - `TrackingClient` - ten tracking-tool entity types via offset search
//! - `execution_levels` - dependency-ordered batches of entity types

mod catalog;
mod crm;
mod normalize;
mod tracking;
mod types;

pub use catalog::{catalog, execution_levels, select_entities, CRM_ENTITIES, TRACKING_ENTITIES};
pub use crm::{CrmClient, CrmSettings, COMPANY_PROPERTIES, DEAL_PROPERTIES};
pub use normalize::{
    normalize_dynamic_maps, normalize_tracking_record, normalized_key, rename_question_keys,
    BOOLEAN_INDICATORS, DYNAMIC_MAP_FIELDS,
};
pub use tracking::{TrackingClient, TrackingSettings};
pub use types::{paginate, EntitySpec, Page, PageResponse, SourceClient};

#[cfg(test)]
mod tests;
