//! Entity catalogs of both sources and dependency ordering

use super::types::EntitySpec;
use crate::error::{Error, Result};
use crate::types::{CursorKind, Source, SyncMode};
use std::collections::{BTreeMap, BTreeSet};

const CRM_MODIFIED: &[&str] = &["hs_lastmodifieddate", "updatedAt"];
const CRM_ARCHIVED: &[&str] = &["archived"];
const TRACKING_MODIFIED: &[&str] = &["updated_at", "updatedAt", "modifiedAt"];
const TRACKING_ARCHIVED: &[&str] = &["is_archived"];

const fn crm(name: &'static str, resource: &'static str, depends_on: &'static [&'static str]) -> EntitySpec {
    EntitySpec {
        name,
        resource,
        page_size: 100,
        sync_mode: SyncMode::Incremental,
        cursor_kind: CursorKind::Timestamp,
        modified_fields: CRM_MODIFIED,
        archived_fields: CRM_ARCHIVED,
        depends_on,
    }
}

const fn tracking(
    name: &'static str,
    resource: &'static str,
    page_size: u32,
    sync_mode: SyncMode,
    depends_on: &'static [&'static str],
) -> EntitySpec {
    EntitySpec {
        name,
        resource,
        page_size,
        sync_mode,
        cursor_kind: CursorKind::Timestamp,
        modified_fields: TRACKING_MODIFIED,
        archived_fields: TRACKING_ARCHIVED,
        depends_on,
    }
}

/// CRM entity types
pub const CRM_ENTITIES: &[EntitySpec] = &[
    crm("deals", "deals", &[]),
    crm("companies", "companies", &["deals"]),
];

/// Tracking-tool entity types.
///
/// Only the search endpoints that accept `updated_after` are incremental; the
/// small lookup tables are re-pulled in full every run.
pub const TRACKING_ENTITIES: &[EntitySpec] = &[
    tracking("companies", "companies/search", 25, SyncMode::Incremental, &[]),
    tracking("task_statuses", "task-statuses/search", 100, SyncMode::FullRefresh, &[]),
    tracking("task_types", "task-types/search", 100, SyncMode::FullRefresh, &[]),
    tracking("users", "users/search", 50, SyncMode::Incremental, &[]),
    tracking("company_users", "company-users/search", 50, SyncMode::Incremental, &["companies"]),
    tracking("lists", "lists/search", 25, SyncMode::Incremental, &["users"]),
    tracking(
        "tasks",
        "tasks/search",
        20,
        SyncMode::Incremental,
        &["lists", "task_statuses", "task_types", "companies"],
    ),
    tracking("field_groups", "field-groups/search", 100, SyncMode::FullRefresh, &[]),
    tracking("fields", "fields/search", 100, SyncMode::FullRefresh, &["field_groups"]),
    tracking("tags", "tags/search", 50, SyncMode::FullRefresh, &["fields"]),
];

/// Static catalog of a source
pub fn catalog(source: Source) -> &'static [EntitySpec] {
    match source {
        Source::Crm => CRM_ENTITIES,
        Source::Tracking => TRACKING_ENTITIES,
    }
}

/// Group entity types into dependency levels.
///
/// Every entity of level `n` depends only on entities of levels `< n`. Within
/// a level the catalog order is kept. Dependencies outside `entities` are
/// ignored so a subset can run on its own.
pub fn execution_levels(entities: &[EntitySpec]) -> Result<Vec<Vec<EntitySpec>>> {
    let names: BTreeSet<&str> = entities.iter().map(|e| e.name).collect();
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = entities
        .iter()
        .map(|e| {
            let deps = e
                .depends_on
                .iter()
                .copied()
                .filter(|dep| names.contains(dep) && *dep != e.name)
                .collect();
            (e.name, deps)
        })
        .collect();

    let mut levels = Vec::new();
    while !pending.is_empty() {
        let ready: Vec<EntitySpec> = entities
            .iter()
            .filter(|e| pending.get(e.name).is_some_and(BTreeSet::is_empty))
            .copied()
            .collect();

        if ready.is_empty() {
            let stuck: Vec<&str> = pending.keys().copied().collect();
            return Err(Error::config(format!(
                "Dependency cycle between entity types: {}",
                stuck.join(", ")
            )));
        }

        for entity in &ready {
            pending.remove(entity.name);
        }
        for deps in pending.values_mut() {
            for entity in &ready {
                deps.remove(entity.name);
            }
        }
        levels.push(ready);
    }
    Ok(levels)
}

/// Keep only the named entity types, failing on unknown names
pub fn select_entities(
    catalog: &[EntitySpec],
    names: &[String],
    source_name: &str,
) -> Result<Vec<EntitySpec>> {
    if names.is_empty() {
        return Ok(catalog.to_vec());
    }
    for name in names {
        if !catalog.iter().any(|e| e.name == name) {
            return Err(Error::unknown_entity(source_name, name.as_str()));
        }
    }
    Ok(catalog
        .iter()
        .filter(|e| names.iter().any(|n| n == e.name))
        .copied()
        .collect())
}
