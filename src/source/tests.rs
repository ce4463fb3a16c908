//! Tests for source module

use super::*;
use crate::error::Error;
use crate::http::{HttpClient, HttpClientConfig};
use crate::types::{BackoffType, JsonObject, Source, SyncMode};
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use test_case::test_case;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http(base_url: &str) -> HttpClient {
    let config = HttpClientConfig::builder()
        .base_url(base_url)
        .max_retries(1)
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(5),
            Duration::from_millis(5),
        )
        .no_rate_limit()
        .build();
    HttpClient::with_bearer(config, "secret-token").unwrap()
}

fn names(level: &[EntitySpec]) -> Vec<&'static str> {
    level.iter().map(|e| e.name).collect()
}

// ============================================================================
// Normalization Tests
// ============================================================================

#[test_case("archived?" => "is_archived")]
#[test_case("default?" => "is_default")]
#[test_case("show_resources?" => "is_show_resources")]
#[test_case("billable?" => "billable")]
#[test_case("name" => "name")]
#[test_case("why?not" => "why?not" ; "question mark not at the end")]
fn test_normalized_key(key: &str) -> String {
    normalized_key(key)
}

#[test]
fn test_rename_question_keys_recursive() {
    let record = json!({
        "id": 1,
        "archived?": true,
        "fields": [{"required?": false, "options": {"visible?": true, "color?": "red"}}]
    });

    assert_eq!(
        rename_question_keys(record),
        json!({
            "id": 1,
            "is_archived": true,
            "fields": [{"is_required": false, "options": {"is_visible": true, "color": "red"}}]
        })
    );
}

#[test]
fn test_normalize_dynamic_maps() {
    let record = json!({
        "id": "l1",
        "roles_users": {"u1": "owner", "u2": "viewer"},
        "nested": {"roles_users": {"u3": "editor"}},
        "other": {"u9": "kept"}
    });

    let normalized = normalize_dynamic_maps(record, DYNAMIC_MAP_FIELDS);
    assert_eq!(
        normalized["roles_users"],
        json!([{"key": "u1", "value": "owner"}, {"key": "u2", "value": "viewer"}])
    );
    assert_eq!(
        normalized["nested"]["roles_users"],
        json!([{"key": "u3", "value": "editor"}])
    );
    assert_eq!(normalized["other"], json!({"u9": "kept"}));
}

#[test]
fn test_normalize_tracking_record_keeps_cross_source_id() {
    let record = json!({"id": 5, "hubspot_id": "9001", "archived?": false});
    let normalized = normalize_tracking_record(record);
    assert_eq!(normalized["hubspot_id"], json!("9001"));
    assert_eq!(normalized["is_archived"], json!(false));
}

// ============================================================================
// Catalog Tests
// ============================================================================

#[test]
fn test_tracking_catalog_levels() {
    let levels = execution_levels(TRACKING_ENTITIES).unwrap();
    let levels: Vec<Vec<&str>> = levels.iter().map(|l| names(l)).collect();

    assert_eq!(
        levels,
        vec![
            vec!["companies", "task_statuses", "task_types", "users", "field_groups"],
            vec!["company_users", "lists", "fields"],
            vec!["tasks", "tags"],
        ]
    );
}

#[test]
fn test_crm_catalog_levels() {
    let levels = execution_levels(CRM_ENTITIES).unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(names(&levels[0]), vec!["deals"]);
    assert_eq!(names(&levels[1]), vec!["companies"]);
}

#[test]
fn test_levels_ignore_dependencies_outside_selection() {
    let selected =
        select_entities(TRACKING_ENTITIES, &["tasks".to_string()], "tracking").unwrap();
    let levels = execution_levels(&selected).unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(names(&levels[0]), vec!["tasks"]);
}

#[test]
fn test_levels_detect_cycle() {
    let a = EntitySpec {
        depends_on: &["b"],
        ..TRACKING_ENTITIES[0]
    };
    let a = EntitySpec { name: "a", ..a };
    let b = EntitySpec {
        name: "b",
        depends_on: &["a"],
        ..TRACKING_ENTITIES[0]
    };

    let err = execution_levels(&[a, b]).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn test_select_entities_unknown() {
    let err = select_entities(CRM_ENTITIES, &["tickets".to_string()], "crm").unwrap_err();
    assert!(matches!(err, Error::UnknownEntity { .. }));
}

#[test]
fn test_sync_policy_is_explicit() {
    let full_refresh: Vec<&str> = TRACKING_ENTITIES
        .iter()
        .filter(|e| e.sync_mode == SyncMode::FullRefresh)
        .map(|e| e.name)
        .collect();
    assert_eq!(
        full_refresh,
        vec!["task_statuses", "task_types", "field_groups", "fields", "tags"]
    );
}

#[test]
fn test_entity_modified_at_fallbacks() {
    let spec = TRACKING_ENTITIES[0];
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

    assert_eq!(
        spec.modified_at(&json!({"updated_at": "2024-05-01T00:00:00Z"})),
        Some(expected)
    );
    assert_eq!(
        spec.modified_at(&json!({"modifiedAt": "2024-05-01T00:00:00Z"})),
        Some(expected)
    );
    assert_eq!(spec.modified_at(&json!({"name": "x"})), None);
}

// ============================================================================
// Tracking Client Tests
// ============================================================================

#[test]
fn test_extract_records_wrappers() {
    assert_eq!(
        TrackingClient::extract_records(&json!({"data": [{"id": 1}]})).len(),
        1
    );
    assert_eq!(
        TrackingClient::extract_records(&json!({"items": [{"id": 1}, {"id": 2}]})).len(),
        2
    );
    assert_eq!(
        TrackingClient::extract_records(&json!([{"id": 1}])).len(),
        1
    );
    assert!(TrackingClient::extract_records(&json!({"total": 0})).is_empty());
}

#[test]
fn test_tracking_search_body_respects_sync_mode() {
    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut params = JsonObject::new();
    params.insert("offset".into(), json!(0));
    params.insert("limit".into(), json!(25));

    let incremental = TRACKING_ENTITIES[0];
    let body = TrackingClient::search_body(&incremental, Some(since), params.clone());
    assert_eq!(
        body,
        json!({"offset": 0, "limit": 25, "updated_after": "2024-01-01T00:00:00.000Z"})
    );

    let lookup = TRACKING_ENTITIES[1];
    assert_eq!(lookup.sync_mode, SyncMode::FullRefresh);
    let body = TrackingClient::search_body(&lookup, Some(since), params);
    assert_eq!(body, json!({"offset": 0, "limit": 25}));
}

#[test]
fn test_tracking_page_size_override() {
    let settings = TrackingSettings {
        page_size_overrides: HashMap::from([("tasks".to_string(), 200)]),
        ..TrackingSettings::default()
    };
    let client = TrackingClient::new(http("http://localhost"), settings);

    assert_eq!(client.entity("tasks").unwrap().page_size, 200);
    assert_eq!(client.entity("lists").unwrap().page_size, 25);
    assert!(client.entity("deals").is_err());
}

#[tokio::test]
async fn test_tracking_paginates_by_offset() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/task-types/search"))
        .and(header("Authorization", "Bearer secret-token"))
        .and(body_partial_json(json!({"offset": 0, "limit": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"data": [{"id": 1, "archived?": false}, {"id": 2, "archived?": false}]}),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/task-types/search"))
        .and(body_partial_json(json!({"offset": 2, "limit": 2})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": 3, "archived?": true}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let settings = TrackingSettings {
        page_size_overrides: HashMap::from([("task_types".to_string(), 2)]),
        ..TrackingSettings::default()
    };
    let client = TrackingClient::new(http(&server.uri()), settings);
    let spec = client.entity("task_types").unwrap();

    let pages: Vec<Page> = paginate(&client, spec, None).try_collect().await.unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].index, 0);
    assert_eq!(pages[0].records.len(), 2);
    assert!(!pages[0].last);
    assert!(pages[1].last);
    assert_eq!(pages[1].records[0], json!({"id": 3, "is_archived": true}));
}

#[tokio::test]
async fn test_tracking_error_ends_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/users/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = TrackingClient::new(http(&server.uri()), TrackingSettings::default());
    let spec = client.entity("users").unwrap();

    let result: crate::error::Result<Vec<Page>> =
        paginate(&client, spec, None).try_collect().await;
    let err = result.unwrap_err();
    assert!(err.is_retryable());
}

// ============================================================================
// CRM Client Tests
// ============================================================================

#[test]
fn test_crm_flatten() {
    let result = json!({
        "id": "101",
        "properties": {"dealname": "Acme", "amount": "500", "hs_lastmodifieddate": "2024-02-01T10:00:00Z"},
        "archived": false,
        "updatedAt": "2024-02-01T10:00:00.123Z"
    });

    assert_eq!(
        CrmClient::flatten(&result),
        Some(json!({
            "id": "101",
            "dealname": "Acme",
            "amount": "500",
            "hs_lastmodifieddate": "2024-02-01T10:00:00Z",
            "archived": false,
            "updatedAt": "2024-02-01T10:00:00.123Z"
        }))
    );
    assert_eq!(CrmClient::flatten(&json!({"properties": {}})), None);
}

#[test]
fn test_crm_deal_search_body() {
    let reference = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
    let since = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let client = CrmClient::new(http("http://localhost"), CrmSettings::default())
        .with_reference_time(reference);
    let deals = client.entity("deals").unwrap();

    let mut params = JsonObject::new();
    params.insert("limit".into(), json!(100));
    params.insert("after".into(), json!("200"));

    let body = client.search_body(&deals, Some(since), params);
    let filters = &body["filterGroups"][0]["filters"];
    let close_cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    assert_eq!(
        filters[0],
        json!({"propertyName": "hs_lastmodifieddate", "operator": "GTE", "value": since.timestamp_millis().to_string()})
    );
    assert_eq!(
        filters[1],
        json!({"propertyName": "closedate", "operator": "GTE", "value": close_cutoff.timestamp_millis().to_string()})
    );
    assert_eq!(
        filters[2],
        json!({"propertyName": "dealstage", "operator": "EQ", "value": "closedwon"})
    );
    assert_eq!(body["limit"], json!(100));
    assert_eq!(body["after"], json!("200"));
    assert_eq!(body["properties"].as_array().unwrap().len(), DEAL_PROPERTIES.len());
}

#[test]
fn test_crm_company_search_body_without_since() {
    let client = CrmClient::new(http("http://localhost"), CrmSettings::default());
    let companies = client.entity("companies").unwrap();

    let body = client.search_body(&companies, None, JsonObject::new());
    assert!(body.get("filterGroups").is_none());
    assert_eq!(body["properties"], json!(COMPANY_PROPERTIES));
}

#[test]
fn test_crm_default_since_is_lookback_window() {
    let client = CrmClient::new(http("http://localhost"), CrmSettings::default());
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
    assert_eq!(
        client.default_since(now),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_crm_deals_paginate_and_enrich() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .and(body_partial_json(json!({"after": "2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "3", "properties": {"dealname": "C"}, "archived": false}]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": "1", "properties": {"dealname": "A"}, "archived": false},
                {"id": "2", "properties": {"dealname": "B"}, "archived": false}
            ],
            "paging": {"next": {"after": "2"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/crm/v4/objects/deals/1/associations/companies"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"results": [{"toObjectId": 77}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/v4/objects/deals/2/associations/companies"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/v4/objects/deals/3/associations/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let settings = CrmSettings {
        page_size: 2,
        portal_id: Some("42".to_string()),
        ..CrmSettings::default()
    };
    let client = CrmClient::new(http(&server.uri()), settings);
    let spec = client.entity("deals").unwrap();

    let pages: Vec<Page> = paginate(&client, spec, None).try_collect().await.unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].next_cursor.as_deref(), Some("2"));

    let first = &pages[0].records[0];
    assert_eq!(first["company_id"], json!("77"));
    assert_eq!(
        first["deal_url"],
        json!("https://app.hubspot.com/contacts/42/record/0-3/1")
    );
    assert_eq!(
        first["company_url"],
        json!("https://app.hubspot.com/contacts/42/record/0-2/77")
    );

    // Failed lookup degrades to null
    assert_eq!(pages[0].records[1]["company_id"], json!(null));
    assert_eq!(pages[1].records[0]["company_id"], json!(null));
}

#[tokio::test]
async fn test_crm_association_auth_failure_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "1", "properties": {}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/v4/objects/deals/1/associations/companies"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = CrmClient::new(http(&server.uri()), CrmSettings::default());
    let spec = client.entity("deals").unwrap();

    let result: crate::error::Result<Vec<Page>> =
        paginate(&client, spec, None).try_collect().await;
    assert!(result.unwrap_err().is_auth());
}

#[test]
fn test_client_sources() {
    let crm = CrmClient::new(http("http://localhost"), CrmSettings::default());
    let tracking = TrackingClient::new(http("http://localhost"), TrackingSettings::default());
    assert_eq!(crm.source(), Source::Crm);
    assert_eq!(tracking.source(), Source::Tracking);
    assert_eq!(crm.entities().len(), 2);
    assert_eq!(tracking.entities().len(), 10);
}
