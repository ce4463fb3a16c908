//! Integration tests using mock HTTP servers
//!
//! Tests the full flow: source API → extraction runner → landing objects,
//! watermarks and run ledger in object storage → latest-run resolver

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use saas_landing::config::PipelineConfig;
use saas_landing::engine::{ExtractionRunner, InvocationReport};
use saas_landing::output::{decode_ndjson_gz, CloudDestination, LandingWriter, SUCCESS_MARKER};
use saas_landing::resolver::{LatestRunResolver, ResolverConfig, RunScope};
use saas_landing::run::{RunId, RunLedger, RunPhase, RunStatus};
use saas_landing::source::{select_entities, SourceClient};
use saas_landing::state::{ObjectWatermarkStore, WatermarkStore};
use saas_landing::types::Source;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

struct Pipeline {
    config: PipelineConfig,
    destination: CloudDestination,
    writer: LandingWriter,
    watermarks: ObjectWatermarkStore,
    ledger: RunLedger,
}

impl Pipeline {
    fn new(server: &MockServer) -> Self {
        let mut config = PipelineConfig::default();
        config.crm.base_url = server.uri();
        config.tracking.base_url = server.uri();
        config.tracking.page_size_overrides.insert("tasks".into(), 100);
        config.http.requests_per_second = 0;
        config.http.max_retries = 0;

        let destination = CloudDestination::in_memory();
        Self {
            config,
            writer: LandingWriter::new(destination.clone()),
            watermarks: ObjectWatermarkStore::new(destination.clone()),
            ledger: RunLedger::new(destination.clone()),
            destination,
        }
    }

    fn client(&self, source: Source) -> Box<dyn SourceClient> {
        self.config
            .source_client_with_token(source, "test-token")
            .unwrap()
    }

    async fn extract(&self, source: Source, entities: &[&str], run_id: &str) -> InvocationReport {
        let client = self.client(source);
        let names: Vec<String> = entities.iter().map(|e| (*e).to_string()).collect();
        let selected = select_entities(&client.entities(), &names, source.as_str()).unwrap();
        ExtractionRunner::new(
            client.as_ref(),
            &self.writer,
            &self.watermarks,
            &self.ledger,
            RunId::parse(run_id).unwrap(),
        )
        .with_config(self.config.runner_config())
        .run(&selected)
        .await
        .unwrap()
    }

    async fn landed(&self, prefix: &str) -> Vec<String> {
        self.destination
            .list(prefix)
            .await
            .unwrap()
            .into_iter()
            .filter(|k| k.ends_with(".json.gz"))
            .collect()
    }
}

fn task(i: usize) -> Value {
    let updated = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::seconds(i as i64);
    json!({
        "id": i,
        "name": format!("Task {i}"),
        "updated_at": updated.to_rfc3339(),
        "archived?": i % 50 == 0,
        "roles_users": {"owner": [i]},
    })
}

fn tasks_page(offset: usize, count: usize) -> Value {
    json!({ "data": (offset..offset + count).map(task).collect::<Vec<_>>() })
}

async fn mount_tasks_page(server: &MockServer, offset: usize, count: usize) {
    Mock::given(method("POST"))
        .and(path("/v1/tasks/search"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_partial_json(json!({"offset": offset, "limit": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(tasks_page(offset, count)))
        .mount(server)
        .await;
}

// ============================================================================
// Tracking Tool End-to-End
// ============================================================================

#[tokio::test]
async fn test_tracking_extract_three_pages() {
    let server = MockServer::start().await;
    mount_tasks_page(&server, 0, 100).await;
    mount_tasks_page(&server, 100, 100).await;
    mount_tasks_page(&server, 200, 100).await;
    mount_tasks_page(&server, 300, 0).await;

    let pipeline = Pipeline::new(&server);
    let report = pipeline
        .extract(Source::Tracking, &["tasks"], "20240301T060000Z")
        .await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.phase, RunPhase::Succeeded);
    assert_eq!(outcome.stats.records_written, 300);
    assert_eq!(outcome.stats.pages_written, 3);

    let landed = pipeline.landed("raw/tracking/tasks/").await;
    assert_eq!(
        landed,
        vec![
            "raw/tracking/tasks/dt=2024-03-01/hr=06/run=20240301T060000Z/part-00000.json.gz",
            "raw/tracking/tasks/dt=2024-03-01/hr=06/run=20240301T060000Z/part-00001.json.gz",
            "raw/tracking/tasks/dt=2024-03-01/hr=06/run=20240301T060000Z/part-00002.json.gz",
        ]
    );
    assert!(pipeline
        .destination
        .exists(&format!(
            "raw/tracking/tasks/dt=2024-03-01/hr=06/run=20240301T060000Z/{SUCCESS_MARKER}"
        ))
        .await
        .unwrap());

    // Records are normalized before landing
    let bytes = pipeline.destination.get(&landed[0]).await.unwrap().unwrap();
    let first_part = decode_ndjson_gz(&bytes).unwrap();
    assert_eq!(first_part.len(), 100);
    assert_eq!(first_part[0]["is_archived"], json!(true));
    assert!(first_part[0].get("archived?").is_none());
    assert_eq!(first_part[0]["roles_users"], json!([{"key": "owner", "value": [0]}]));

    let watermark = pipeline
        .watermarks
        .get(Source::Tracking, "tasks")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        watermark.as_timestamp(),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 4, 59).unwrap())
    );

    let run = pipeline
        .ledger
        .get(Source::Tracking, "tasks", &RunId::parse("20240301T060000Z").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.records_written, 300);
    assert_eq!(run.pages_written, 3);

    let resolution = LatestRunResolver::new(pipeline.destination.clone())
        .resolve(Source::Tracking, "tasks", &ResolverConfig::default())
        .await
        .unwrap();
    assert_eq!(resolution.records.len(), 294);
    assert_eq!(resolution.archived, 6);
    assert_eq!(resolution.duplicates, 0);
}

#[tokio::test]
async fn test_tracking_incremental_follow_up_run() {
    let server = MockServer::start().await;
    mount_tasks_page(&server, 0, 100).await;
    mount_tasks_page(&server, 100, 20).await;

    let pipeline = Pipeline::new(&server);
    let first = pipeline
        .extract(Source::Tracking, &["tasks"], "20240301T060000Z")
        .await;
    assert_eq!(first.exit_code(), 0);

    // Second run must filter by the stored watermark
    server.reset().await;
    let watermark = pipeline
        .watermarks
        .get(Source::Tracking, "tasks")
        .await
        .unwrap()
        .unwrap();
    let mut updated = task(5);
    updated["name"] = json!("Task 5 renamed");
    updated["updated_at"] = json!("2024-03-02T12:00:00+00:00");
    Mock::given(method("POST"))
        .and(path("/v1/tasks/search"))
        .and(body_partial_json(json!({"offset": 0, "updated_after": watermark.cursor})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [updated]})))
        .expect(1)
        .mount(&server)
        .await;

    let second = pipeline
        .extract(Source::Tracking, &["tasks"], "20240302T060000Z")
        .await;
    assert_eq!(second.exit_code(), 0);

    let advanced = pipeline
        .watermarks
        .get(Source::Tracking, "tasks")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        advanced.as_timestamp(),
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap())
    );

    let resolver = LatestRunResolver::new(pipeline.destination.clone());
    let latest = resolver
        .resolve(Source::Tracking, "tasks", &ResolverConfig::default())
        .await
        .unwrap();
    assert_eq!(latest.records.len(), 1);

    let all = resolver
        .resolve(
            Source::Tracking,
            "tasks",
            &ResolverConfig::default().with_scope(RunScope::AllRuns),
        )
        .await
        .unwrap();
    // 120 ids, minus ids 0, 50, 100 which are archived
    assert_eq!(all.records.len(), 117);
    assert_eq!(all.duplicates, 1);
    let renamed = all.records.iter().find(|r| r["id"] == json!(5)).unwrap();
    assert_eq!(renamed["name"], "Task 5 renamed");
}

#[tokio::test]
async fn test_failed_run_keeps_previous_data_visible() {
    let server = MockServer::start().await;
    mount_tasks_page(&server, 0, 100).await;
    mount_tasks_page(&server, 100, 10).await;

    let pipeline = Pipeline::new(&server);
    pipeline
        .extract(Source::Tracking, &["tasks"], "20240301T060000Z")
        .await;
    let before = pipeline
        .watermarks
        .get(Source::Tracking, "tasks")
        .await
        .unwrap();

    // Next run lands one page, then the API fails
    server.reset().await;
    mount_tasks_page(&server, 0, 100).await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/search"))
        .and(body_partial_json(json!({"offset": 100})))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let report = pipeline
        .extract(Source::Tracking, &["tasks"], "20240302T060000Z")
        .await;
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.outcomes[0].phase, RunPhase::Failed);
    assert!(report.outcomes[0].error.is_some());

    let after = pipeline
        .watermarks
        .get(Source::Tracking, "tasks")
        .await
        .unwrap();
    assert_eq!(after, before);

    let failed_run = pipeline
        .ledger
        .get(Source::Tracking, "tasks", &RunId::parse("20240302T060000Z").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed_run.status, RunStatus::Failed);
    assert!(!pipeline
        .destination
        .exists("raw/tracking/tasks/dt=2024-03-02/hr=06/run=20240302T060000Z/_SUCCESS")
        .await
        .unwrap());

    // The partial page of the failed run is landed but never trusted
    let partial = pipeline
        .landed("raw/tracking/tasks/dt=2024-03-02/")
        .await;
    assert_eq!(partial.len(), 1);

    let resolution = LatestRunResolver::new(pipeline.destination.clone())
        .resolve(Source::Tracking, "tasks", &ResolverConfig::default())
        .await
        .unwrap();
    assert_eq!(
        resolution.runs,
        vec![RunId::parse("20240301T060000Z").unwrap()]
    );
    assert_eq!(resolution.records.len(), 110 - 3);
}

#[tokio::test]
async fn test_rejected_credentials_fail_the_entity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/users/search"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(&server);
    let report = pipeline
        .extract(Source::Tracking, &["users"], "20240301T060000Z")
        .await;

    assert_eq!(report.exit_code(), 1);
    assert!(report.outcomes[0].error.as_deref().unwrap().contains("Authentication"));
    assert!(pipeline
        .watermarks
        .get(Source::Tracking, "users")
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// CRM End-to-End
// ============================================================================

fn deal(id: u32, modified: &str) -> Value {
    json!({
        "id": id.to_string(),
        "properties": {
            "dealname": format!("Deal {id}"),
            "amount": "1000",
            "dealstage": "closedwon",
            "closedate": "2024-02-01T00:00:00.000Z",
            "hs_lastmodifieddate": modified,
        },
        "archived": false,
    })
}

#[tokio::test]
async fn test_crm_deals_with_associations() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .and(body_partial_json(json!({"limit": 2})))
        .and(body_partial_json(json!({
            "sorts": [{"propertyName": "hs_lastmodifieddate", "direction": "ASCENDING"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                deal(1, "2024-03-01T10:00:00.000Z"),
                deal(2, "2024-03-01T11:00:00.000Z"),
            ],
            "paging": {"next": {"after": "2"}},
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .and(body_partial_json(json!({"after": "2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [deal(3, "2024-03-01T12:30:00.000Z")],
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    for (deal_id, company) in [(1, Some(901)), (2, None)] {
        let results = company
            .map(|c| json!([{"toObjectId": c}]))
            .unwrap_or_else(|| json!([]));
        Mock::given(method("GET"))
            .and(path(format!(
                "/crm/v4/objects/deals/{deal_id}/associations/companies"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": results})))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/crm/v4/objects/deals/3/associations/companies"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut pipeline = Pipeline::new(&server);
    pipeline.config.crm.page_size = 2;
    pipeline.config.crm.portal_id = Some("4242".into());
    let report = pipeline
        .extract(Source::Crm, &["deals"], "20240301T130000Z")
        .await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.outcomes[0].stats.records_written, 3);

    let resolution = LatestRunResolver::new(pipeline.destination.clone())
        .resolve(Source::Crm, "deals", &ResolverConfig::default())
        .await
        .unwrap();
    let by_id = |id: &str| {
        resolution
            .records
            .iter()
            .find(|r| r["id"] == json!(id))
            .cloned()
            .unwrap()
    };
    assert_eq!(by_id("1")["company_id"], json!("901"));
    assert_eq!(
        by_id("1")["deal_url"],
        json!("https://app.hubspot.com/contacts/4242/record/0-3/1")
    );
    assert_eq!(by_id("2")["company_id"], Value::Null);
    assert_eq!(by_id("3")["company_id"], Value::Null);
    assert_eq!(by_id("3")["dealname"], json!("Deal 3"));

    let watermark = pipeline
        .watermarks
        .get(Source::Crm, "deals")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        watermark.as_timestamp(),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap())
    );
}
