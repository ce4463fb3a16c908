//! Tests for output module

use super::*;
use crate::error::Error;
use crate::run::RunId;
use crate::types::Source;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

fn run_id() -> RunId {
    RunId::parse("20240307T140501Z").unwrap()
}

// ============================================================================
// Codec Tests
// ============================================================================

#[test]
fn test_encode_decode_ndjson() {
    let records = vec![json!({"id": "1", "name": "Ada"}), json!({"id": "2", "tags": []})];
    let encoded = encode_ndjson_gz(&records).unwrap();

    let lines = decode_gz_lines(&encoded).unwrap();
    assert_eq!(lines, vec![r#"{"id":"1","name":"Ada"}"#, r#"{"id":"2","tags":[]}"#]);
    assert_eq!(decode_ndjson_gz(&encoded).unwrap(), records);
}

#[test]
fn test_encoding_is_deterministic() {
    let records = vec![json!({"id": 1}), json!({"id": 2})];
    assert_eq!(
        encode_ndjson_gz(&records).unwrap(),
        encode_ndjson_gz(&records).unwrap()
    );
}

#[test]
fn test_empty_gz_decodes_to_nothing() {
    let marker = empty_gz().unwrap();
    assert!(!marker.is_empty());
    assert!(decode_gz_lines(&marker).unwrap().is_empty());
}

#[test]
fn test_decode_rejects_non_gzip() {
    let err = decode_gz_lines(b"{\"id\":1}\n").unwrap_err();
    assert!(matches!(err, Error::Compression { .. }));
}

// ============================================================================
// Landing Path Tests
// ============================================================================

#[test]
fn test_landing_path_layout() {
    assert_eq!(
        landing_path(Source::Crm, "deals", &run_id(), 0),
        "raw/crm/deals/dt=2024-03-07/hr=14/run=20240307T140501Z/part-00000.json.gz"
    );
    assert_eq!(
        landing_path(Source::Tracking, "tasks", &run_id(), 12),
        "raw/tracking/tasks/dt=2024-03-07/hr=14/run=20240307T140501Z/part-00012.json.gz"
    );
}

#[test]
fn test_parse_landing_path() {
    let key = landing_path(Source::Tracking, "lists", &run_id(), 3);
    assert_eq!(
        parse_landing_path(&key),
        Some(LandingKey {
            run_id: run_id(),
            part: 3
        })
    );

    let marker = format!(
        "{}/{SUCCESS_MARKER}",
        run_prefix(Source::Tracking, "lists", &run_id())
    );
    assert_eq!(parse_landing_path(&marker), None);
    assert_eq!(parse_landing_path("raw/crm/deals/notes.txt"), None);
    assert_eq!(
        parse_landing_path("raw/crm/deals/dt=2024-01-01/hr=00/run=bogus/part-00000.json.gz"),
        None
    );
}

// ============================================================================
// CloudDestination Tests
// ============================================================================

#[test]
fn test_parse_local_path() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().to_str().unwrap();
    let dest = CloudDestination::parse(path).unwrap();
    assert_eq!(dest.scheme(), "file");
    assert!(!dest.is_cloud());
}

#[test]
fn test_parse_memory() {
    let dest = CloudDestination::parse("memory://").unwrap();
    assert_eq!(dest.scheme(), "memory");
    assert!(!dest.is_cloud());
}

#[tokio::test]
async fn test_put_get_list_local() {
    let temp_dir = tempdir().unwrap();
    let dest = CloudDestination::parse(temp_dir.path().to_str().unwrap()).unwrap();

    dest.put("a/b/one.json", "1".into()).await.unwrap();
    dest.put("a/two.json", "2".into()).await.unwrap();
    dest.put("c/three.json", "3".into()).await.unwrap();

    assert_eq!(
        dest.get("a/b/one.json").await.unwrap().unwrap(),
        bytes::Bytes::from("1")
    );
    assert!(dest.get("a/missing.json").await.unwrap().is_none());
    assert!(dest.exists("a/two.json").await.unwrap());
    assert!(!dest.exists("a/missing.json").await.unwrap());

    assert_eq!(
        dest.list("a").await.unwrap(),
        vec!["a/b/one.json".to_string(), "a/two.json".to_string()]
    );
    assert!(dest.list("nothing-here").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_keys_are_relative_to_prefix() {
    let store = std::sync::Arc::new(object_store::memory::InMemory::new());
    let dest = CloudDestination::from_store(store, "landing/prod", "memory");

    dest.put("raw/x.json", "x".into()).await.unwrap();
    assert_eq!(dest.list("raw").await.unwrap(), vec!["raw/x.json".to_string()]);
    assert_eq!(dest.display_path("raw/x.json"), "memory://landing/prod/raw/x.json");
}

#[tokio::test]
async fn test_zero_timeout_surfaces_storage_timeout() {
    let dest = CloudDestination::in_memory().with_timeout(Duration::ZERO);
    // A zero budget may still let an in-memory call finish; either outcome is
    // acceptable, but a failure must be the timeout variant.
    if let Err(err) = dest.put("k", "v".into()).await {
        assert!(matches!(err, Error::StorageTimeout { .. }));
        assert!(err.is_retryable());
    }
}

// ============================================================================
// LandingWriter Tests
// ============================================================================

#[tokio::test]
async fn test_writer_round_trip() {
    let writer = LandingWriter::new(CloudDestination::in_memory());
    let records = vec![json!({"id": "1"}), json!({"id": "2"})];

    let key = writer
        .write(Source::Crm, "deals", &run_id(), 0, &records)
        .await
        .unwrap();
    assert_eq!(key, landing_path(Source::Crm, "deals", &run_id(), 0));

    let stored = writer.destination().get(&key).await.unwrap().unwrap();
    assert_eq!(decode_ndjson_gz(&stored).unwrap(), records);
}

#[tokio::test]
async fn test_rewriting_same_page_is_idempotent() {
    let writer = LandingWriter::new(CloudDestination::in_memory());
    let records = vec![json!({"id": "1", "v": 1})];

    writer
        .write(Source::Tracking, "tasks", &run_id(), 0, &records)
        .await
        .unwrap();
    let prefix = entity_prefix(Source::Tracking, "tasks");
    let keys_once = writer.destination().list(&prefix).await.unwrap();
    let key = &keys_once[0];
    let bytes_once = writer.destination().get(key).await.unwrap().unwrap();

    writer
        .write(Source::Tracking, "tasks", &run_id(), 0, &records)
        .await
        .unwrap();
    let keys_twice = writer.destination().list(&prefix).await.unwrap();
    let bytes_twice = writer.destination().get(key).await.unwrap().unwrap();

    assert_eq!(keys_once, keys_twice);
    assert_eq!(bytes_once, bytes_twice);
}

#[tokio::test]
async fn test_success_marker() {
    let writer = LandingWriter::new(CloudDestination::in_memory());
    let key = writer
        .write_success_marker(Source::Crm, "companies", &run_id())
        .await
        .unwrap();

    assert!(key.ends_with("/run=20240307T140501Z/_SUCCESS"));
    let body = writer.destination().get(&key).await.unwrap().unwrap();
    assert!(decode_gz_lines(&body).unwrap().is_empty());
}
