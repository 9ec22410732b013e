//! Blackbox tests for the item API.
//!
//! These tests run the full ingest server in-process and talk to it over HTTP.

use std::collections::BTreeSet;

use anyhow::Result;
use ingest_server::endpoints::items::GREETING;
use ingest_service::backend::InMemoryBackend;
use ingest_test::server::{FailingBackend, TEST_FOLDER, TestServer};
use reqwest::StatusCode;
use serde_json::{Value, json};

/// Extracts the filename from an upload confirmation message.
fn uploaded_filename(message: &str) -> &str {
    let rest = message
        .strip_prefix("Data uploaded successfully with filename ")
        .unwrap();
    let (filename, folder) = rest.split_once(" in folder ").unwrap();
    assert_eq!(folder, TEST_FOLDER);
    filename
}

async fn upload(client: &reqwest::Client, server: &TestServer, item: Value) -> Result<String> {
    let response = client
        .post(server.url("/upload"))
        .json(&item)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    let message = body["message"].as_str().unwrap();
    Ok(uploaded_filename(message).to_owned())
}

#[tokio::test]
async fn test_greeting() -> Result<()> {
    ingest_test::tracing::init();
    let server = TestServer::new().await;

    let response = reqwest::get(server.url("/")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, GREETING);

    Ok(())
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let server = TestServer::new().await;

    let response = reqwest::get(server.url("/health")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["server"].to_str()?.starts_with("ingest/"));

    Ok(())
}

#[tokio::test]
async fn test_upload_then_read() -> Result<()> {
    ingest_test::tracing::init();
    let backend = InMemoryBackend::new();
    let server = TestServer::with_backend(Box::new(backend.clone())).await;
    let client = reqwest::Client::new();

    let filename = upload(&client, &server, json!({"name": "temp", "value": "72.5"})).await?;
    assert!(filename.ends_with(".json"));
    let token = filename.trim_end_matches(".json");
    assert!(!token.is_empty());
    assert_eq!(backend.keys(), [format!("{TEST_FOLDER}/{filename}")]);

    let response = client.get(server.url("/read")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let records: Value = response.json().await?;
    assert_eq!(records, json!([{"name": "temp", "value": "72.5"}]));

    Ok(())
}

#[tokio::test]
async fn test_uploads_get_distinct_filenames() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let mut filenames = BTreeSet::new();
    for value in ["1", "2", "3"] {
        let item = json!({"name": "counter", "value": value});
        filenames.insert(upload(&client, &server, item).await?);
    }
    assert_eq!(filenames.len(), 3);

    let records: Vec<Value> = client.get(server.url("/read")).send().await?.json().await?;
    let values: BTreeSet<_> = records
        .iter()
        .map(|record| record["value"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(values, BTreeSet::from(["1".into(), "2".into(), "3".into()]));

    Ok(())
}

#[tokio::test]
async fn test_upload_ignores_unknown_fields() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let item = json!({"name": "temp", "value": "72.5", "unit": "F"});
    upload(&client, &server, item).await?;

    let records: Value = client.get(server.url("/read")).send().await?.json().await?;
    assert_eq!(records, json!([{"name": "temp", "value": "72.5"}]));

    Ok(())
}

#[tokio::test]
async fn test_upload_without_content_type() -> Result<()> {
    let backend = InMemoryBackend::new();
    let server = TestServer::with_backend(Box::new(backend.clone())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/upload"))
        .body(r#"{"name":"temp","value":"72.5"}"#)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    uploaded_filename(body["message"].as_str().unwrap());
    assert_eq!(backend.keys().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_items_are_rejected() -> Result<()> {
    let backend = InMemoryBackend::new();
    let server = TestServer::with_backend(Box::new(backend.clone())).await;
    let client = reqwest::Client::new();

    let invalid = [
        json!({"name": "temp"}),
        json!({"value": "72.5"}),
        json!({"name": "temp", "value": 72.5}),
        json!({"name": "", "value": "72.5"}),
        json!({"name": "temp", "value": ""}),
        json!("temp=72.5"),
    ];

    for item in invalid {
        let response = client
            .post(server.url("/upload"))
            .json(&item)
            .send()
            .await?;
        assert!(response.status().is_client_error(), "accepted {item}");

        let body: Value = response.json().await?;
        assert!(body["detail"].is_string());
    }

    let response = client
        .post(server.url("/upload"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(server.url("/upload"))
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(server.url("/upload"))
        .header("content-type", "text/plain")
        .body(r#"{"name":"temp","value":"72.5"}"#)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert_eq!(backend.calls().total(), 0);
    assert!(backend.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_read_empty_folder() -> Result<()> {
    let server = TestServer::new().await;

    let response = reqwest::get(server.url("/read")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let records: Value = response.json().await?;
    assert_eq!(records, json!([]));

    Ok(())
}

#[tokio::test]
async fn test_read_skips_other_folders_and_files() -> Result<()> {
    let backend = InMemoryBackend::new();
    backend.insert("sensors/a.json", r#"{"name":"a","value":"1"}"#);
    backend.insert("sensors/notes.txt", "not a record");
    backend.insert("other/b.json", r#"{"name":"b","value":"2"}"#);
    let server = TestServer::with_backend(Box::new(backend)).await;

    let records: Value = reqwest::get(server.url("/read")).await?.json().await?;
    assert_eq!(records, json!([{"name": "a", "value": "1"}]));

    Ok(())
}

#[tokio::test]
async fn test_read_fails_on_corrupt_record() -> Result<()> {
    let backend = InMemoryBackend::new();
    backend.insert("sensors/a.json", r#"{"name":"a","value":"1"}"#);
    backend.insert("sensors/b.json", "{truncated");
    let server = TestServer::with_backend(Box::new(backend)).await;

    let response = reqwest::get(server.url("/read")).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert!(body["detail"].as_str().unwrap().contains("sensors/b.json"));

    Ok(())
}

#[tokio::test]
async fn test_storage_failure() -> Result<()> {
    let server = TestServer::with_backend(Box::new(FailingBackend)).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/read")).send().await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert!(body["detail"].as_str().unwrap().contains("storage unavailable"));

    let response = client
        .post(server.url("/upload"))
        .json(&json!({"name": "temp", "value": "72.5"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert!(body["detail"].as_str().unwrap().contains("storage unavailable"));

    // The server keeps serving after storage errors.
    let response = client.get(server.url("/")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, GREETING);

    Ok(())
}
