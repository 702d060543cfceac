//! Query log fetching from a mock AdGuard Home and from saved files.

mod common;

use adscanner::extractor::extract_candidates;
use adscanner::log_source::{AdGuardLogSource, LogSource, StaticLogSource};
use common::fixtures::{default_config, fixture_path, load_fixture};
use common::wiremock_helpers::{mock_error_server, mock_querylog_server};

/// Basic auth header for the default admin/changeme credentials
const DEFAULT_AUTH: &str = "Basic YWRtaW46Y2hhbmdlbWU=";

fn querylog_body() -> serde_json::Value {
    serde_json::from_str(&load_fixture("querylog.json")).unwrap()
}

#[tokio::test]
async fn test_fetch_with_credentials() {
    let server = mock_querylog_server(DEFAULT_AUTH, 1000, querylog_body()).await;
    let mut config = default_config();
    config.log_source.url = format!("{}/control/querylog", server.uri());

    let source = AdGuardLogSource::new(&config.log_source).unwrap();
    let records = source.fetch().await.unwrap();

    assert_eq!(records.len(), 9);
    assert_eq!(records[0].domain_name(), "analysis.xunlei-cdn.qq.com");
    assert_eq!(extract_candidates(&records).len(), 6);
}

#[tokio::test]
async fn test_wrong_credentials_fail() {
    let server = mock_querylog_server(DEFAULT_AUTH, 1000, querylog_body()).await;
    let mut config = default_config();
    config.log_source.url = format!("{}/control/querylog", server.uri());
    config.log_source.password = "wrong".to_string();

    let source = AdGuardLogSource::new(&config.log_source).unwrap();
    let err = source.fetch().await.unwrap_err();
    assert!(format!("{:#}", err).contains("401"), "unexpected error: {:#}", err);
}

#[tokio::test]
async fn test_null_data_is_empty_batch() {
    let body = serde_json::json!({ "data": null, "oldest": "" });
    let server = mock_querylog_server(DEFAULT_AUTH, 1000, body).await;
    let mut config = default_config();
    config.log_source.url = format!("{}/control/querylog", server.uri());

    let source = AdGuardLogSource::new(&config.log_source).unwrap();
    assert!(source.fetch().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = mock_error_server(500).await;
    let mut config = default_config();
    config.log_source.url = format!("{}/control/querylog", server.uri());

    let source = AdGuardLogSource::new(&config.log_source).unwrap();
    assert!(source.fetch().await.is_err());
}

#[tokio::test]
async fn test_saved_file_source() {
    let source = StaticLogSource::from_file(&fixture_path("querylog.json")).unwrap();
    let records = source.fetch().await.unwrap();
    let candidates = extract_candidates(&records);

    // Blocked and allow-listed queries are not candidates; duplicates collapse
    assert_eq!(candidates.len(), 6);
    assert!(candidates.contains("tracking-analytics.example.com"));
    assert!(!candidates.contains("ads.doubleclick.net"));
    assert!(!candidates.contains("metrics.icloud.com"));
}

#[test]
fn test_missing_file_is_error() {
    assert!(StaticLogSource::from_file(&fixture_path("no-such-log.json")).is_err());
}
