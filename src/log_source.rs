//! Query log sources.
//!
//! Supports:
//! - AdGuard Home's `/control/querylog` endpoint (basic auth, JSON)
//! - Saved query log files, either the full response object or a bare array
//! - A fixed in-memory batch

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::config::LogSourceConfig;
use crate::extractor::QueryRecord;

/// Body of an AdGuard Home query log response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryLogResponse {
    #[serde(default)]
    pub data: Option<Vec<QueryRecord>>,
}

impl QueryLogResponse {
    pub fn into_records(self) -> Vec<QueryRecord> {
        self.data.unwrap_or_default()
    }
}

/// Supplies the batch of query records for one run
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<QueryRecord>>;
}

/// AdGuard Home query log client
pub struct AdGuardLogSource {
    client: reqwest::Client,
    config: LogSourceConfig,
}

impl AdGuardLogSource {
    pub fn new(config: &LogSourceConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client for the query log")?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl LogSource for AdGuardLogSource {
    async fn fetch(&self) -> Result<Vec<QueryRecord>> {
        let mut request = self
            .client
            .get(&self.config.url)
            // Sent up front; AdGuard Home does not answer with a 401 challenge for API clients
            .basic_auth(&self.config.username, Some(&self.config.password));
        if self.config.limit > 0 {
            request = request.query(&[("limit", self.config.limit)]);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Query log request to {} failed", self.config.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Query log request to {} returned {}", self.config.url, status);
        }

        let body = response
            .text()
            .await
            .context("Failed to read query log response body")?;
        let records = parse_query_log(&body)?;
        debug!("Fetched {} query log records from {}", records.len(), self.config.url);
        Ok(records)
    }
}

/// A fixed batch, returned on every fetch
#[derive(Debug, Clone, Default)]
pub struct StaticLogSource {
    records: Vec<QueryRecord>,
}

impl StaticLogSource {
    pub fn new(records: Vec<QueryRecord>) -> Self {
        Self { records }
    }

    /// Load a saved query log file
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(load_query_log_file(path)?))
    }
}

#[async_trait]
impl LogSource for StaticLogSource {
    async fn fetch(&self) -> Result<Vec<QueryRecord>> {
        Ok(self.records.clone())
    }
}

/// Parse query log JSON.
///
/// Accepts the response object (`{"data": [...]}`) or a bare array of
/// records. An empty body, a missing or null `data` field all mean no records.
pub fn parse_query_log(content: &str) -> Result<Vec<QueryRecord>> {
    let content = content.trim();
    if content.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(content)
        .context("Failed to parse query log JSON")?;

    match value {
        serde_json::Value::Array(_) => {
            serde_json::from_value(value).context("Query log array contains malformed records")
        }
        serde_json::Value::Object(_) => {
            let response: QueryLogResponse = serde_json::from_value(value)
                .context("Query log object has malformed 'data' field")?;
            Ok(response.into_records())
        }
        serde_json::Value::Null => Ok(Vec::new()),
        _ => bail!("Query log must be an object with a 'data' array or an array of records"),
    }
}

/// Read and parse a saved query log file
pub fn load_query_log_file(path: &Path) -> Result<Vec<QueryRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read query log file: {}", path.display()))?;
    parse_query_log(&content)
        .with_context(|| format!("Failed to parse query log file: {}", path.display()))
}
