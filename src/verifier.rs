//! Network verification of deep-check domains.
//!
//! Each domain gets a single HEAD request. A response that looks like a
//! tracking pixel (a GIF or PNG under `max_pixel_bytes`) confirms the domain.
//! Every failure mode, including timeouts and panics, yields "not confirmed"
//! for that domain only.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{PoolConfig, ProbeConfig};
use crate::pool::{PoolStats, ProgressFn, WorkerPool};

/// Content types served by 1x1 tracking pixels
const PIXEL_CONTENT_TYPES: [&str; 2] = ["image/gif", "image/png"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub domain: String,
    pub confirmed: bool,
}

impl VerificationOutcome {
    pub fn confirmed(domain: impl Into<String>) -> Self {
        Self { domain: domain.into(), confirmed: true }
    }

    pub fn unconfirmed(domain: impl Into<String>) -> Self {
        Self { domain: domain.into(), confirmed: false }
    }
}

/// True when a response's headers describe a tracking pixel:
/// a GIF/PNG content type and a length strictly between 0 and `max_bytes`.
pub fn is_tracking_pixel(content_type: Option<&str>, content_length: Option<u64>, max_bytes: u64) -> bool {
    let is_pixel_type = content_type
        .map(|ct| ct.to_ascii_lowercase())
        .map(|ct| PIXEL_CONTENT_TYPES.iter().any(|t| ct.contains(t)))
        .unwrap_or(false);

    match content_length {
        Some(len) => is_pixel_type && len > 0 && len < max_bytes,
        None => false,
    }
}

/// A single-domain verification probe
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe one domain. Implementations swallow their own failures.
    async fn probe(&self, domain: &str) -> VerificationOutcome;
}

/// HEAD-request probe over HTTPS
pub struct HttpProbe {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            // Every probe opens its own connection and drops it when done
            .pool_max_idle_per_host(0)
            .build()
            .context("Failed to create HTTP client for verification probes")?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, domain: &str) -> VerificationOutcome {
        let url = self.config.url_for(domain);

        let response = match self.client.head(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                // Connection failures are expected for most candidates
                debug!("Probe failed for {}: {}", domain, e);
                return VerificationOutcome::unconfirmed(domain);
            }
        };

        let headers = response.headers();
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if is_tracking_pixel(content_type, content_length, self.config.max_pixel_bytes) {
            info!(
                "Tracking pixel found: {} ({}, {} bytes)",
                domain,
                content_type.unwrap_or_default(),
                content_length.unwrap_or_default()
            );
            VerificationOutcome::confirmed(domain)
        } else {
            debug!(
                "Probe of {} returned {} (content-type: {:?}, length: {:?})",
                domain,
                response.status(),
                content_type,
                content_length
            );
            VerificationOutcome::unconfirmed(domain)
        }
    }
}

/// Outcomes of one verification batch
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub outcomes: Vec<VerificationOutcome>,
    pub stats: PoolStats,
}

impl VerificationReport {
    pub fn confirmed(&self) -> BTreeSet<String> {
        self.outcomes
            .iter()
            .filter(|o| o.confirmed)
            .map(|o| o.domain.clone())
            .collect()
    }
}

/// Runs probes for a batch of domains on a bounded worker pool
#[derive(Clone)]
pub struct VerificationDispatcher {
    probe: Arc<dyn Probe>,
    pool: WorkerPool,
    timeout: Duration,
}

impl VerificationDispatcher {
    pub fn new(probe: Arc<dyn Probe>, pool: WorkerPool, timeout: Duration) -> Self {
        Self { probe, pool, timeout }
    }

    /// HTTP dispatcher built from configuration
    pub fn from_config(probe: &ProbeConfig, pool: &PoolConfig) -> Result<Self> {
        let http = HttpProbe::new(probe)?;
        Ok(Self::new(
            Arc::new(http),
            WorkerPool::new(pool.workers, pool.queue_depth),
            probe.timeout(),
        ))
    }

    /// Probe every domain and wait for all outcomes
    pub async fn verify(&self, domains: &BTreeSet<String>, progress: Option<&ProgressFn>) -> VerificationReport {
        if domains.is_empty() {
            return VerificationReport::default();
        }

        debug!(
            "Verifying {} domains (workers: {}, queue: {}, timeout: {:?})",
            domains.len(),
            self.pool.capacity(),
            self.pool.queue_depth(),
            self.timeout
        );

        let timeout = self.timeout;
        let run = self
            .pool
            .run_all(
                domains.iter().cloned().collect(),
                |domain: String| {
                    let probe = self.probe.clone();
                    async move {
                        match tokio::time::timeout(timeout, probe.probe(&domain)).await {
                            Ok(outcome) => outcome,
                            Err(_) => {
                                debug!("Probe timed out for {} after {:?}", domain, timeout);
                                VerificationOutcome::unconfirmed(domain)
                            }
                        }
                    }
                },
                progress,
            )
            .await;

        VerificationReport {
            outcomes: run.results,
            stats: run.stats,
        }
    }
}
