//! The classification pipeline.
//!
//! `Scanner::classify` is the core: (batch, existing rules) in, new and merged
//! rules out. `Scanner::run_once` wraps it with a log source and a rule store
//! and turns every collaborator failure into a logged, non-fatal outcome.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::{build_rules, merge};
use crate::config::{AppConfig, Bands};
use crate::extractor::{extract_candidates, QueryRecord};
use crate::log_source::LogSource;
use crate::pool::{PoolStats, ProgressFn};
use crate::router::partition;
use crate::rule_store::RuleStore;
use crate::scorer::StaticScorer;
use crate::verifier::VerificationDispatcher;

/// Result of classifying one batch against an existing rule set
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub records: usize,
    pub candidates: usize,
    pub auto_blocked: BTreeSet<String>,
    pub deep_checked: usize,
    pub confirmed: BTreeSet<String>,
    pub ignored: usize,
    pub pool: PoolStats,
    /// Rules for every auto-blocked or confirmed domain
    pub new_rules: BTreeSet<String>,
    /// New rules that were not already in the existing set
    pub added: BTreeSet<String>,
    pub merged: BTreeSet<String>,
}

impl ScanOutcome {
    pub fn grew(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Summary of one scan run
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub records: usize,
    pub candidates: usize,
    pub auto_blocked: usize,
    pub deep_checked: usize,
    pub confirmed: usize,
    pub ignored: usize,
    pub caller_run_probes: usize,
    pub failed_probes: usize,
    /// Rules added to the store this run, sorted
    pub added_rules: Vec<String>,
    pub total_rules: usize,
    pub grew: bool,
    /// Whether the merged set was written to the rule store
    pub persisted: bool,
    /// Set when the log source could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    /// Set when the rule store could not be read or written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

impl ScanReport {
    fn from_outcome(outcome: &ScanOutcome, started_at: DateTime<Utc>, duration_secs: f64) -> Self {
        Self {
            started_at,
            completed_at: Utc::now(),
            duration_secs,
            records: outcome.records,
            candidates: outcome.candidates,
            auto_blocked: outcome.auto_blocked.len(),
            deep_checked: outcome.deep_checked,
            confirmed: outcome.confirmed.len(),
            ignored: outcome.ignored,
            caller_run_probes: outcome.pool.caller_runs,
            failed_probes: outcome.pool.failed,
            added_rules: outcome.added.iter().cloned().collect(),
            total_rules: outcome.merged.len(),
            grew: outcome.grew(),
            persisted: false,
            source_error: None,
            store_error: None,
        }
    }
}

/// Options for a single run
#[derive(Default)]
pub struct RunOptions<'a> {
    /// Skip writing to the rule store
    pub dry_run: bool,
    pub progress: Option<&'a ProgressFn>,
}

pub struct Scanner {
    scorer: StaticScorer,
    bands: Bands,
    dispatcher: VerificationDispatcher,
}

impl Scanner {
    pub fn new(scorer: StaticScorer, bands: Bands, dispatcher: VerificationDispatcher) -> Self {
        Self { scorer, bands, dispatcher }
    }

    /// Scanner with the HTTP probe, built from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let scorer = StaticScorer::new(config.scoring.clone(), config.lists.clone());
        let dispatcher = VerificationDispatcher::from_config(&config.probe, &config.pool)?;
        Ok(Self::new(scorer, config.bands, dispatcher))
    }

    /// Classify a batch and merge the resulting rules into `existing`.
    /// Only deep-check domains are probed; nothing here fails.
    pub async fn classify(
        &self,
        records: &[QueryRecord],
        existing: &BTreeSet<String>,
        progress: Option<&ProgressFn>,
    ) -> ScanOutcome {
        let candidates = extract_candidates(records);
        info!("Found {} candidate domains in {} query records", candidates.len(), records.len());

        let scored = candidates.iter().map(|domain| {
            let candidate = self.scorer.score_candidate(domain);
            debug!("Scored {}: {}", candidate.domain, candidate.score);
            candidate
        });
        let routed = partition(&self.bands, scored);

        info!(
            "Routing: {} auto-block, {} deep-check, {} ignored",
            routed.auto_block.len(),
            routed.deep_check.len(),
            routed.ignored.len()
        );

        let verification = if routed.deep_check.is_empty() {
            Default::default()
        } else {
            info!("Deep-checking {} domains", routed.deep_check.len());
            self.dispatcher.verify(&routed.deep_check, progress).await
        };
        let confirmed = verification.confirmed();
        if !routed.deep_check.is_empty() {
            info!("Deep-check confirmed {} of {} domains", confirmed.len(), routed.deep_check.len());
        }

        let new_rules = build_rules(&routed.auto_block, &confirmed);
        let merge_outcome = merge(existing, &new_rules);

        ScanOutcome {
            records: records.len(),
            candidates: candidates.len(),
            deep_checked: routed.deep_check.len(),
            ignored: routed.ignored.len(),
            auto_blocked: routed.auto_block,
            confirmed,
            pool: verification.stats,
            new_rules,
            added: merge_outcome.added,
            merged: merge_outcome.merged,
        }
    }

    /// Fetch, classify, and persist when the rule set grew.
    ///
    /// A log source failure produces an empty batch. A rule store read failure
    /// disables persistence for this run; a write failure is reported but the
    /// computed rules are still returned.
    pub async fn run_once(
        &self,
        source: &dyn LogSource,
        store: &dyn RuleStore,
        options: RunOptions<'_>,
    ) -> (ScanOutcome, ScanReport) {
        let started_at = Utc::now();
        let start = Instant::now();

        let (records, source_error) = match source.fetch().await {
            Ok(records) => (records, None),
            Err(e) => {
                warn!("Failed to fetch query log, continuing with an empty batch: {:#}", e);
                (Vec::new(), Some(format!("{:#}", e)))
            }
        };

        let (existing, mut store_error) = match store.read_rules().await {
            Ok(rules) => (Some(rules), None),
            Err(e) => {
                warn!("Failed to read existing rules, results will not be persisted: {:#}", e);
                (None, Some(format!("{:#}", e)))
            }
        };
        let snapshot = existing.clone().unwrap_or_default();

        let outcome = self.classify(&records, &snapshot, options.progress).await;

        let mut persisted = false;
        if outcome.grew() && existing.is_some() {
            if options.dry_run {
                info!("Dry run: {} new rules not written", outcome.added.len());
            } else {
                match store.write_rules(&outcome.merged).await {
                    Ok(()) => {
                        persisted = true;
                        info!("Added {} rules ({} total)", outcome.added.len(), outcome.merged.len());
                    }
                    Err(e) => {
                        warn!("Failed to write rules: {:#}", e);
                        store_error = Some(format!("{:#}", e));
                    }
                }
            }
        } else if !outcome.grew() {
            debug!("No new rules, skipping rule store write");
        }

        let mut report = ScanReport::from_outcome(&outcome, started_at, start.elapsed().as_secs_f64());
        report.persisted = persisted;
        report.source_error = source_error;
        report.store_error = store_error;

        info!(
            "Scan finished in {:.2}s: {} new rules from {} candidates",
            report.duration_secs,
            outcome.added.len(),
            outcome.candidates
        );

        (outcome, report)
    }
}

/// Export a scan report to a JSON file
pub fn export_report(report: &ScanReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize scan report")?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write scan report to: {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PASSED_THROUGH_REASON;
    use crate::log_source::StaticLogSource;
    use crate::pool::WorkerPool;
    use crate::rule_store::MemoryRuleStore;
    use crate::verifier::{Probe, VerificationOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Confirms a fixed set of domains and records every probed domain
    #[derive(Default)]
    struct RecordingProbe {
        pixels: BTreeSet<String>,
        probed: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for RecordingProbe {
        async fn probe(&self, domain: &str) -> VerificationOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.probed.lock().unwrap().push(domain.to_string());
            if self.pixels.contains(domain) {
                VerificationOutcome::confirmed(domain)
            } else {
                VerificationOutcome::unconfirmed(domain)
            }
        }
    }

    struct FailingSource;

    #[async_trait]
    impl LogSource for FailingSource {
        async fn fetch(&self) -> Result<Vec<QueryRecord>> {
            anyhow::bail!("connection refused")
        }
    }

    struct FailingStore;

    #[async_trait]
    impl RuleStore for FailingStore {
        async fn read_rules(&self) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }
        async fn write_rules(&self, _rules: &BTreeSet<String>) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    fn scanner_with(probe: Arc<RecordingProbe>) -> Scanner {
        let config = AppConfig::default_template().unwrap();
        let scorer = StaticScorer::new(config.scoring, config.lists);
        let dispatcher = VerificationDispatcher::new(probe, WorkerPool::new(4, 16), Duration::from_secs(2));
        Scanner::new(scorer, config.bands, dispatcher)
    }

    fn passed(domain: &str) -> QueryRecord {
        QueryRecord::new(domain, PASSED_THROUGH_REASON)
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_batch_keeps_existing() {
        let probe = Arc::new(RecordingProbe::default());
        let scanner = scanner_with(probe.clone());
        let existing = set(&["||old.example.com^"]);

        let outcome = scanner.classify(&[], &existing, None).await;
        assert_eq!(outcome.candidates, 0);
        assert!(outcome.new_rules.is_empty());
        assert_eq!(outcome.merged, existing);
        assert!(!outcome.grew());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_only_deep_check_domains_are_probed() {
        let probe = Arc::new(RecordingProbe::default());
        let scanner = scanner_with(probe.clone());
        let records = vec![
            passed("www.apple.com"),                  // -100, ignore
            passed("tracking-analytics.example.com"), // 50, deep-check
            passed("analysis.xunlei-cdn.qq.com"),     // 60, auto-block
            passed("www.example.com"),                // 0, ignore
        ];

        let outcome = scanner.classify(&records, &BTreeSet::new(), None).await;
        assert_eq!(outcome.auto_blocked, set(&["analysis.xunlei-cdn.qq.com"]));
        assert_eq!(outcome.deep_checked, 1);
        assert_eq!(outcome.ignored, 2);
        assert_eq!(*probe.probed.lock().unwrap(), vec!["tracking-analytics.example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_unconfirmed_deep_check_is_not_blocked() {
        let probe = Arc::new(RecordingProbe::default());
        let scanner = scanner_with(probe);
        let outcome = scanner
            .classify(&[passed("tracking-analytics.example.com")], &BTreeSet::new(), None)
            .await;
        assert!(outcome.new_rules.is_empty());
        assert!(!outcome.grew());
    }

    #[tokio::test]
    async fn test_confirmed_deep_check_is_blocked() {
        let probe = Arc::new(RecordingProbe {
            pixels: set(&["tracking-analytics.example.com"]),
            ..Default::default()
        });
        let scanner = scanner_with(probe);
        let outcome = scanner
            .classify(&[passed("tracking-analytics.example.com")], &BTreeSet::new(), None)
            .await;
        assert_eq!(outcome.new_rules, set(&["||tracking-analytics.example.com^"]));
        assert!(outcome.grew());
    }

    #[tokio::test]
    async fn test_run_once_writes_only_on_growth() {
        let probe = Arc::new(RecordingProbe::default());
        let scanner = scanner_with(probe);
        let source = StaticLogSource::new(vec![passed("analysis.xunlei-cdn.qq.com")]);
        let store = MemoryRuleStore::new(BTreeSet::new());

        let (_, report) = scanner.run_once(&source, &store, RunOptions::default()).await;
        assert!(report.grew);
        assert!(report.persisted);
        assert_eq!(store.write_count().await, 1);

        // Same batch again: nothing new, no second write
        let (_, report) = scanner.run_once(&source, &store, RunOptions::default()).await;
        assert!(!report.grew);
        assert!(!report.persisted);
        assert_eq!(store.write_count().await, 1);
        assert_eq!(store.snapshot().await, set(&["||analysis.xunlei-cdn.qq.com^"]));
    }

    #[tokio::test]
    async fn test_dry_run_skips_write() {
        let scanner = scanner_with(Arc::new(RecordingProbe::default()));
        let source = StaticLogSource::new(vec![passed("analysis.xunlei-cdn.qq.com")]);
        let store = MemoryRuleStore::new(BTreeSet::new());

        let options = RunOptions { dry_run: true, ..Default::default() };
        let (outcome, report) = scanner.run_once(&source, &store, options).await;
        assert!(outcome.grew());
        assert!(!report.persisted);
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_source_failure_is_not_fatal() {
        let scanner = scanner_with(Arc::new(RecordingProbe::default()));
        let store = MemoryRuleStore::new(set(&["||old.example.com^"]));

        let (outcome, report) = scanner.run_once(&FailingSource, &store, RunOptions::default()).await;
        assert_eq!(outcome.merged, set(&["||old.example.com^"]));
        assert!(report.source_error.as_deref().unwrap_or_default().contains("connection refused"));
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_write_failure_still_returns_rules() {
        let scanner = scanner_with(Arc::new(RecordingProbe::default()));
        let source = StaticLogSource::new(vec![passed("analysis.xunlei-cdn.qq.com")]);

        let (outcome, report) = scanner.run_once(&source, &FailingStore, RunOptions::default()).await;
        assert_eq!(outcome.merged, set(&["||analysis.xunlei-cdn.qq.com^"]));
        assert!(!report.persisted);
        assert!(report.store_error.is_some());
    }

    #[test]
    fn test_export_report() {
        let tmp = tempfile::TempDir::new().unwrap();
        let outcome = ScanOutcome {
            records: 3,
            candidates: 2,
            added: set(&["||a.example.com^"]),
            merged: set(&["||a.example.com^"]),
            ..Default::default()
        };
        let started_at = Utc::now();
        let report = ScanReport::from_outcome(&outcome, started_at, 0.5);
        let path = tmp.path().join("reports").join("scan.json");
        export_report(&report, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["candidates"], 2);
        assert_eq!(value["grew"], true);
        assert_eq!(value["added_rules"][0], "||a.example.com^");
        assert!(value.get("source_error").is_none());

        // Timestamps are written as RFC 3339 and read back unchanged
        let written: DateTime<Utc> = serde_json::from_value(value["started_at"].clone()).unwrap();
        assert_eq!(written, started_at);
        assert!(report.completed_at >= started_at);
    }
}
