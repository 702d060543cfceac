//! Candidate extraction from raw query log records.
//!
//! Only queries that AdGuard Home let through without a filter match
//! (`NotFilteredNotFound`) are worth classifying; everything else was
//! already blocked, allow-listed, or rewritten.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Filter reason of queries that passed through unblocked
pub const PASSED_THROUGH_REASON: &str = "NotFilteredNotFound";

/// One query log entry, in the shape AdGuard Home's `/control/querylog` returns
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRecord {
    #[serde(default)]
    pub question: Question,
    /// Filter reason, e.g. `NotFilteredNotFound` or `FilteredBlackList`
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Question {
    #[serde(default)]
    pub name: String,
}

impl QueryRecord {
    pub fn new(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            question: Question { name: domain.into() },
            reason: reason.into(),
            status: None,
        }
    }

    pub fn domain_name(&self) -> &str {
        &self.question.name
    }

    pub fn passed_through(&self) -> bool {
        self.reason == PASSED_THROUGH_REASON
    }
}

/// Distinct domains from records that passed through unfiltered.
/// Domain names are kept verbatim; empty names are skipped.
pub fn extract_candidates(records: &[QueryRecord]) -> BTreeSet<String> {
    records
        .iter()
        .filter(|record| record.passed_through())
        .map(QueryRecord::domain_name)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        assert!(extract_candidates(&[]).is_empty());
    }

    #[test]
    fn test_only_passed_through_records() {
        let records = vec![
            QueryRecord::new("tracker.example.com", "NotFilteredNotFound"),
            QueryRecord::new("ads.example.com", "FilteredBlackList"),
            QueryRecord::new("safe.example.com", "NotFilteredWhiteList"),
        ];
        let candidates = extract_candidates(&records);
        assert_eq!(candidates.len(), 1);
        assert!(candidates.contains("tracker.example.com"));
    }

    #[test]
    fn test_deduplicates_exact_names() {
        let records = vec![
            QueryRecord::new("a.example.com", PASSED_THROUGH_REASON),
            QueryRecord::new("a.example.com", PASSED_THROUGH_REASON),
            QueryRecord::new("b.example.com", PASSED_THROUGH_REASON),
        ];
        assert_eq!(extract_candidates(&records).len(), 2);
    }

    #[test]
    fn test_preserves_case() {
        let records = vec![
            QueryRecord::new("Mixed.Example.com", PASSED_THROUGH_REASON),
            QueryRecord::new("mixed.example.com", PASSED_THROUGH_REASON),
        ];
        let candidates = extract_candidates(&records);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.contains("Mixed.Example.com"));
    }

    #[test]
    fn test_skips_empty_names() {
        let records = vec![QueryRecord::new("", PASSED_THROUGH_REASON)];
        assert!(extract_candidates(&records).is_empty());
    }

    #[test]
    fn test_deserialize_adguard_entry() {
        let json = r#"{
            "answer": [],
            "client": "192.168.1.20",
            "elapsedMs": "12.5",
            "question": {"class": "IN", "name": "telemetry.vendor.com", "type": "A"},
            "reason": "NotFilteredNotFound",
            "status": "NOERROR",
            "time": "2024-05-01T10:00:00Z"
        }"#;
        let record: QueryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.domain_name(), "telemetry.vendor.com");
        assert!(record.passed_through());
        assert_eq!(record.status.as_deref(), Some("NOERROR"));
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let record: QueryRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record.domain_name(), "");
        assert!(!record.passed_through());
    }
}
