//! Score-band routing.
//!
//! Every score maps to exactly one disposition. Scores between the top of the
//! deep-check band and the block threshold (when the bands leave a gap) are
//! ignored, as are scores below the deep-check band.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::config::Bands;
use crate::scorer::ScoredCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoBlock,
    DeepCheck,
    Ignore,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::AutoBlock => write!(f, "auto-block"),
            Disposition::DeepCheck => write!(f, "deep-check"),
            Disposition::Ignore => write!(f, "ignore"),
        }
    }
}

impl Bands {
    pub fn route(&self, score: i32) -> Disposition {
        if score >= self.block {
            Disposition::AutoBlock
        } else if (self.deep_min..=self.deep_max).contains(&score) {
            Disposition::DeepCheck
        } else {
            Disposition::Ignore
        }
    }
}

/// Scored candidates partitioned by disposition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutedCandidates {
    pub auto_block: BTreeSet<String>,
    pub deep_check: BTreeSet<String>,
    pub ignored: BTreeSet<String>,
}

impl RoutedCandidates {
    pub fn total(&self) -> usize {
        self.auto_block.len() + self.deep_check.len() + self.ignored.len()
    }
}

/// Partition scored candidates into the three disjoint bands
pub fn partition<I>(bands: &Bands, scored: I) -> RoutedCandidates
where
    I: IntoIterator<Item = ScoredCandidate>,
{
    let mut routed = RoutedCandidates::default();
    for candidate in scored {
        let bucket = match bands.route(candidate.score) {
            Disposition::AutoBlock => &mut routed.auto_block,
            Disposition::DeepCheck => &mut routed.deep_check,
            Disposition::Ignore => &mut routed.ignored,
        };
        bucket.insert(candidate.domain);
    }
    routed
}
