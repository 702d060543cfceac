//! Static suspicion scoring for candidate domains.
//!
//! The score is a plain sum of fixed weights. List rules (whitelist, CDN,
//! keywords, compound) contribute once when any entry matches; the lexical
//! rules look only at the leftmost label and stack with each other.

use serde::Serialize;
use std::fmt;

use crate::config::{DomainLists, ScoringWeights};
use crate::domain_utils::{first_match, leftmost_label};

const VOWELS: [char; 5] = ['a', 'e', 'i', 'o', 'u'];

/// Label length above which the long-label bonus applies
const LONG_LABEL: usize = 12;
/// Label length above which the very-long-label bonus also applies
const VERY_LONG_LABEL: usize = 20;
/// Digit share of the label above which it counts as machine-generated
const DIGIT_RATIO: f64 = 0.3;
/// Minimum label length for the vowel check
const NO_VOWEL_MIN_LEN: usize = 5;
/// Minimum label length for the hyphen check
const NO_HYPHEN_MIN_LEN: usize = 10;

/// A scoring rule that can fire for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRule {
    Whitelist,
    CdnWhitelist,
    Keyword,
    Compound,
    LongLabel,
    VeryLongLabel,
    DigitRatio,
    NoVowels,
    NoHyphen,
}

impl fmt::Display for ScoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoreRule::Whitelist => "whitelist",
            ScoreRule::CdnWhitelist => "cdn-whitelist",
            ScoreRule::Keyword => "keyword",
            ScoreRule::Compound => "compound",
            ScoreRule::LongLabel => "long-label",
            ScoreRule::VeryLongLabel => "very-long-label",
            ScoreRule::DigitRatio => "digit-ratio",
            ScoreRule::NoVowels => "no-vowels",
            ScoreRule::NoHyphen => "no-hyphen",
        };
        f.write_str(name)
    }
}

/// One rule that fired and what it contributed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreHit {
    pub rule: ScoreRule,
    pub points: i32,
    /// What triggered the rule (matched entry, label length, ratio)
    pub detail: String,
}

/// Score of one domain together with the rules that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub domain: String,
    pub score: i32,
    pub hits: Vec<ScoreHit>,
}

impl ScoreBreakdown {
    pub fn fired(&self, rule: ScoreRule) -> bool {
        self.hits.iter().any(|hit| hit.rule == rule)
    }
}

/// A domain with its static score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    pub domain: String,
    pub score: i32,
}

/// Scores domains against an immutable configuration snapshot
#[derive(Debug, Clone)]
pub struct StaticScorer {
    weights: ScoringWeights,
    lists: DomainLists,
}

impl StaticScorer {
    pub fn new(weights: ScoringWeights, lists: DomainLists) -> Self {
        Self { weights, lists }
    }

    /// Suspicion score of a domain. May be negative.
    pub fn score(&self, domain: &str) -> i32 {
        self.explain(domain).score
    }

    pub fn score_candidate(&self, domain: &str) -> ScoredCandidate {
        ScoredCandidate {
            domain: domain.to_string(),
            score: self.score(domain),
        }
    }

    /// Full breakdown of the rules that fired for `domain`
    pub fn explain(&self, domain: &str) -> ScoreBreakdown {
        let w = &self.weights;
        let mut hits = Vec::new();

        if let Some(entry) = first_match(domain, &self.lists.whitelist) {
            hits.push(hit(ScoreRule::Whitelist, -w.whitelist_penalty, entry));
        }

        if let Some(entry) = first_match(domain, &self.lists.cdn_whitelist) {
            hits.push(hit(ScoreRule::CdnWhitelist, -w.cdn_penalty, entry));
        }

        if let Some(entry) = first_match(domain, &self.lists.black_keywords) {
            hits.push(hit(ScoreRule::Keyword, w.keyword_bonus, entry));
        }

        if domain.contains(self.lists.compound_trigger.as_str()) {
            if let Some(marker) = first_match(domain, &self.lists.compound_markers) {
                let detail = format!("{} + {}", self.lists.compound_trigger, marker);
                hits.push(hit(ScoreRule::Compound, w.compound_bonus, &detail));
            }
        }

        self.lexical_hits(leftmost_label(domain), &mut hits);

        let score = hits.iter().map(|h| h.points).sum();
        ScoreBreakdown {
            domain: domain.to_string(),
            score,
            hits,
        }
    }

    /// DGA-likeness rules over the leftmost label
    fn lexical_hits(&self, label: &str, hits: &mut Vec<ScoreHit>) {
        let w = &self.weights;
        let len = label.chars().count();
        if len == 0 {
            return;
        }

        if len > LONG_LABEL {
            hits.push(hit(ScoreRule::LongLabel, w.long_label_bonus, &format!("length {}", len)));
        }
        if len > VERY_LONG_LABEL {
            hits.push(hit(ScoreRule::VeryLongLabel, w.very_long_label_bonus, &format!("length {}", len)));
        }

        let digits = label.chars().filter(|c| c.is_ascii_digit()).count();
        let ratio = digits as f64 / len as f64;
        if ratio > DIGIT_RATIO {
            hits.push(hit(ScoreRule::DigitRatio, w.digit_ratio_bonus, &format!("{}/{} digits", digits, len)));
        }

        let has_vowel = label
            .chars()
            .any(|c| VOWELS.contains(&c.to_ascii_lowercase()));
        if len > NO_VOWEL_MIN_LEN && !has_vowel {
            hits.push(hit(ScoreRule::NoVowels, w.no_vowel_bonus, label));
        }

        if len > NO_HYPHEN_MIN_LEN && !label.contains('-') {
            hits.push(hit(ScoreRule::NoHyphen, w.no_hyphen_bonus, label));
        }
    }
}

fn hit(rule: ScoreRule, points: i32, detail: &str) -> ScoreHit {
    ScoreHit {
        rule,
        points,
        detail: detail.to_string(),
    }
}
