//! Rule rendering and merging into the persisted rule set.

use std::collections::BTreeSet;

/// Render a domain as an AdGuard block rule (`||domain^`).
/// The domain is copied verbatim.
pub fn render_rule(domain: &str) -> String {
    format!("||{}^", domain)
}

/// One rule per unique domain across auto-blocked and confirmed domains
pub fn build_rules<'a, A, C>(auto_blocked: A, confirmed: C) -> BTreeSet<String>
where
    A: IntoIterator<Item = &'a String>,
    C: IntoIterator<Item = &'a String>,
{
    auto_blocked
        .into_iter()
        .chain(confirmed)
        .map(|domain| render_rule(domain))
        .collect()
}

/// Result of merging new rules into the existing set
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged: BTreeSet<String>,
    /// Rules present in `merged` but not in the existing set
    pub added: BTreeSet<String>,
}

impl MergeOutcome {
    /// Whether the merged set is strictly larger than the existing one
    pub fn grew(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Union of the existing rules and the new ones. Nothing is ever removed.
pub fn merge(existing: &BTreeSet<String>, new_rules: &BTreeSet<String>) -> MergeOutcome {
    let added: BTreeSet<String> = new_rules.difference(existing).cloned().collect();
    let mut merged = existing.clone();
    merged.extend(added.iter().cloned());
    MergeOutcome { merged, added }
}
