//! Persisted rule sets.
//!
//! The file store keeps one rule per line. Blank lines and comment lines
//! (`!` or `#`) are skipped on read; writes replace the file atomically.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Snapshot of the existing rules
    async fn read_rules(&self) -> Result<BTreeSet<String>>;
    /// Replace the stored rules with `rules`
    async fn write_rules(&self, rules: &BTreeSet<String>) -> Result<()>;
}

/// Parse rule file content into a set of rules
pub fn parse_rules(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('!') && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Render rules as file content, sorted, with a header comment
pub fn render_rules(rules: &BTreeSet<String>) -> String {
    let mut out = String::new();
    out.push_str("! Generated by adscanner\n");
    out.push_str(&format!("! Updated: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!("! Rules: {}\n", rules.len()));
    for rule in rules {
        out.push_str(rule);
        out.push('\n');
    }
    out
}

/// Plain text rule file
#[derive(Debug, Clone)]
pub struct FileRuleStore {
    path: PathBuf,
}

impl FileRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn read_rules(&self) -> Result<BTreeSet<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(parse_rules(&content)),
            // A store that was never written is empty
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read rule file: {}", self.path.display())),
        }
    }

    async fn write_rules(&self, rules: &BTreeSet<String>) -> Result<()> {
        let path = self.path.clone();
        let temp_path = self.temp_path();
        let content = render_rules(rules);

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create rule directory: {}", parent.display()))?;
            }

            // Write to temporary file first, then fsync before rename
            {
                let mut file = std::fs::File::create(&temp_path)
                    .with_context(|| format!("Failed to create {}", temp_path.display()))?;
                file.write_all(content.as_bytes())?;
                file.sync_all()?;
            }

            std::fs::rename(&temp_path, &path)
                .with_context(|| format!("Failed to replace rule file: {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Rule file writer task failed")?
    }
}

/// In-memory rule store
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Mutex<BTreeSet<String>>,
    writes: Mutex<usize>,
}

impl MemoryRuleStore {
    pub fn new(rules: BTreeSet<String>) -> Self {
        Self {
            rules: Mutex::new(rules),
            writes: Mutex::new(0),
        }
    }

    /// Number of `write_rules` calls so far
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }

    pub async fn snapshot(&self) -> BTreeSet<String> {
        self.rules.lock().await.clone()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn read_rules(&self) -> Result<BTreeSet<String>> {
        Ok(self.rules.lock().await.clone())
    }

    async fn write_rules(&self, rules: &BTreeSet<String>) -> Result<()> {
        *self.rules.lock().await = rules.clone();
        *self.writes.lock().await += 1;
        Ok(())
    }
}
