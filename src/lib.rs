pub mod aggregator;
pub mod cli;
pub mod config;
pub mod domain_utils;
pub mod extractor;
pub mod log_source;
pub mod logger;
pub mod pool;
pub mod router;
pub mod rule_store;
pub mod scanner;
pub mod scorer;
pub mod verifier;

pub use config::AppConfig;
pub use extractor::QueryRecord;
pub use log_source::{AdGuardLogSource, LogSource, StaticLogSource};
pub use rule_store::{FileRuleStore, MemoryRuleStore, RuleStore};
pub use scanner::{RunOptions, ScanOutcome, ScanReport, Scanner};
pub use verifier::{HttpProbe, Probe, VerificationDispatcher};
