use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_PATH;
use crate::domain_utils::is_valid_domain;

#[derive(Parser, Debug)]
#[command(name = "adscanner")]
#[command(about = "Turns AdGuard Home query logs into block rules for ad and tracker domains")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at the --config path
    #[arg(long, global = true)]
    pub init: bool,

    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_PATH)]
    pub config: PathBuf,

    /// Verbose logging (use -v for per-domain results, -vv for debug output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print the final summary and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Append execution logs to a file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one scan: fetch the query log, classify, and update the rule file
    Scan(ScanArgs),

    /// Run scans repeatedly until interrupted
    Watch {
        /// Seconds between scans
        #[arg(short, long, default_value = "300", value_name = "SECS")]
        interval: u64,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Show the static score of domains and the band each lands in (no network)
    Score {
        /// Domains to score
        #[arg(required = true)]
        domains: Vec<String>,
    },

    /// Run the tracking-pixel probe against domains directly
    Probe {
        /// Domains to probe
        #[arg(required = true)]
        domains: Vec<String>,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Read query records from a saved JSON file instead of AdGuard Home
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Classify but do not write the rule file
    #[arg(long)]
    pub dry_run: bool,

    /// Write a JSON scan report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Some(Commands::Watch { interval, .. }) if *interval == 0 => {
                Err("Watch interval must be greater than 0".to_string())
            }
            Some(Commands::Probe { domains }) => {
                match domains.iter().find(|d| !is_valid_domain(d)) {
                    Some(bad) => Err(format!("Not a valid domain name: {}", bad)),
                    None => Ok(()),
                }
            }
            Some(Commands::Score { domains }) if domains.iter().any(|d| d.is_empty()) => {
                Err("Domain cannot be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}
