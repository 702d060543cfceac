use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::scanner::ScanReport;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,    // Only final summary
    Summary = 1,   // Stage progress (default)
    Detailed = 2,  // Per-domain results and warnings
    Debug = 3,     // Everything, including probe failures
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Default `tracing` filter directive for this level
    pub fn filter_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Silent => "error",
            VerbosityLevel::Summary => "warn",
            VerbosityLevel::Detailed => "adscanner=info",
            VerbosityLevel::Debug => "adscanner=debug",
        }
    }
}

/// Initialize the `tracing` subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init_tracing(verbosity: VerbosityLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.filter_directive()));
    // A second init (e.g. in tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Console logger for scan runs: timestamped messages, a probe progress bar,
/// and optional export of everything printed to a log file.
#[derive(Clone)]
pub struct ScanLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<Mutex<Option<ProgressBar>>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
    show_progress: bool,
}

fn new_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} probes {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}

impl ScanLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(Mutex::new(None)),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
            show_progress: verbosity != VerbosityLevel::Silent && atty::is(atty::Stream::Stderr),
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        // Errors are shown at every verbosity
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", self.get_timestamp(), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Print above the progress bar when one is active
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    /// Local wall-clock time with milliseconds
    fn get_timestamp(&self) -> String {
        Local::now().format(TIMESTAMP_FORMAT).to_string()
    }

    /// Set the progress bar position and length, starting the bar on the
    /// first update. No bar is shown when silent or when stderr is not a
    /// terminal.
    pub fn set_progress(&self, done: usize, total: usize) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            if guard.is_none() && self.show_progress {
                *guard = Some(new_progress_bar(total as u64));
            }
            if let Some(pb) = guard.as_ref() {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            }
        }
    }

    fn has_progress(&self) -> bool {
        self.progress_bar.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    pub fn finish_progress(&self) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    /// Final run summary on stdout
    pub fn print_scan_summary(&self, report: &ScanReport) {
        println!("\n=== SCAN SUMMARY ===");
        println!("Duration: {:.2}s", report.duration_secs);
        println!("Query Records: {}", report.records);
        println!("Candidates: {}", report.candidates);
        println!("Auto-blocked: {}", report.auto_blocked);
        println!("Deep-checked: {} ({} confirmed)", report.deep_checked, report.confirmed);
        println!("Ignored: {}", report.ignored);
        println!("Rules Added: {}", report.added_rules.len());
        println!("Total Rules: {}", report.total_rules);
        println!("====================\n");

        if self.verbosity >= VerbosityLevel::Detailed {
            for rule in &report.added_rules {
                println!("  + {}", rule);
            }
        }

        if let Some(err) = &report.source_error {
            println!("⚠️  Query log unavailable: {}", err);
        }
        if let Some(err) = &report.store_error {
            println!("⚠️  Rule store problem: {}", err);
        }

        if report.persisted {
            println!("✅ Scan completed. {} new rules written.", report.added_rules.len());
        } else if report.grew {
            println!("✅ Scan completed. {} new rules found (not written).", report.added_rules.len());
        } else {
            println!("✅ Scan completed. No new rules.");
        }
    }

    /// Export all collected logs to the configured file
    pub fn export_logs(&self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref log_file_path) = self.log_file_path {
            if let Ok(buffer) = self.log_buffer.lock() {
                if let Some(parent) = Path::new(log_file_path).parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log_file_path)?;

                for log_entry in buffer.iter() {
                    writeln!(file, "{}", log_entry)?;
                }

                file.flush()?;
            }
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.clear();
            }
        }
        Ok(())
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}
