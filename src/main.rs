use anyhow::Result;
use clap::Parser;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use adscanner::cli::{Cli, Commands, ScanArgs};
use adscanner::config::{self, AppConfig};
use adscanner::log_source::{AdGuardLogSource, LogSource, StaticLogSource};
use adscanner::logger::{self, ScanLogger, VerbosityLevel};
use adscanner::pool::ProgressFn;
use adscanner::rule_store::FileRuleStore;
use adscanner::scanner::{export_report, RunOptions, Scanner};
use adscanner::scorer::StaticScorer;
use adscanner::verifier::VerificationDispatcher;

/// Set by the Ctrl-C handler; watch mode stops after the current scan
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.validate() {
        eprintln!("❌ Invalid arguments: {}", e);
        std::process::exit(2);
    }

    let verbosity = if cli.quiet {
        VerbosityLevel::Silent
    } else {
        VerbosityLevel::from_verbose_count(cli.verbose)
    };
    logger::init_tracing(verbosity);
    let logger = match &cli.log_file {
        Some(path) => ScanLogger::with_log_file(verbosity, path.clone()),
        None => ScanLogger::new(verbosity),
    };

    // Handle --init before loading anything
    if cli.init {
        match AppConfig::create_default_config(&cli.config) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run adscanner again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let app_config = match AppConfig::load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => {
            match AppConfig::prompt_create_config(&path) {
                Ok(Some(created_path)) => {
                    println!("✅ Created default configuration file at: {}", created_path.display());
                    println!("   Edit this file to customize settings, then run adscanner again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("❌ Configuration file not found at: {}", path.display());
                    eprintln!("   Run with --init to create a default configuration file.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("❌ Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Commands::Scan(ScanArgs::default()));
    let result = match command {
        Commands::Scan(args) => {
            let scanner = Scanner::from_config(&app_config)?;
            run_scan(&scanner, &app_config, &args, &logger).await
        }
        Commands::Watch { interval, scan } => run_watch(&app_config, &scan, interval, &logger).await,
        Commands::Score { domains } => {
            print_scores(&app_config, &domains);
            Ok(())
        }
        Commands::Probe { domains } => run_probes(&app_config, &domains).await,
    };

    if logger.is_log_export_enabled() {
        if let Err(e) = logger.export_logs() {
            eprintln!("⚠️  Failed to export logs: {}", e);
        }
    }

    result
}

fn build_source(config: &AppConfig, args: &ScanArgs) -> Result<Box<dyn LogSource>> {
    match &args.input {
        Some(path) => Ok(Box::new(StaticLogSource::from_file(path)?)),
        None => Ok(Box::new(AdGuardLogSource::new(&config.log_source)?)),
    }
}

async fn run_scan(scanner: &Scanner, config: &AppConfig, args: &ScanArgs, logger: &ScanLogger) -> Result<()> {
    let source = build_source(config, args)?;
    let store = FileRuleStore::new(&config.rules.path);

    match &args.input {
        Some(path) => logger.info(&format!("Scanning query log file {}", path.display())),
        None => logger.info(&format!("Scanning query log at {}", config.log_source.url)),
    }

    let progress_logger = logger.clone();
    // The bar appears with the first probe result, not during the fetch
    let update_progress = move |done: usize, total: usize| progress_logger.set_progress(done, total);
    let progress: &ProgressFn = &update_progress;

    let options = RunOptions {
        dry_run: args.dry_run,
        progress: Some(progress),
    };
    let (_, report) = scanner.run_once(source.as_ref(), &store, options).await;
    logger.finish_progress();

    if let Some(err) = &report.source_error {
        logger.warn(&format!("Query log unavailable: {}", err));
    }
    if let Some(err) = &report.store_error {
        logger.warn(&format!("Rule store problem: {}", err));
    }
    if report.persisted {
        logger.info(&format!("Rule file updated: {}", store.path().display()));
    }

    logger.print_scan_summary(&report);

    if let Some(path) = &args.report {
        match export_report(&report, path) {
            Ok(()) => logger.info(&format!("Report exported: {}", path.display())),
            Err(e) => logger.error(&format!("Failed to export report: {:#}", e)),
        }
    }

    Ok(())
}

async fn run_watch(config: &AppConfig, args: &ScanArgs, interval: u64, logger: &ScanLogger) -> Result<()> {
    ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
        eprintln!("\n⚠️  Interrupt received. Stopping after the current scan...");
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupts will stop the process immediately.", e);
    });

    let scanner = Scanner::from_config(config)?;
    logger.info(&format!("Watching query log every {}s (Ctrl-C to stop)", interval));

    let mut runs = 0u64;
    while !is_interrupted() {
        runs += 1;
        logger.debug(&format!("Starting scan #{}", runs));
        if let Err(e) = run_scan(&scanner, config, args, logger).await {
            logger.error(&format!("Scan #{} failed: {:#}", runs, e));
        }
        if logger.is_log_export_enabled() {
            if let Err(e) = logger.export_logs() {
                eprintln!("⚠️  Failed to export logs: {}", e);
            }
        }

        // Sleep in short steps so an interrupt is noticed promptly
        for _ in 0..interval {
            if is_interrupted() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    logger.info(&format!("Stopped after {} scans", runs));
    Ok(())
}

fn print_scores(config: &AppConfig, domains: &[String]) {
    let scorer = StaticScorer::new(config.scoring.clone(), config.lists.clone());

    for domain in domains {
        let breakdown = scorer.explain(domain);
        let disposition = config.bands.route(breakdown.score);
        println!("{}: {} ({})", domain, breakdown.score, disposition);
        for hit in &breakdown.hits {
            println!("    {:+4}  {:<16} {}", hit.points, hit.rule.to_string(), hit.detail);
        }
    }
}

async fn run_probes(config: &AppConfig, domains: &[String]) -> Result<()> {
    let dispatcher = VerificationDispatcher::from_config(&config.probe, &config.pool)?;
    let batch: BTreeSet<String> = domains.iter().cloned().collect();

    let mut report = dispatcher.verify(&batch, None).await;
    report.outcomes.sort_by(|a, b| a.domain.cmp(&b.domain));

    for outcome in &report.outcomes {
        if outcome.confirmed {
            println!("✅ {}: tracking pixel", outcome.domain);
        } else {
            println!("❌ {}: not confirmed", outcome.domain);
        }
    }
    if report.stats.failed > 0 {
        eprintln!("⚠️  {} probes failed without an outcome", report.stats.failed);
    }

    Ok(())
}
