//! RelayChain - sequential hand-off runner
//!
//! CLI entry point: parses the worker count, runs the chain and prints the
//! ordered output line.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use relaychain::cli::{Cli, OutputFormat};
use relaychain::config::Config;
use relaychain::coordinator::{Coordinator, CoordinatorConfig};

fn parse_level(s: &str) -> Option<tracing::Level> {
    match s.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relaychain")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("relaychain.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_thread_names(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Apply the run shape and command-line overrides on top of the loaded chain config
fn apply_overrides(mut chain: CoordinatorConfig, cli: &Cli) -> CoordinatorConfig {
    chain.workers = cli.workers;
    chain.kick = !cli.no_kick;
    chain.absent = cli.absent.iter().copied().collect();
    if let Some(ms) = cli.worker_timeout_ms {
        chain.worker_timeout_ms = ms;
    }
    if let Some(ms) = cli.total_timeout_ms {
        chain.total_timeout_ms = ms;
    }
    if let Some(ms) = cli.work_ms {
        chain.work_ms = ms;
    }
    if let Some(policy) = cli.lock_policy {
        chain.lock_policy = policy;
    }
    if let Some(policy) = cli.timeout_policy {
        chain.timeout_policy = policy;
    }
    chain
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let chain = apply_overrides(config.chain, &cli);
    debug!(?chain, "main: effective chain config");

    let coordinator = match Coordinator::new(chain) {
        Ok(coordinator) => coordinator,
        Err(e) if e.is_argument_error() => {
            eprintln!("{} {}", "✗".red(), e);
            eprintln!("Run 'rc --help' for usage");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let report = coordinator.run().context("Chain run failed")?;

    match cli.format {
        OutputFormat::Text => println!("{}", report.render()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.summary())?),
    }

    if report.completed() {
        info!(elapsed_ms = report.elapsed.as_millis() as u64, "relaychain finished");
    } else {
        let missing: Vec<String> = report.missing().iter().map(|id| id.to_string()).collect();
        eprintln!(
            "{} Chain stopped at cursor {} of {}; never ran: {}",
            "✗".red(),
            report.final_cursor.to_string().yellow(),
            report.workers,
            missing.join(", ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaychain::{LockPolicy, TimeoutPolicy};

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level("Warning"), Some(tracing::Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::parse_from([
            "rc",
            "--work-ms",
            "0",
            "--lock-policy",
            "hold",
            "--timeout-policy",
            "skip",
            "--no-kick",
            "--absent",
            "2",
            "3",
        ]);
        let chain = apply_overrides(CoordinatorConfig::default(), &cli);

        assert_eq!(chain.workers, 3);
        assert!(!chain.kick);
        assert_eq!(chain.absent.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(chain.work_ms, 0);
        assert_eq!(chain.lock_policy, LockPolicy::Hold);
        assert_eq!(chain.timeout_policy, TimeoutPolicy::Skip);
        assert_eq!(chain.worker_timeout_ms, relaychain::DEFAULT_WORKER_TIMEOUT_MS);
    }
}
