//! CLI argument parsing for relaychain

use clap::Parser;
use std::path::PathBuf;

use crate::relay::LockPolicy;
use crate::state::TimeoutPolicy;

/// RelayChain - run N workers in strict id order
#[derive(Parser, Debug)]
#[command(
    name = "rc",
    author,
    version,
    about = "Run N worker threads that hand off to each other in strict id order",
    after_help = "Logs are written to: ~/.local/share/relaychain/logs/relaychain.log"
)]
pub struct Cli {
    /// Number of workers in the chain
    #[arg(value_name = "N")]
    pub workers: usize,

    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// How long each worker waits for its turn
    #[arg(long, value_name = "MS")]
    pub worker_timeout_ms: Option<u64>,

    /// How long to wait for the whole chain
    #[arg(long, value_name = "MS")]
    pub total_timeout_ms: Option<u64>,

    /// Simulated duration of each worker's action
    #[arg(long, value_name = "MS")]
    pub work_ms: Option<u64>,

    /// Keep the lock during each worker's action (hold) or not (release)
    #[arg(long)]
    pub lock_policy: Option<LockPolicy>,

    /// What a worker does when its turn never comes (stall, skip)
    #[arg(long)]
    pub timeout_policy: Option<TimeoutPolicy>,

    /// Never start the chain; every worker times out
    #[arg(long)]
    pub no_kick: bool,

    /// Do not spawn this worker id (repeatable)
    #[arg(long = "absent", value_name = "ID")]
    pub absent: Vec<usize>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for the run result
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_workers() {
        let cli = Cli::parse_from(["rc", "4"]);
        assert_eq!(cli.workers, 4);
        assert!(cli.config.is_none());
        assert!(!cli.no_kick);
        assert!(cli.absent.is_empty());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_requires_workers() {
        assert!(Cli::try_parse_from(["rc"]).is_err());
    }

    #[test]
    fn test_cli_rejects_malformed_workers() {
        assert!(Cli::try_parse_from(["rc", "four"]).is_err());
        assert!(Cli::try_parse_from(["rc", "-3"]).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "rc",
            "--worker-timeout-ms",
            "20",
            "--total-timeout-ms",
            "40",
            "--work-ms",
            "0",
            "--lock-policy",
            "hold",
            "--timeout-policy",
            "skip",
            "--no-kick",
            "--absent",
            "1",
            "--absent",
            "2",
            "-f",
            "json",
            "3",
        ]);
        assert_eq!(cli.workers, 3);
        assert_eq!(cli.worker_timeout_ms, Some(20));
        assert_eq!(cli.total_timeout_ms, Some(40));
        assert_eq!(cli.work_ms, Some(0));
        assert_eq!(cli.lock_policy, Some(LockPolicy::Hold));
        assert_eq!(cli.timeout_policy, Some(TimeoutPolicy::Skip));
        assert!(cli.no_kick);
        assert_eq!(cli.absent, vec![1, 2]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["rc", "-c", "/path/to/config.yml", "2"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
