//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::error::RelayError;
use crate::relay::{LockPolicy, RelaySettings};
use crate::state::TimeoutPolicy;

/// Chain shape, timing, policies and symbols for a chain run
///
/// `workers`, `kick` and `absent` describe a single run and are set by the
/// caller; they are never read from a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorConfig {
    /// Chain length
    #[serde(skip, default = "default_workers")]
    pub workers: usize,

    /// How long each relay waits for its turn, in milliseconds
    #[serde(default = "default_worker_timeout_ms")]
    pub worker_timeout_ms: u64,

    /// How long the coordinator waits for the whole chain, in milliseconds
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,

    /// Simulated duration of each relay's action, in milliseconds
    #[serde(default = "default_work_ms")]
    pub work_ms: u64,

    /// Whether relays keep the lock during their action
    #[serde(default)]
    pub lock_policy: LockPolicy,

    /// What a relay does when its turn never arrives
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,

    /// One distinct symbol per worker id; bounds the worker count
    #[serde(default = "default_alphabet")]
    pub alphabet: String,

    /// Whether the coordinator starts the chain at all
    #[serde(skip, default = "default_kick")]
    pub kick: bool,

    /// Worker ids left unspawned, as if they had crashed
    #[serde(skip)]
    pub absent: BTreeSet<usize>,
}

fn default_workers() -> usize {
    1
}

fn default_worker_timeout_ms() -> u64 {
    debug!("default_worker_timeout_ms: called");
    crate::DEFAULT_WORKER_TIMEOUT_MS
}

fn default_total_timeout_ms() -> u64 {
    debug!("default_total_timeout_ms: called");
    crate::DEFAULT_TOTAL_TIMEOUT_MS
}

fn default_work_ms() -> u64 {
    debug!("default_work_ms: called");
    crate::DEFAULT_WORK_MS
}

fn default_alphabet() -> String {
    debug!("default_alphabet: called");
    crate::DEFAULT_ALPHABET.to_string()
}

fn default_kick() -> bool {
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            workers: default_workers(),
            worker_timeout_ms: crate::DEFAULT_WORKER_TIMEOUT_MS,
            total_timeout_ms: crate::DEFAULT_TOTAL_TIMEOUT_MS,
            work_ms: crate::DEFAULT_WORK_MS,
            lock_policy: LockPolicy::default(),
            timeout_policy: TimeoutPolicy::default(),
            alphabet: crate::DEFAULT_ALPHABET.to_string(),
            kick: default_kick(),
            absent: BTreeSet::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Default settings for a chain of `workers`
    pub fn for_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Get the per-relay turn timeout as a Duration
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    /// Get the completion timeout as a Duration
    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    /// Get the action duration as a Duration
    pub fn work_delay(&self) -> Duration {
        Duration::from_millis(self.work_ms)
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            worker_timeout: self.worker_timeout(),
            work_delay: self.work_delay(),
            lock_policy: self.lock_policy,
        }
    }

    /// Worker symbols in id order
    pub fn symbols(&self) -> Vec<char> {
        self.alphabet.chars().collect()
    }

    /// Largest worker count this alphabet can label
    pub fn max_workers(&self) -> usize {
        self.alphabet.chars().count()
    }

    /// Reject configurations that cannot describe a runnable chain
    ///
    /// Checks the alphabet, the worker count against it, and that every
    /// absent id names a worker of this chain.
    pub fn validate(&self) -> Result<(), RelayError> {
        debug!(workers = self.workers, alphabet = %self.alphabet, "CoordinatorConfig::validate: called");
        if self.alphabet.is_empty() {
            return Err(RelayError::EmptyAlphabet);
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.alphabet.chars().find(|c| !seen.insert(*c)) {
            return Err(RelayError::DuplicateSymbol(dup));
        }

        let max = self.max_workers();
        if self.workers == 0 || self.workers > max {
            return Err(RelayError::InvalidWorkerCount {
                count: self.workers,
                max,
            });
        }

        if let Some(&id) = self.absent.range(self.workers..).next() {
            return Err(RelayError::WorkerOutOfRange {
                id,
                total: self.workers,
            });
        }
        Ok(())
    }
}
