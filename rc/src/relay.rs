//! A single worker in the chain
//!
//! Each relay waits for the cursor to reach its id, runs its action, and hands
//! the turn on. The phases are:
//!
//! ```text
//! WaitingForTurn -> Executing -> Completed
//!        |
//!        +-> TimedOut
//! ```
//!
//! A timed out relay never advances the cursor.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::probe::ExecutionProbe;
use crate::state::{SharedState, Turn};
use crate::transcript::{Observation, Transcript};

/// Whether the lock stays held while a relay runs its action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockPolicy {
    /// Release the lock before the action, keep only the turn
    #[default]
    Release,
    /// Keep the lock across the action; other waiters cannot re-check until it ends
    Hold,
}

impl std::str::FromStr for LockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "release" => Ok(Self::Release),
            "hold" => Ok(Self::Hold),
            _ => Err(format!("Unknown lock policy: {}. Use: release or hold", s)),
        }
    }
}

impl std::fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Hold => write!(f, "hold"),
        }
    }
}

/// Timing and locking shared by every relay in a run
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// How long to wait for this relay's turn
    pub worker_timeout: Duration,

    /// Simulated duration of the action
    pub work_delay: Duration,

    pub lock_policy: LockPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_millis(crate::DEFAULT_WORKER_TIMEOUT_MS),
            work_delay: Duration::from_millis(crate::DEFAULT_WORK_MS),
            lock_policy: LockPolicy::Release,
        }
    }
}

/// Terminal phase of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayPhase {
    /// Ran its action and advanced the cursor
    Completed,
    /// Gave up waiting; never executed
    TimedOut,
}

/// Worker bound to one position in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relay {
    id: usize,
    symbol: char,
}

impl Relay {
    /// Create the relay for position `id` of a chain of `total`
    pub fn new(id: usize, total: usize, symbol: char) -> Result<Self, RelayError> {
        if id >= total {
            return Err(RelayError::WorkerOutOfRange { id, total });
        }
        Ok(Self { id, symbol })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn symbol(&self) -> char {
        self.symbol
    }

    /// Wait for this relay's turn, run the action, and hand the turn on
    pub fn run(
        &self,
        state: &SharedState,
        settings: &RelaySettings,
        transcript: &Transcript,
        probe: &ExecutionProbe,
    ) -> RelayPhase {
        debug!(id = self.id, symbol = %self.symbol, "Relay::run: called");

        let mut turn = match state.await_turn(self.id, settings.worker_timeout) {
            Turn::Proceeded(turn) => turn,
            Turn::TimedOut => {
                warn!(id = self.id, timeout = ?settings.worker_timeout, "Relay::run: turn never came");
                transcript.record(Observation::TimedOut {
                    id: self.id,
                    symbol: self.symbol,
                });
                return RelayPhase::TimedOut;
            }
        };

        if settings.lock_policy == LockPolicy::Release {
            turn.release();
        }

        let passed_over = turn.passed_over();
        if !passed_over.is_empty() {
            warn!(id = self.id, ?passed_over, "Relay::run: skipped absent predecessors");
        }
        debug!(id = self.id, "Relay::run: proceeding");

        {
            let _executing = probe.enter();
            transcript.record(Observation::Executed {
                id: self.id,
                symbol: self.symbol,
            });
            if !settings.work_delay.is_zero() {
                thread::sleep(settings.work_delay);
            }
        }

        turn.advance();
        info!(id = self.id, symbol = %self.symbol, "Relay completed");
        RelayPhase::Completed
    }
}
