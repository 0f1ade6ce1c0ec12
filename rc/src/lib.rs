//! RelayChain - strict sequential hand-off between worker threads
//!
//! N worker threads run their action in a fixed order (0, then 1, ..., then
//! N-1) using nothing but a shared cursor, a mutex and a condition variable.
//! Every wait is bounded, so a missing predecessor turns into a reported
//! timeout instead of a hang.
//!
//! # Core Concepts
//!
//! - **Cursor**: the id whose turn it is; `-1` before the chain is kicked, `N` when done
//! - **Broadcast Wake**: every change wakes all waiters, each re-checks its own predicate
//! - **Timeouts Are Values**: a missed turn is `Turn::TimedOut`, never an error
//! - **No Dangling Threads**: the coordinator joins every relay before reporting
//!
//! # Modules
//!
//! - [`state`] - Shared cursor, lock and wake signal
//! - [`relay`] - Per-worker protocol
//! - [`coordinator`] - Spawning, kick-off, completion wait and reporting
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod probe;
pub mod relay;
pub mod state;
pub mod transcript;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorConfig, ReportSummary, RunReport};
pub use error::RelayError;
pub use probe::{ExecutionProbe, ProbeGuard};
pub use relay::{LockPolicy, Relay, RelayPhase, RelaySettings};
pub use state::{NOT_STARTED, Outcome, SharedState, TimeoutPolicy, Turn, TurnGuard};
pub use transcript::{Observation, Transcript};

/// Default per-relay turn timeout (5s)
pub const DEFAULT_WORKER_TIMEOUT_MS: u64 = 5_000;

/// Default completion timeout (10s)
pub const DEFAULT_TOTAL_TIMEOUT_MS: u64 = 10_000;

/// Default simulated action duration (10ms)
pub const DEFAULT_WORK_MS: u64 = 10;

/// One symbol per worker id
pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";
