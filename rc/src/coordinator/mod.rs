//! Coordinator for a relay chain run
//!
//! The Coordinator is the composition root: it spawns one thread per relay,
//! kicks the cursor from `NOT_STARTED` to 0, waits for the cursor to reach the
//! chain length, and joins every relay before reporting.

mod config;
mod core;
mod report;

pub use config::CoordinatorConfig;
pub use self::core::Coordinator;
pub use report::{ReportSummary, RunReport};
