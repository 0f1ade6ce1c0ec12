//! Result of a chain run and its textual rendering

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay::RelayPhase;
use crate::state::Outcome;
use crate::transcript::Observation;

/// Everything observed during one run of the chain
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Chain length
    pub workers: usize,

    /// Observations in the order they happened
    pub observations: Vec<Observation>,

    /// Terminal phase of every spawned relay
    pub phases: BTreeMap<usize, RelayPhase>,

    /// Result of the coordinator's completion wait
    pub completion: Outcome,

    /// Cursor after every relay was joined
    pub final_cursor: i64,

    /// Every value the cursor held
    pub cursor_history: Vec<i64>,

    /// Most relays ever executing at once
    pub peak_concurrent: usize,

    pub elapsed: Duration,
}

/// Flat view of a report for JSON output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub output: String,
    pub completed: bool,
    pub final_cursor: i64,
    pub executed: Vec<usize>,
    pub timed_out: Vec<usize>,
    pub skipped: Vec<usize>,
    pub missing: Vec<usize>,
    pub peak_concurrent: usize,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Whether the cursor reached the chain length in time
    pub fn completed(&self) -> bool {
        self.completion == Outcome::Proceeded
    }

    /// Ids that executed, in execution order
    pub fn executed(&self) -> Vec<usize> {
        self.observations
            .iter()
            .filter(|o| matches!(o, Observation::Executed { .. }))
            .map(Observation::id)
            .collect()
    }

    /// Ids that gave up waiting, ascending
    pub fn timed_out(&self) -> Vec<usize> {
        self.ids_where(|o| matches!(o, Observation::TimedOut { .. }))
    }

    /// Ids passed over by the skip policy, ascending
    pub fn skipped(&self) -> Vec<usize> {
        self.ids_where(|o| matches!(o, Observation::Skipped { .. }))
    }

    /// Ids that never executed, ascending
    pub fn missing(&self) -> Vec<usize> {
        let executed = self.executed();
        (0..self.workers).filter(|id| !executed.contains(id)).collect()
    }

    fn ids_where(&self, pred: impl Fn(&Observation) -> bool) -> Vec<usize> {
        let mut ids: Vec<_> = self.markers(pred).iter().map(Observation::id).collect();
        ids.dedup();
        ids
    }

    fn markers(&self, pred: impl Fn(&Observation) -> bool) -> Vec<Observation> {
        let mut found: Vec<_> = self.observations.iter().filter(|o| pred(*o)).copied().collect();
        found.sort_by_key(Observation::id);
        found
    }

    /// Observable output line
    ///
    /// Executed symbols in order, then `<sym>:skipped`, `<sym>:timeout` and
    /// `run:timeout` markers separated by spaces.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        let executed: String = self
            .observations
            .iter()
            .filter(|o| matches!(o, Observation::Executed { .. }))
            .map(Observation::symbol)
            .collect();
        if !executed.is_empty() {
            parts.push(executed);
        }

        for obs in self.markers(|o| matches!(o, Observation::Skipped { .. })) {
            parts.push(format!("{}:skipped", obs.symbol()));
        }
        for obs in self.markers(|o| matches!(o, Observation::TimedOut { .. })) {
            parts.push(format!("{}:timeout", obs.symbol()));
        }
        if !self.completed() {
            parts.push("run:timeout".to_string());
        }

        parts.join(" ")
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            output: self.render(),
            completed: self.completed(),
            final_cursor: self.final_cursor,
            executed: self.executed(),
            timed_out: self.timed_out(),
            skipped: self.skipped(),
            missing: self.missing(),
            peak_concurrent: self.peak_concurrent,
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}
