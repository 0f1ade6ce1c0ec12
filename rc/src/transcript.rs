//! Ordered record of what each relay did

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// One observable event from a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Observation {
    /// The relay ran its action
    Executed { id: usize, symbol: char },
    /// The relay gave up waiting for its turn
    TimedOut { id: usize, symbol: char },
    /// The relay's slot was passed over by the skip policy
    Skipped { id: usize, symbol: char },
}

impl Observation {
    pub fn id(&self) -> usize {
        match self {
            Self::Executed { id, .. } | Self::TimedOut { id, .. } | Self::Skipped { id, .. } => *id,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Self::Executed { symbol, .. } | Self::TimedOut { symbol, .. } | Self::Skipped { symbol, .. } => *symbol,
        }
    }
}

/// Append-only, thread-safe observation log
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Mutex<Vec<Observation>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, observation: Observation) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observation);
    }

    /// Copy of every observation in recording order
    pub fn snapshot(&self) -> Vec<Observation> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Symbols of executed relays in execution order
    pub fn executed_symbols(&self) -> String {
        self.snapshot()
            .iter()
            .filter(|o| matches!(o, Observation::Executed { .. }))
            .map(Observation::symbol)
            .collect()
    }
}
