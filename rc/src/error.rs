//! Relay chain error types
//!
//! Timeouts are not errors: a missed turn is `Turn::TimedOut`, a missed
//! completion is `Outcome::TimedOut`. Everything here is either a caller
//! mistake caught before any thread starts, or an infrastructure failure.

use thiserror::Error;

/// Errors that can occur while building or running a relay chain
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Worker count must be between 1 and {max}, got {count}")]
    InvalidWorkerCount { count: usize, max: usize },

    #[error("Worker id {id} is out of range for a chain of {total}")]
    WorkerOutOfRange { id: usize, total: usize },

    #[error("Alphabet must contain at least one symbol")]
    EmptyAlphabet,

    #[error("Alphabet contains symbol '{0}' more than once")]
    DuplicateSymbol(char),

    #[error("Failed to spawn worker {id}")]
    Spawn {
        id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {id} panicked")]
    WorkerPanicked { id: usize },
}

impl RelayError {
    /// Check if this error comes from bad arguments rather than a failed run
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidWorkerCount { .. }
                | RelayError::WorkerOutOfRange { .. }
                | RelayError::EmptyAlphabet
                | RelayError::DuplicateSymbol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_worker_count_message() {
        let err = RelayError::InvalidWorkerCount { count: 30, max: 26 };

        let msg = err.to_string();
        assert!(msg.contains("30"));
        assert!(msg.contains("26"));
    }

    #[test]
    fn test_is_argument_error() {
        assert!(RelayError::InvalidWorkerCount { count: 0, max: 26 }.is_argument_error());
        assert!(RelayError::WorkerOutOfRange { id: 4, total: 4 }.is_argument_error());
        assert!(RelayError::EmptyAlphabet.is_argument_error());
        assert!(RelayError::DuplicateSymbol('a').is_argument_error());

        assert!(!RelayError::WorkerPanicked { id: 1 }.is_argument_error());
        assert!(
            !RelayError::Spawn {
                id: 0,
                source: std::io::Error::other("no threads left"),
            }
            .is_argument_error()
        );
    }
}
