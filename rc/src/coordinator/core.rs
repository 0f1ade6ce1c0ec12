//! Coordinator implementation

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::probe::ExecutionProbe;
use crate::relay::{Relay, RelayPhase};
use crate::state::{Outcome, SharedState};
use crate::transcript::{Observation, Transcript};

use super::config::CoordinatorConfig;
use super::report::RunReport;

/// Spawns one relay thread per worker id, starts the chain and joins everything
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator, rejecting any config that cannot run
    pub fn new(config: CoordinatorConfig) -> Result<Self, RelayError> {
        debug!(?config, "Coordinator::new: called");
        config.validate()?;
        Ok(Self { config })
    }

    /// Run the chain to completion or timeout
    ///
    /// Every spawned relay is joined before this returns, whatever the
    /// outcome of the completion wait.
    pub fn run(&self) -> Result<RunReport, RelayError> {
        let workers = self.config.workers;
        info!(workers, absent = ?self.config.absent, kick = self.config.kick, "Coordinator::run: starting chain");
        let started = Instant::now();

        let state = Arc::new(SharedState::with_policy(self.config.timeout_policy));
        let transcript = Arc::new(Transcript::new());
        let probe = Arc::new(ExecutionProbe::new());
        let settings = self.config.relay_settings();
        let symbols = self.config.symbols();

        let relays = (0..workers)
            .filter(|id| !self.config.absent.contains(id))
            .map(|id| Relay::new(id, workers, symbols[id]))
            .collect::<Result<Vec<_>, _>>()?;

        let mut handles: Vec<(usize, JoinHandle<RelayPhase>)> = Vec::with_capacity(relays.len());
        let mut spawn_error = None;
        for relay in relays {
            let id = relay.id();
            debug!(id, symbol = %relay.symbol(), "Coordinator::run: spawning relay");
            let state = Arc::clone(&state);
            let transcript = Arc::clone(&transcript);
            let probe = Arc::clone(&probe);

            let spawned = thread::Builder::new()
                .name(format!("relay-{}", id))
                .spawn(move || relay.run(&state, &settings, &transcript, &probe));

            match spawned {
                Ok(handle) => handles.push((id, handle)),
                Err(source) => {
                    error!(id, error = %source, "Coordinator::run: failed to spawn relay");
                    spawn_error = Some(RelayError::Spawn { id, source });
                    break;
                }
            }
        }

        let completion = match spawn_error {
            Some(_) => Outcome::TimedOut,
            None => {
                if self.config.kick {
                    state.kick();
                } else {
                    debug!("Coordinator::run: kick disabled, chain stays at NOT_STARTED");
                }
                state.await_completion(workers, self.config.total_timeout())
            }
        };

        if completion == Outcome::TimedOut {
            warn!(
                cursor = state.cursor(),
                total = workers,
                "Coordinator::run: chain did not complete, waiting for relays to finish"
            );
        }

        let mut phases = BTreeMap::new();
        let mut panicked = None;
        for (id, handle) in handles {
            match handle.join() {
                Ok(phase) => {
                    phases.insert(id, phase);
                }
                Err(_) => {
                    error!(id, "Coordinator::run: relay panicked");
                    panicked.get_or_insert(id);
                }
            }
        }

        if let Some(err) = spawn_error {
            return Err(err);
        }
        if let Some(id) = panicked {
            return Err(RelayError::WorkerPanicked { id });
        }

        for id in state.skipped() {
            if !phases.contains_key(&id) {
                transcript.record(Observation::Skipped {
                    id,
                    symbol: symbols[id],
                });
            }
        }

        let report = RunReport {
            workers,
            observations: transcript.snapshot(),
            phases,
            completion,
            final_cursor: state.cursor(),
            cursor_history: state.history(),
            peak_concurrent: probe.peak(),
            elapsed: started.elapsed(),
        };

        info!(
            output = %report.render(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Coordinator::run: all relays joined"
        );
        Ok(report)
    }
}
