//! Shared cursor state for the relay chain
//!
//! A single integer cursor names the worker whose turn it is. It lives behind
//! a `Mutex` paired with a `Condvar`; every change is followed by a broadcast
//! and every waiter re-checks its own predicate after waking, so spurious and
//! foreign wakes are harmless.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cursor value before the chain is kicked
pub const NOT_STARTED: i64 = -1;

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The predicate held before the deadline
    Proceeded,
    /// The deadline passed first
    TimedOut,
}

/// What a waiter does when its deadline expires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutPolicy {
    /// Give up; every successor stalls behind the missing turn
    #[default]
    Stall,
    /// Pass over absent predecessors when nobody lower is still alive
    Skip,
}

impl std::str::FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stall" => Ok(Self::Stall),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("Unknown timeout policy: {}. Use: stall or skip", s)),
        }
    }
}

impl std::fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stall => write!(f, "stall"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// State protected by the lock
#[derive(Debug)]
struct Inner {
    /// Whose turn it is; `NOT_STARTED` until kicked
    cursor: i64,

    /// Every value the cursor has held, in order
    history: Vec<i64>,

    /// Ids currently blocked in `await_turn`
    waiting: BTreeSet<usize>,

    /// Id that observed its turn and has not advanced yet
    active: Option<usize>,

    /// Ids passed over by the skip policy
    skipped: Vec<usize>,
}

impl Inner {
    fn set_cursor(&mut self, value: i64) {
        self.cursor = value;
        self.history.push(value);
    }
}

/// Cursor, lock and wake signal shared by the coordinator and every relay
#[derive(Debug)]
pub struct SharedState {
    policy: TimeoutPolicy,
    inner: Mutex<Inner>,
    wake: Condvar,
}

/// Result of waiting for a worker's turn
#[derive(Debug)]
pub enum Turn<'a> {
    /// The cursor reached this id; the guard still holds the lock
    Proceeded(TurnGuard<'a>),
    /// The deadline passed; the lock has been released
    TimedOut,
}

/// Proof that a worker holds the current turn
///
/// Holds the lock until `release` is called. `advance` consumes the guard, so
/// a turn is handed on at most once. While the lock is held, calling any
/// other `SharedState` method from the same thread deadlocks.
#[derive(Debug)]
pub struct TurnGuard<'a> {
    state: &'a SharedState,
    id: usize,
    passed_over: Range<usize>,
    guard: Option<MutexGuard<'a, Inner>>,
}

impl SharedState {
    /// Create an unstarted chain using the stall policy
    pub fn new() -> Self {
        Self::with_policy(TimeoutPolicy::Stall)
    }

    /// Create an unstarted chain with an explicit timeout policy
    pub fn with_policy(policy: TimeoutPolicy) -> Self {
        debug!(%policy, "SharedState::with_policy: called");
        Self {
            policy,
            inner: Mutex::new(Inner {
                cursor: NOT_STARTED,
                history: vec![NOT_STARTED],
                waiting: BTreeSet::new(),
                active: None,
                skipped: Vec::new(),
            }),
            wake: Condvar::new(),
        }
    }

    /// The timeout policy this state was built with
    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The cursor is a plain integer, a panic elsewhere cannot tear it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the chain by moving the cursor from `NOT_STARTED` to 0
    ///
    /// Returns false if the chain was already started.
    pub fn kick(&self) -> bool {
        debug!("SharedState::kick: called");
        let mut inner = self.lock();
        if inner.cursor != NOT_STARTED {
            let cursor = inner.cursor;
            drop(inner);
            debug!(cursor, "SharedState::kick: already started");
            return false;
        }
        inner.set_cursor(0);
        drop(inner);

        self.wake.notify_all();
        true
    }

    /// Block until the cursor equals `id` or `timeout` elapses
    pub fn await_turn(&self, id: usize, timeout: Duration) -> Turn<'_> {
        debug!(id, ?timeout, "SharedState::await_turn: called");
        let expected = id as i64;
        let mut inner = self.lock();
        inner.waiting.insert(id);

        let mut deadline = Instant::now() + timeout;
        let mut armed_at = inner.cursor;
        let mut passed_over = 0..0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (guard, _) = self
                .wake
                .wait_timeout_while(inner, remaining, |i| i.cursor != expected)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;

            if inner.cursor == expected {
                break;
            }

            // A wait can also return early; only a passed deadline counts
            let now = Instant::now();
            if now < deadline {
                continue;
            }

            let cursor = inner.cursor;
            if self.policy == TimeoutPolicy::Stall || cursor > expected {
                inner.waiting.remove(&id);
                drop(inner);
                warn!(id, cursor, "SharedState::await_turn: timed out");
                return Turn::TimedOut;
            }

            // Skip policy from here on. Only the coordinator starts the chain.
            if cursor == NOT_STARTED {
                inner.waiting.remove(&id);
                drop(inner);
                warn!(id, "SharedState::await_turn: timed out, chain never started");
                return Turn::TimedOut;
            }

            let progressed = cursor != armed_at;
            if progressed || (inner.active.is_none() && inner.waiting.range(..id).next().is_some()) {
                deadline = now + timeout;
                armed_at = cursor;
                drop(inner);
                debug!(id, progressed, "SharedState::await_turn: chain still moving, re-arming");
                inner = self.lock();
                continue;
            }

            if let Some(active) = inner.active {
                inner.waiting.remove(&id);
                drop(inner);
                warn!(id, active, "SharedState::await_turn: timed out behind a stuck turn");
                return Turn::TimedOut;
            }

            passed_over = cursor as usize..id;
            inner.skipped.extend(passed_over.clone());
            inner.set_cursor(expected);
            break;
        }

        inner.waiting.remove(&id);
        inner.active = Some(id);
        Turn::Proceeded(TurnGuard {
            state: self,
            id,
            passed_over,
            guard: Some(inner),
        })
    }

    /// Block until the cursor equals `total` or `timeout` elapses
    pub fn await_completion(&self, total: usize, timeout: Duration) -> Outcome {
        debug!(total, ?timeout, "SharedState::await_completion: called");
        let expected = total as i64;
        let inner = self.lock();
        let (inner, result) = self
            .wake
            .wait_timeout_while(inner, timeout, |i| i.cursor != expected)
            .unwrap_or_else(PoisonError::into_inner);
        let cursor = inner.cursor;
        drop(inner);

        if result.timed_out() && cursor != expected {
            warn!(total, cursor, "SharedState::await_completion: timed out");
            Outcome::TimedOut
        } else {
            Outcome::Proceeded
        }
    }

    /// Broadcast a wake without changing any state
    ///
    /// Every waiter re-checks its predicate and goes back to sleep.
    pub fn wake_all(&self) {
        self.wake.notify_all();
    }

    /// Current cursor value
    pub fn cursor(&self) -> i64 {
        self.lock().cursor
    }

    /// Every cursor value so far, starting with `NOT_STARTED`
    pub fn history(&self) -> Vec<i64> {
        self.lock().history.clone()
    }

    /// Ids passed over by the skip policy, in ascending order
    pub fn skipped(&self) -> Vec<usize> {
        self.lock().skipped.clone()
    }

    /// Id currently holding its turn, if any
    pub fn active(&self) -> Option<usize> {
        self.lock().active
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnGuard<'_> {
    /// Worker id that owns this turn
    pub fn id(&self) -> usize {
        self.id
    }

    /// Absent predecessors the skip policy jumped over to reach this turn
    pub fn passed_over(&self) -> Range<usize> {
        self.passed_over.clone()
    }

    /// Whether the lock is still held
    pub fn holds_lock(&self) -> bool {
        self.guard.is_some()
    }

    /// Drop the lock early while keeping the turn
    pub fn release(&mut self) {
        self.guard = None;
        debug!(id = self.id, "TurnGuard::release: lock dropped");
    }

    /// Hand the turn to the next worker and wake every waiter
    pub fn advance(mut self) {
        let mut inner = match self.guard.take() {
            Some(guard) => guard,
            None => self.state.lock(),
        };
        let next = inner.cursor + 1;
        inner.set_cursor(next);
        inner.active = None;
        drop(inner);

        self.state.wake.notify_all();
        debug!(id = self.id, next, "TurnGuard::advance: handed on");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(5);

    #[test]
    fn test_new_state_not_started() {
        let state = SharedState::new();
        assert_eq!(state.cursor(), NOT_STARTED);
        assert_eq!(state.history(), vec![NOT_STARTED]);
        assert_eq!(state.active(), None);
        assert_eq!(state.policy(), TimeoutPolicy::Stall);
    }

    #[test]
    fn test_kick_only_once() {
        let state = SharedState::new();
        assert!(state.kick());
        assert!(!state.kick());
        assert_eq!(state.cursor(), 0);
        assert_eq!(state.history(), vec![-1, 0]);
    }

    #[test]
    fn test_await_turn_times_out_when_not_started() {
        let state = SharedState::new();
        let start = Instant::now();

        assert!(matches!(state.await_turn(0, SHORT), Turn::TimedOut));
        assert!(start.elapsed() >= SHORT);
        assert_eq!(state.cursor(), NOT_STARTED);
    }

    #[test]
    fn test_turn_guard_holds_lock_until_released() {
        let state = SharedState::new();
        state.kick();

        let Turn::Proceeded(mut turn) = state.await_turn(0, SHORT) else {
            panic!("Expected turn 0 to proceed");
        };
        assert_eq!(turn.id(), 0);
        assert!(turn.holds_lock());

        turn.release();
        assert!(!turn.holds_lock());
        assert_eq!(state.active(), Some(0));

        turn.advance();
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.active(), None);
    }

    #[test]
    fn test_advance_with_lock_held() {
        let state = SharedState::new();
        state.kick();

        match state.await_turn(0, SHORT) {
            Turn::Proceeded(turn) => turn.advance(),
            Turn::TimedOut => panic!("Expected turn 0 to proceed"),
        }

        assert_eq!(state.cursor(), 1);
        assert_eq!(state.history(), vec![-1, 0, 1]);
    }

    #[test]
    fn test_wrong_id_times_out() {
        let state = SharedState::new();
        state.kick();

        assert!(matches!(state.await_turn(1, SHORT), Turn::TimedOut));
        assert_eq!(state.cursor(), 0);
    }

    #[test]
    fn test_await_completion() {
        let state = SharedState::new();
        assert_eq!(state.await_completion(1, SHORT), Outcome::TimedOut);

        state.kick();
        if let Turn::Proceeded(turn) = state.await_turn(0, SHORT) {
            turn.advance();
        }

        assert_eq!(state.await_completion(1, SHORT), Outcome::Proceeded);
        // Re-observing the final state yields the same value
        assert_eq!(state.await_completion(1, SHORT), Outcome::Proceeded);
        assert_eq!(state.cursor(), 1);
    }

    #[test]
    fn test_waiter_wakes_on_advance_from_other_thread() {
        let state = Arc::new(SharedState::new());

        let waiter = {
            let state = Arc::clone(&state);
            thread::spawn(move || match state.await_turn(1, LONG) {
                Turn::Proceeded(turn) => {
                    turn.advance();
                    true
                }
                Turn::TimedOut => false,
            })
        };

        state.kick();
        if let Turn::Proceeded(turn) = state.await_turn(0, LONG) {
            turn.advance();
        }

        assert!(waiter.join().expect("waiter panicked"));
        assert_eq!(state.cursor(), 2);
    }

    #[test]
    fn test_spurious_wakes_do_not_release_waiter() {
        let state = Arc::new(SharedState::new());

        let waiter = {
            let state = Arc::clone(&state);
            thread::spawn(move || matches!(state.await_turn(0, Duration::from_millis(200)), Turn::TimedOut))
        };

        for _ in 0..50 {
            state.wake_all();
            thread::sleep(Duration::from_millis(1));
        }

        assert!(waiter.join().expect("waiter panicked"));
        assert_eq!(state.cursor(), NOT_STARTED);
    }

    #[test]
    fn test_skip_policy_lowest_waiter_jumps() {
        let state = SharedState::with_policy(TimeoutPolicy::Skip);
        state.kick();

        // Worker 0 never shows up; worker 1 is the lowest waiter
        match state.await_turn(1, SHORT) {
            Turn::Proceeded(turn) => {
                assert_eq!(turn.passed_over(), 0..1);
                turn.advance();
            }
            Turn::TimedOut => panic!("Expected skip policy to proceed"),
        }

        assert_eq!(state.skipped(), vec![0]);
        assert_eq!(state.cursor(), 2);
        assert_eq!(state.history(), vec![-1, 0, 1, 2]);
    }

    #[test]
    fn test_skip_policy_never_starts_the_chain() {
        let state = Arc::new(SharedState::with_policy(TimeoutPolicy::Skip));

        let waiters: Vec<_> = (0..3)
            .map(|id| {
                let state = Arc::clone(&state);
                thread::spawn(move || matches!(state.await_turn(id, SHORT), Turn::TimedOut))
            })
            .collect();

        for waiter in waiters {
            assert!(waiter.join().expect("waiter panicked"));
        }
        assert_eq!(state.cursor(), NOT_STARTED);
        assert_eq!(state.history(), vec![NOT_STARTED]);
        assert!(state.skipped().is_empty());
    }

    #[test]
    fn test_regular_turn_passes_over_nothing() {
        let state = SharedState::with_policy(TimeoutPolicy::Skip);
        state.kick();

        let Turn::Proceeded(turn) = state.await_turn(0, SHORT) else {
            panic!("Expected turn 0 to proceed");
        };
        assert!(turn.passed_over().is_empty());
        turn.advance();
    }

    #[test]
    fn test_skip_policy_never_skips_active_turn() {
        let state = Arc::new(SharedState::with_policy(TimeoutPolicy::Skip));
        state.kick();

        let Turn::Proceeded(mut turn) = state.await_turn(0, SHORT) else {
            panic!("Expected turn 0 to proceed");
        };
        turn.release();

        let waiter = {
            let state = Arc::clone(&state);
            thread::spawn(move || matches!(state.await_turn(1, SHORT), Turn::TimedOut))
        };

        assert!(waiter.join().expect("waiter panicked"));
        turn.advance();

        assert!(state.skipped().is_empty());
        assert_eq!(state.cursor(), 1);
    }

    #[test]
    fn test_stall_policy_does_not_skip() {
        let state = SharedState::new();
        state.kick();

        assert!(matches!(state.await_turn(1, SHORT), Turn::TimedOut));
        assert!(state.skipped().is_empty());
        assert_eq!(state.cursor(), 0);
    }

    #[test]
    fn test_timeout_policy_from_str() {
        assert_eq!("stall".parse::<TimeoutPolicy>(), Ok(TimeoutPolicy::Stall));
        assert_eq!("SKIP".parse::<TimeoutPolicy>(), Ok(TimeoutPolicy::Skip));
        assert!("retry".parse::<TimeoutPolicy>().is_err());
    }
}
