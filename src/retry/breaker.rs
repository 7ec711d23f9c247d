//! Per-operation-name circuit breaker.
//!
//! Each logical operation name gets its own Closed/Open/HalfOpen state
//! machine. Open circuits short-circuit requests without touching the
//! network; the Open→HalfOpen transition is lazy (evaluated on the next
//! check, not timer-driven), and HalfOpen admits exactly one trial request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Breaker states. Closed passes requests through, Open rejects them,
/// HalfOpen allows a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStateKind {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerStateKind::Closed => write!(f, "closed"),
            BreakerStateKind::Open => write!(f, "open"),
            BreakerStateKind::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Thresholds controlling when a circuit trips and recovers.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Completions required before failure rate is considered at all.
    pub min_samples: u64,
    /// Failure rate (0..1) at which a closed circuit opens.
    pub failure_rate: f64,
    /// How long an open circuit blocks before allowing a trial.
    pub open_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            min_samples: 5,
            failure_rate: 0.5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

/// Verdict for one request against a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Allow,
    /// The single half-open trial request.
    AllowTrial,
    Reject,
}

/// Read-only view of one circuit, for history records and debug output.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerStateKind,
    pub total: u64,
    pub failures: u64,
    pub successes: u64,
}

#[derive(Debug)]
struct BreakerEntry {
    state: BreakerStateKind,
    total: u64,
    failures: u64,
    successes: u64,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: BreakerStateKind::Closed,
            total: 0,
            failures: 0,
            successes: 0,
            last_failure: None,
            last_success: None,
            trial_in_flight: false,
        }
    }

    fn reset_closed(&mut self) {
        self.state = BreakerStateKind::Closed;
        self.total = 0;
        self.failures = 0;
        self.successes = 0;
    }

    fn open_elapsed(&self, timeout: Duration) -> bool {
        self.last_failure
            .map(|t| t.elapsed() >= timeout)
            .unwrap_or(true)
    }
}

/// All circuits, keyed by operation name. The single mutex keeps counter
/// updates atomic relative to concurrent completions.
#[derive(Debug, Default)]
pub struct BreakerMap {
    entries: Mutex<HashMap<String, BreakerEntry>>,
}

impl BreakerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a request for `name` may proceed. Performs the lazy
    /// Open→HalfOpen transition when the open timeout has elapsed.
    pub fn allow(&self, name: &str, settings: &BreakerSettings) -> BreakerDecision {
        let mut entries = self.entries.lock().expect("breaker lock poisoned");
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(BreakerEntry::new);
        match entry.state {
            BreakerStateKind::Closed => BreakerDecision::Allow,
            BreakerStateKind::Open => {
                if entry.open_elapsed(settings.open_timeout) {
                    entry.state = BreakerStateKind::HalfOpen;
                    entry.trial_in_flight = true;
                    BreakerDecision::AllowTrial
                } else {
                    BreakerDecision::Reject
                }
            }
            BreakerStateKind::HalfOpen => {
                if entry.trial_in_flight {
                    BreakerDecision::Reject
                } else {
                    entry.trial_in_flight = true;
                    BreakerDecision::AllowTrial
                }
            }
        }
    }

    /// Record a completion for `name` and evaluate state transitions.
    pub fn record(&self, name: &str, success: bool, settings: &BreakerSettings) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("breaker lock poisoned");
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(BreakerEntry::new);

        if entry.state == BreakerStateKind::HalfOpen {
            entry.trial_in_flight = false;
            if success {
                entry.reset_closed();
                entry.last_success = Some(now);
            } else {
                entry.state = BreakerStateKind::Open;
                entry.last_failure = Some(now);
            }
            return;
        }

        entry.total += 1;
        if success {
            entry.successes += 1;
            entry.last_success = Some(now);
        } else {
            entry.failures += 1;
            entry.last_failure = Some(now);
        }

        if entry.state == BreakerStateKind::Closed
            && entry.total >= settings.min_samples
            && entry.failures as f64 / entry.total as f64 >= settings.failure_rate
        {
            entry.state = BreakerStateKind::Open;
        }
    }

    /// Give back a claimed half-open trial slot when the attempt aborted
    /// before reaching the network. No completion is recorded; the next
    /// request for `name` becomes the trial instead.
    pub fn release_trial(&self, name: &str) {
        let mut entries = self.entries.lock().expect("breaker lock poisoned");
        if let Some(entry) = entries.get_mut(name)
            && entry.state == BreakerStateKind::HalfOpen
        {
            entry.trial_in_flight = false;
        }
    }

    /// True when the circuit is open and its timeout has not yet elapsed.
    /// Does not transition state.
    pub fn is_open(&self, name: &str, settings: &BreakerSettings) -> bool {
        let entries = self.entries.lock().expect("breaker lock poisoned");
        entries
            .get(name)
            .map(|e| e.state == BreakerStateKind::Open && !e.open_elapsed(settings.open_timeout))
            .unwrap_or(false)
    }

    pub fn state(&self, name: &str) -> BreakerStateKind {
        let entries = self.entries.lock().expect("breaker lock poisoned");
        entries
            .get(name)
            .map(|e| e.state)
            .unwrap_or(BreakerStateKind::Closed)
    }

    pub fn snapshot(&self, name: &str) -> BreakerSnapshot {
        let entries = self.entries.lock().expect("breaker lock poisoned");
        entries
            .get(name)
            .map(|e| BreakerSnapshot {
                state: e.state,
                total: e.total,
                failures: e.failures,
                successes: e.successes,
            })
            .unwrap_or(BreakerSnapshot {
                state: BreakerStateKind::Closed,
                total: 0,
                failures: 0,
                successes: 0,
            })
    }

    /// Snapshots of every known circuit, for debug output.
    pub fn snapshots(&self) -> HashMap<String, BreakerSnapshot> {
        let entries = self.entries.lock().expect("breaker lock poisoned");
        entries
            .iter()
            .map(|(name, e)| {
                (
                    name.clone(),
                    BreakerSnapshot {
                        state: e.state,
                        total: e.total,
                        failures: e.failures,
                        successes: e.successes,
                    },
                )
            })
            .collect()
    }
}
