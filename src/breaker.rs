//! Per-node circuit breakers for the wallet RPC pool.
//!
//! Each node gets a closed/open/half-open state machine that decides whether
//! the orchestrator should attempt it at all. State lives in memory for the
//! process lifetime only: breakers are a soft optimization, not a
//! correctness guarantee, so losing them on restart is acceptable.
//!
//! The registry is an explicit object injected into the orchestrator rather
//! than module-level state, and every transition is evaluated lazily against
//! a caller-supplied instant internally, so tests can drive the clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Phase of a node's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitPhase {
    /// Node is healthy; requests flow normally
    Closed,
    /// Node is failing; requests are skipped until the cool-down elapses
    Open,
    /// Cool-down elapsed; the next request probes the node
    HalfOpen,
}

/// Breaker state for one node.
#[derive(Debug, Clone)]
struct CircuitState {
    failures: u32,
    last_failure: Option<Instant>,
    phase: CircuitPhase,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            failures: 0,
            last_failure: None,
            phase: CircuitPhase::Closed,
        }
    }
}

/// Tunable breaker windows. The defaults match production behavior; tests
/// shrink them to drive transitions quickly.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,

    /// How long an open breaker skips the node before half-opening
    pub cooldown: Duration,

    /// How long a failure record lingers before it decays back to closed
    pub stale_after: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            stale_after: Duration::from_secs(60),
        }
    }
}

/// Registry of per-node circuit breakers.
///
/// Shared mutable state is a plain mutex-guarded map; the lock is only ever
/// held for the duration of a counter update, never across a suspension
/// point. Two requests racing on the same node's counters is benign; the
/// breaker is a heuristic.
#[derive(Debug)]
pub struct BreakerRegistry {
    settings: BreakerSettings,
    nodes: Mutex<HashMap<String, CircuitState>>,
}

impl BreakerRegistry {
    /// Creates a registry with default production windows.
    pub fn new() -> Self {
        Self::with_settings(BreakerSettings::default())
    }

    /// Creates a registry with custom windows.
    pub fn with_settings(settings: BreakerSettings) -> Self {
        Self {
            settings,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the node should be attempted. Lazily transitions an
    /// open breaker to half-open once the cool-down has elapsed, and decays
    /// stale failure records back to closed.
    pub fn is_available(&self, node: &str) -> bool {
        self.is_available_at(node, Instant::now())
    }

    /// Records a successful exchange with the node, closing its breaker and
    /// clearing all counters.
    pub fn record_success(&self, node: &str) {
        let mut nodes = self.lock();
        if let Some(state) = nodes.get_mut(node) {
            if state.phase != CircuitPhase::Closed || state.failures > 0 {
                debug!(node, "circuit breaker reset after success");
            }
            *state = CircuitState::new();
        }
    }

    /// Records a failed exchange with the node, opening the breaker once the
    /// failure threshold is reached.
    pub fn record_failure(&self, node: &str) {
        self.record_failure_at(node, Instant::now());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CircuitState>> {
        // A poisoned lock means a panic while updating a counter; the
        // heuristic state is still usable.
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_available_at(&self, node: &str, now: Instant) -> bool {
        let mut nodes = self.lock();
        let Some(state) = nodes.get_mut(node) else {
            return true;
        };

        // Implicit decay: a record that has seen no activity for the stale
        // window reverts to a clean closed state.
        if let Some(last) = state.last_failure {
            if now.duration_since(last) >= self.settings.stale_after {
                *state = CircuitState::new();
                return true;
            }
        }

        match state.phase {
            CircuitPhase::Closed | CircuitPhase::HalfOpen => true,
            CircuitPhase::Open => {
                let cooled = state
                    .last_failure
                    .map(|last| now.duration_since(last) >= self.settings.cooldown)
                    .unwrap_or(true);
                if cooled {
                    debug!(node, "circuit breaker half-open after cool-down");
                    state.phase = CircuitPhase::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_failure_at(&self, node: &str, now: Instant) {
        let mut nodes = self.lock();
        let state = nodes
            .entry(node.to_string())
            .or_insert_with(CircuitState::new);

        state.failures += 1;
        state.last_failure = Some(now);

        if state.failures >= self.settings.failure_threshold {
            if state.phase != CircuitPhase::Open {
                warn!(
                    node,
                    failures = state.failures,
                    "circuit breaker opened"
                );
            }
            state.phase = CircuitPhase::Open;
        }
    }

    /// Current phase of a node's breaker, for diagnostics.
    pub fn phase(&self, node: &str) -> CircuitPhase {
        self.lock()
            .get(node)
            .map(|s| s.phase)
            .unwrap_or(CircuitPhase::Closed)
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
