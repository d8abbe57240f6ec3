//! Pluggable "should this circuit break" policies.

use std::time::Instant;

use crate::health::{make_health_metrics, HealthMetrics};
use crate::state::CircuitState;

/// Decides, from a stream of successes and failures observed while
/// `Closed`, whether the circuit should trip open.
///
/// Called under the state controller's lock, with the circuit's state at
/// the time of the call — both methods are no-ops outside `Closed`, since
/// a `HalfOpen` probe's outcome is handled directly by the controller
/// (a single success closes it, a single failure re-opens it) rather than
/// through this threshold logic.
pub trait BehaviorPolicy: Send {
    /// Records a successful call.
    fn on_action_success(&mut self, state: CircuitState, now: Instant);

    /// Records a failed call, returning `true` if this failure should trip
    /// the circuit open.
    fn on_action_failure(&mut self, state: CircuitState, now: Instant) -> bool;

    /// Called whenever the circuit transitions (back) to `Closed`.
    fn on_circuit_closed(&mut self);
}

/// Trips after `failure_threshold` consecutive failures while `Closed`; any
/// success resets the counter.
pub struct ConsecutiveFailuresBehavior {
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl ConsecutiveFailuresBehavior {
    /// Creates a new behavior tripping at `failure_threshold` consecutive
    /// failures.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            failure_threshold,
        }
    }
}

impl BehaviorPolicy for ConsecutiveFailuresBehavior {
    fn on_action_success(&mut self, state: CircuitState, _now: Instant) {
        if state == CircuitState::Closed {
            self.consecutive_failures = 0;
        }
    }

    fn on_action_failure(&mut self, state: CircuitState, _now: Instant) -> bool {
        if state != CircuitState::Closed {
            return false;
        }
        self.consecutive_failures += 1;
        self.consecutive_failures >= self.failure_threshold
    }

    fn on_circuit_closed(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// Trips when, over a rolling sampling window, throughput has reached
/// `minimum_throughput` and the failure rate has reached `failure_threshold`.
pub struct HealthMetricBehavior {
    metrics: Box<dyn HealthMetrics>,
    failure_threshold: f64,
    minimum_throughput: usize,
}

impl HealthMetricBehavior {
    /// Creates a new behavior backed by the health metrics implementation
    /// the sampling duration's factory rule selects.
    pub fn new(failure_threshold: f64, minimum_throughput: usize, sampling_duration: std::time::Duration) -> Self {
        Self {
            metrics: make_health_metrics(sampling_duration),
            failure_threshold,
            minimum_throughput,
        }
    }
}

impl BehaviorPolicy for HealthMetricBehavior {
    fn on_action_success(&mut self, state: CircuitState, now: Instant) {
        if state == CircuitState::Closed {
            self.metrics.record_success(now);
        }
    }

    fn on_action_failure(&mut self, state: CircuitState, now: Instant) -> bool {
        if state != CircuitState::Closed {
            return false;
        }
        self.metrics.record_failure(now);
        let info = self.metrics.health_info(now);
        info.throughput >= self.minimum_throughput && info.failure_rate >= self.failure_threshold
    }

    fn on_circuit_closed(&mut self) {
        self.metrics.reset();
    }
}
