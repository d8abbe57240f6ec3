//! The state controller: the circuit breaker's single critical section.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use resilience_core::{EventListeners, ResilienceError, TimeProvider};

use crate::behavior::BehaviorPolicy;
use crate::events::CircuitBreakerEvent;
use crate::state::CircuitState;

struct Inner<AppErr> {
    circuit_state: CircuitState,
    break_until: Option<Instant>,
    last_error: Option<ResilienceError<AppErr>>,
    behavior: Box<dyn BehaviorPolicy>,
}

/// What `on_action_pre_execute` permits or denies.
pub enum PreExecute<AppErr> {
    /// The call may proceed. Carries the transition event if permitting
    /// this call itself moved the circuit (`Open -> HalfOpen`), so the
    /// caller can record it on the context alongside whatever the call
    /// itself produces.
    Permit(Option<CircuitBreakerEvent>),
    /// The call is blocked; carries the error that caused (or is still
    /// causing) the break, if one is on record.
    Broken(Option<ResilienceError<AppErr>>),
}

/// Owns the circuit's state machine under a single exclusive lock.
///
/// All transitions — automatic (threshold trips, half-open probes) and
/// manual (`isolate`/`reset`) — go through this type, which also keeps a
/// lock-free [`AtomicU8`] mirror of the state for [`crate::StateProvider`]
/// to read without contending on the lock.
pub struct StateController<AppErr> {
    inner: Mutex<Inner<AppErr>>,
    state_atomic: Arc<AtomicU8>,
    time_provider: Arc<dyn TimeProvider>,
    break_duration: Duration,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl<AppErr: Clone + Send + 'static> StateController<AppErr> {
    pub(crate) fn new(
        behavior: Box<dyn BehaviorPolicy>,
        break_duration: Duration,
        time_provider: Arc<dyn TimeProvider>,
        event_listeners: EventListeners<CircuitBreakerEvent>,
        name: String,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                circuit_state: CircuitState::Closed,
                break_until: None,
                last_error: None,
                behavior,
            }),
            state_atomic: Arc::new(AtomicU8::new(CircuitState::Closed as u8)),
            time_provider,
            break_duration,
            event_listeners,
            name,
        }
    }

    /// A cheap, lock-free handle mirroring this controller's state.
    pub(crate) fn state_atomic(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.state_atomic)
    }

    /// Reads the current state without taking the lock.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Step 1 of the execute flow: may this call proceed?
    pub fn on_action_pre_execute(&self) -> PreExecute<AppErr> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.circuit_state {
            CircuitState::Closed | CircuitState::HalfOpen => PreExecute::Permit(None),
            CircuitState::Isolated => PreExecute::Broken(inner.last_error.clone()),
            CircuitState::Open => {
                let now = self.time_provider.now();
                let still_broken = inner.break_until.map(|until| now < until).unwrap_or(false);
                if still_broken {
                    PreExecute::Broken(inner.last_error.clone())
                } else {
                    let event = self.transition_to(&mut inner, CircuitState::HalfOpen);
                    PreExecute::Permit(event)
                }
            }
        }
    }

    /// Records a successful call.
    pub fn on_action_success(&self) -> Option<CircuitBreakerEvent> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let now = self.time_provider.now();
        let current = inner.circuit_state;
        inner.behavior.on_action_success(current, now);
        if current == CircuitState::HalfOpen {
            self.transition_to(&mut inner, CircuitState::Closed)
        } else {
            None
        }
    }

    /// Records a failed call, with the error to retain as `last_error` if
    /// this trips (or keeps) the circuit open.
    pub fn on_action_failure(&self, error: ResilienceError<AppErr>) -> Option<CircuitBreakerEvent> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let now = self.time_provider.now();
        let current = inner.circuit_state;
        let should_break = inner.behavior.on_action_failure(current, now);
        if should_break || current == CircuitState::HalfOpen {
            inner.break_until = Some(now + self.break_duration);
            inner.last_error = Some(error);
            self.transition_to(&mut inner, CircuitState::Open)
        } else {
            None
        }
    }

    /// Forces the circuit open, bypassing the behavior policy entirely.
    /// Idempotent: isolating an already-isolated circuit is a no-op.
    pub fn isolate(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.circuit_state == CircuitState::Isolated {
            return;
        }
        let _ = self.transition_to(&mut inner, CircuitState::Isolated);
    }

    /// Forces the circuit closed and clears its behavior's counters.
    /// Idempotent: resetting an already-closed circuit is a no-op.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.circuit_state == CircuitState::Closed {
            return;
        }
        inner.break_until = None;
        inner.last_error = None;
        let _ = self.transition_to(&mut inner, CircuitState::Closed);
    }

    fn transition_to(
        &self,
        inner: &mut Inner<AppErr>,
        new_state: CircuitState,
    ) -> Option<CircuitBreakerEvent> {
        if inner.circuit_state == new_state {
            return None;
        }

        if new_state == CircuitState::Closed {
            inner.behavior.on_circuit_closed();
        }

        inner.circuit_state = new_state;
        self.state_atomic.store(new_state as u8, Ordering::Release);

        // Emitted while still holding the lock: the controller's ordering
        // guarantee ("the externally observed event order equals the
        // internal transition order") is otherwise only guaranteed on a
        // best-effort basis once dispatch is deferred past the lock, and
        // listeners here are expected to be fast (the same contract as
        // telemetry enrichers).
        let timestamp = self.time_provider.now();
        let event = match new_state {
            CircuitState::Open => Some(CircuitBreakerEvent::OnCircuitOpened {
                pattern_name: self.name.clone(),
                timestamp,
            }),
            CircuitState::Closed => Some(CircuitBreakerEvent::OnCircuitClosed {
                pattern_name: self.name.clone(),
                timestamp,
            }),
            CircuitState::HalfOpen => Some(CircuitBreakerEvent::OnCircuitHalfOpened {
                pattern_name: self.name.clone(),
                timestamp,
            }),
            CircuitState::Isolated => Some(CircuitBreakerEvent::OnCircuitOpened {
                pattern_name: self.name.clone(),
                timestamp,
            }),
        };
        if let Some(event) = &event {
            self.event_listeners.emit(event);
        }

        record_transition(&self.name, new_state);
        event
    }
}

#[allow(unused_variables)]
fn record_transition(pattern_name: &str, to_state: CircuitState) {
    #[cfg(feature = "tracing")]
    tracing::info!(circuit = pattern_name, ?to_state, "circuit state transition");

    #[cfg(feature = "metrics")]
    {
        let state_label = match to_state {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
            CircuitState::Isolated => "Isolated",
        };
        metrics::counter!(
            "circuitbreaker_transitions_total",
            "circuitbreaker" => pattern_name.to_string(),
            "to" => state_label,
        )
        .increment(1);
        metrics::gauge!(
            "circuitbreaker_state",
            "circuitbreaker" => pattern_name.to_string(),
            "state" => state_label,
        )
        .set(1.0);
    }
}

/// A handle that routes `isolate()`/`reset()` calls to a circuit breaker's
/// controller, independent of the strategy performing calls through it.
#[derive(Clone)]
pub struct ManualControl<AppErr> {
    controller: Arc<StateController<AppErr>>,
}

impl<AppErr: Clone + Send + 'static> ManualControl<AppErr> {
    pub(crate) fn new(controller: Arc<StateController<AppErr>>) -> Self {
        Self { controller }
    }

    /// Forces the circuit into `Isolated`. Idempotent.
    pub fn isolate(&self) {
        self.controller.isolate();
    }

    /// Forces the circuit back to `Closed`, clearing its counters.
    /// Idempotent.
    pub fn reset(&self) {
        self.controller.reset();
    }
}

/// A read-only handle exposing a circuit breaker's current state, without
/// contending on the controller's lock.
#[derive(Clone)]
pub struct StateProvider {
    state_atomic: Arc<AtomicU8>,
}

impl StateProvider {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        Self { state_atomic }
    }

    /// The circuit's current state.
    pub fn circuit_state(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::ConsecutiveFailuresBehavior;
    use resilience_core::SystemTimeProvider;

    fn controller(threshold: u32) -> StateController<String> {
        StateController::new(
            Box::new(ConsecutiveFailuresBehavior::new(threshold)),
            Duration::from_millis(50),
            Arc::new(SystemTimeProvider),
            EventListeners::new(),
            "test".to_string(),
        )
    }

    #[test]
    fn trips_open_after_threshold_and_blocks_calls() {
        let controller = controller(2);
        assert!(matches!(controller.on_action_pre_execute(), PreExecute::Permit(None)));
        controller.on_action_failure(ResilienceError::UserFailure("boom".to_string()));
        assert!(matches!(controller.on_action_pre_execute(), PreExecute::Permit(None)));
        controller.on_action_failure(ResilienceError::UserFailure("boom again".to_string()));

        match controller.on_action_pre_execute() {
            PreExecute::Broken(Some(ResilienceError::UserFailure(msg))) => {
                assert_eq!(msg, "boom again")
            }
            PreExecute::Broken(_) => panic!("expected the tripping error to be on record"),
            PreExecute::Permit(_) => panic!("circuit should be open after reaching the threshold"),
        }
    }

    #[test]
    fn isolate_and_reset_are_idempotent() {
        let controller = controller(1);
        controller.isolate();
        controller.isolate();
        assert!(matches!(controller.on_action_pre_execute(), PreExecute::Broken(_)));

        controller.reset();
        controller.reset();
        assert!(matches!(controller.on_action_pre_execute(), PreExecute::Permit(None)));
    }

    #[test]
    fn single_failure_trips_open_with_threshold_one() {
        let controller = controller(1);
        controller.on_action_failure(ResilienceError::UserFailure("x".to_string()));
        assert_eq!(controller.state_sync(), CircuitState::Open);
    }
}
