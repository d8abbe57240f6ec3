//! Events emitted by the circuit breaker strategy.

use std::time::Instant;

use resilience_core::ResilienceEvent;

use crate::state::CircuitState;

/// Events the circuit breaker reports through its
/// [`resilience_core::TelemetrySource`], one per named transition.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit tripped open: `Closed -> Open` or `HalfOpen -> Open`.
    OnCircuitOpened {
        /// The strategy instance's name.
        pattern_name: String,
        /// When the transition occurred.
        timestamp: Instant,
    },
    /// The circuit closed: `HalfOpen -> Closed`, or a manual `reset()`.
    OnCircuitClosed {
        /// The strategy instance's name.
        pattern_name: String,
        /// When the transition occurred.
        timestamp: Instant,
    },
    /// The circuit began probing again after its break elapsed:
    /// `Open -> HalfOpen`.
    OnCircuitHalfOpened {
        /// The strategy instance's name.
        pattern_name: String,
        /// When the transition occurred.
        timestamp: Instant,
    },
}

impl CircuitBreakerEvent {
    fn pattern_name_str(&self) -> &str {
        match self {
            CircuitBreakerEvent::OnCircuitOpened { pattern_name, .. }
            | CircuitBreakerEvent::OnCircuitClosed { pattern_name, .. }
            | CircuitBreakerEvent::OnCircuitHalfOpened { pattern_name, .. } => pattern_name,
        }
    }

    fn timestamp_value(&self) -> Instant {
        match self {
            CircuitBreakerEvent::OnCircuitOpened { timestamp, .. }
            | CircuitBreakerEvent::OnCircuitClosed { timestamp, .. }
            | CircuitBreakerEvent::OnCircuitHalfOpened { timestamp, .. } => *timestamp,
        }
    }

    /// This event's corresponding [`CircuitState`], for tests and logging.
    pub fn target_state(&self) -> CircuitState {
        match self {
            CircuitBreakerEvent::OnCircuitOpened { .. } => CircuitState::Open,
            CircuitBreakerEvent::OnCircuitClosed { .. } => CircuitState::Closed,
            CircuitBreakerEvent::OnCircuitHalfOpened { .. } => CircuitState::HalfOpen,
        }
    }
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::OnCircuitOpened { .. } => "OnCircuitOpened",
            CircuitBreakerEvent::OnCircuitClosed { .. } => "OnCircuitClosed",
            CircuitBreakerEvent::OnCircuitHalfOpened { .. } => "OnCircuitHalfOpened",
        }
    }

    fn timestamp(&self) -> Instant {
        self.timestamp_value()
    }

    fn pattern_name(&self) -> &str {
        self.pattern_name_str()
    }
}
