//! Events emitted by the timeout strategy.

use std::time::{Duration, Instant};

use resilience_core::ResilienceEvent;

/// Events the timeout strategy reports through its [`resilience_core::TelemetrySource`].
#[derive(Debug, Clone)]
pub enum TimeoutEvent {
    /// The strategy's own timer fired before the outer cancellation signal
    /// did.
    OnTimeout {
        /// The strategy instance's name.
        pattern_name: String,
        /// When the event was recorded.
        timestamp: Instant,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },
}

impl ResilienceEvent for TimeoutEvent {
    fn event_type(&self) -> &'static str {
        "OnTimeout"
    }

    fn timestamp(&self) -> Instant {
        match self {
            TimeoutEvent::OnTimeout { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            TimeoutEvent::OnTimeout { pattern_name, .. } => pattern_name,
        }
    }
}
