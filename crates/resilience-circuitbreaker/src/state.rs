//! The circuit breaker's state enumeration.

/// The circuit breaker's current state.
///
/// `Isolated` is entered and left only by [`crate::ManualControl`] — no
/// automatic transition ever produces or clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls are allowed through; failures are being counted.
    Closed = 0,
    /// Calls are rejected with `BrokenCircuit` until `break_duration` elapses.
    Open = 1,
    /// A probe state entered after `break_duration`: calls are allowed
    /// through again, and the next success or failure decides whether the
    /// circuit closes or re-opens.
    HalfOpen = 2,
    /// Forced open by [`crate::ManualControl::isolate`]; only
    /// [`crate::ManualControl::reset`] leaves this state.
    Isolated = 3,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            3 => CircuitState::Isolated,
            _ => CircuitState::Closed,
        }
    }
}
