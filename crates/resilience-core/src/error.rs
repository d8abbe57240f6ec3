//! Common error type for resilience strategies.
//!
//! Every strategy in the pipeline fails into the same [`ResilienceError<E>`],
//! so composing several strategies never requires hand-written `From`
//! conversions between layer-specific error types.

use std::time::Duration;

use thiserror::Error;

use crate::outcome::Outcome;

/// Unified error type returned by strategies and the pipeline.
///
/// `E` is the application error type produced by the wrapped callback.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError<E> {
    /// A caller passed an invalid argument to a core API (e.g. released a
    /// context that was never acquired).
    #[error("invalid argument: {argument}")]
    InvalidArgument {
        /// Name of the offending argument.
        argument: &'static str,
    },

    /// An options record failed validation before a strategy could be built.
    #[error("invalid options field '{field}': {reason}")]
    InvalidOptions {
        /// The field that failed validation.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The outer cancellation signal fired.
    #[error("operation cancelled")]
    OperationCancelled,

    /// The timeout strategy's own timer fired before the outer signal did.
    #[error("timed out after {timeout:?}")]
    TimeoutRejected {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The circuit breaker rejected the call while open or isolated.
    #[error("circuit is open; call not permitted")]
    BrokenCircuit {
        /// The error that caused (or is still causing) the break, if any
        /// is on record. Boxed since `ResilienceError` recurses into
        /// itself here.
        last_error: Option<Box<ResilienceError<E>>>,
    },

    /// The wrapped callback itself failed; the error is passed through
    /// unchanged.
    #[error("callback failed: {0}")]
    UserFailure(E),
}

impl<E> ResilienceError<E> {
    /// Returns `true` if cancellation (outer, not timeout) caused this error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::OperationCancelled)
    }

    /// Returns `true` if this is a timeout rejection.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::TimeoutRejected { .. })
    }

    /// Returns `true` if this is a broken-circuit rejection.
    pub fn is_broken_circuit(&self) -> bool {
        matches!(self, ResilienceError::BrokenCircuit { .. })
    }

    /// Returns `true` if this wraps a callback (application) failure.
    pub fn is_user_failure(&self) -> bool {
        matches!(self, ResilienceError::UserFailure(_))
    }

    /// Extracts the wrapped callback error, if this is a `UserFailure`.
    pub fn into_user_failure(self) -> Option<E> {
        match self {
            ResilienceError::UserFailure(e) => Some(e),
            _ => None,
        }
    }
}
