//! Outcome of a wrapped callback, as observed by a strategy.

/// The result of invoking the user callback once: either it produced a
/// value, or it failed.
///
/// Strategies inspect `Outcome` rather than a bare `Result` so that
/// predicates (e.g. the circuit breaker's `should_handle`) can be written
/// uniformly across sync and async callbacks.
#[derive(Debug, Clone)]
pub enum Outcome<T, E> {
    /// The callback completed successfully.
    Success(T),
    /// The callback failed.
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    /// Returns `true` if this is a `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns `true` if this is a `Failure`.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Builds an `Outcome` from a `Result`.
    pub fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(error),
        }
    }

    /// Converts this outcome back into a `Result`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(error),
        }
    }

    /// Borrows the success value, if any.
    pub fn as_success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    /// Borrows the failure value, if any.
    pub fn as_failure(&self) -> Option<&E> {
        match self {
            Outcome::Failure(error) => Some(error),
            Outcome::Success(_) => None,
        }
    }

    /// Maps the success value, leaving a failure untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Discards the success payload, keeping only success/failure shape.
    /// Used when a consumer (e.g. `BrokenCircuit`'s last outcome) only
    /// needs to remember *that* a call failed, not what it returned.
    pub fn erase_success(&self) -> Outcome<(), E>
    where
        E: Clone,
    {
        match self {
            Outcome::Success(_) => Outcome::Success(()),
            Outcome::Failure(error) => Outcome::Failure(error.clone()),
        }
    }
}
