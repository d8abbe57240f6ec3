//! Options and builder for the timeout strategy.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use resilience_core::{BoxFuture, EventListeners, ExecutionContext, FnListener, ResilienceError};

use crate::events::TimeoutEvent;
use crate::strategy::TimeoutStrategy;

const MINIMUM_TIMEOUT: Duration = Duration::from_millis(500);

/// Returns `true` if `timeout` is a usable duration rather than the
/// "disabled" sentinel (zero, or effectively unbounded).
pub(crate) fn is_enabled(timeout: Duration) -> bool {
    timeout > Duration::ZERO && timeout < Duration::MAX
}

/// An async function computing the timeout to apply for a given call,
/// evaluated with the call's [`ExecutionContext`].
pub type TimeoutGenerator =
    Arc<dyn for<'a> Fn(&'a ExecutionContext) -> BoxFuture<'a, Duration> + Send + Sync>;

/// Configuration for the timeout strategy.
pub struct TimeoutOptions {
    pub(crate) timeout: Duration,
    pub(crate) timeout_generator: Option<TimeoutGenerator>,
    pub(crate) event_listeners: EventListeners<TimeoutEvent>,
    pub(crate) name: String,
}

impl TimeoutOptions {
    /// Creates a new builder with default values (5 second fixed timeout).
    pub fn builder() -> TimeoutOptionsBuilder {
        TimeoutOptionsBuilder::new()
    }
}

/// Builder for [`TimeoutOptions`].
pub struct TimeoutOptionsBuilder {
    timeout: Duration,
    timeout_generator: Option<TimeoutGenerator>,
    event_listeners: EventListeners<TimeoutEvent>,
    name: String,
}

impl TimeoutOptionsBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            timeout_generator: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the fixed timeout duration.
    ///
    /// A duration of `Duration::ZERO` or `Duration::MAX` disables the
    /// strategy: `execute_core` forwards straight to the callback.
    ///
    /// Default: 5 seconds.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    /// Sets a per-call timeout generator, evaluated against the call's
    /// context before each invocation. Overrides the fixed `timeout` when
    /// set. A generator returning a disabled sentinel behaves as if the
    /// strategy were absent for that call.
    pub fn timeout_generator<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a ExecutionContext) -> BoxFuture<'a, Duration> + Send + Sync + 'static,
    {
        self.timeout_generator = Some(Arc::new(f));
        self
    }

    /// Sets the name of this strategy instance, used in telemetry.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when the strategy's own timer fires
    /// before the outer cancellation signal does.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            let TimeoutEvent::OnTimeout { timeout, .. } = event;
            f(*timeout);
        }));
        self
    }

    /// Validates and builds the strategy.
    ///
    /// A fixed `timeout` that is enabled (not the disabled sentinel) must
    /// be at least 500ms.
    pub fn build(self) -> Result<TimeoutStrategy, ResilienceError<Infallible>> {
        if is_enabled(self.timeout) && self.timeout < MINIMUM_TIMEOUT {
            return Err(ResilienceError::InvalidOptions {
                field: "timeout",
                reason: "must be at least 500ms when enabled".to_string(),
            });
        }

        Ok(TimeoutStrategy::new(TimeoutOptions {
            timeout: self.timeout,
            timeout_generator: self.timeout_generator,
            event_listeners: self.event_listeners,
            name: self.name,
        }))
    }
}

impl Default for TimeoutOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_build_succeeds() {
        assert!(TimeoutOptions::builder().build().is_ok());
    }

    #[test]
    fn sub_minimum_enabled_timeout_is_rejected() {
        let err = TimeoutOptions::builder()
            .timeout(Duration::from_millis(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidOptions { field: "timeout", .. }));
    }

    #[test]
    fn disabled_sentinel_bypasses_minimum() {
        assert!(TimeoutOptions::builder().timeout(Duration::ZERO).build().is_ok());
    }
}
