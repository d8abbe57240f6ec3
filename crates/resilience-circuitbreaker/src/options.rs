//! Options and builders for the circuit breaker strategy.

use std::sync::Arc;
use std::time::Duration;

use resilience_core::{EventListeners, FnListener, ResilienceError, SystemTimeProvider, TimeProvider};

use crate::controller::StateController;
use crate::events::CircuitBreakerEvent;
use crate::strategy::CircuitBreakerStrategy;

const MINIMUM_BREAK_DURATION: Duration = Duration::from_millis(500);
const MINIMUM_THROUGHPUT_FLOOR: usize = 2;

/// Decides whether a failed call counts as a failure the circuit breaker
/// should track. Receives the error as the breaker observes it: already
/// unwrapped past every inner strategy, so a nested timeout or circuit
/// breaker shows up as `ResilienceError::TimeoutRejected` / `BrokenCircuit`
/// rather than the application's own error type.
///
/// Only consulted for `Outcome::Failure`; every `Outcome::Success` is
/// always recorded as a success. Polly-style breakers that can also treat
/// a *successful* result as breaker-relevant would need `ResilienceError`
/// to carry an arbitrary success payload, which the unified error type
/// deliberately does not do.
pub type ShouldHandle<AppErr> = Arc<dyn Fn(&ResilienceError<AppErr>) -> bool + Send + Sync>;

fn default_should_handle<AppErr: 'static>() -> ShouldHandle<AppErr> {
    Arc::new(|_error| true)
}

/// Configuration for the basic (consecutive-failures) circuit breaker.
pub struct CircuitBreakerOptions<AppErr> {
    pub(crate) break_duration: Duration,
    pub(crate) failure_threshold: u32,
    pub(crate) should_handle: ShouldHandle<AppErr>,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl<AppErr> CircuitBreakerOptions<AppErr>
where
    AppErr: Clone + Send + 'static,
{
    /// Creates a new builder with default values.
    pub fn builder() -> CircuitBreakerOptionsBuilder<AppErr> {
        CircuitBreakerOptionsBuilder::new()
    }

    /// Preset: 5 consecutive failures trip the circuit, 30 second break.
    /// Translated from the teacher's rate-based `standard()` preset
    /// (50% failure rate over a 100-call window) to a consecutive count.
    pub fn standard() -> CircuitBreakerOptionsBuilder<AppErr> {
        Self::builder()
            .failure_threshold(5)
            .break_duration(Duration::from_secs(30))
    }

    /// Preset: 2 consecutive failures trip the circuit, 10 second break.
    /// For latency-sensitive scenarios that should fail fast.
    pub fn fast_fail() -> CircuitBreakerOptionsBuilder<AppErr> {
        Self::builder()
            .failure_threshold(2)
            .break_duration(Duration::from_secs(10))
    }

    /// Preset: 10 consecutive failures trip the circuit, 60 second break.
    /// Tolerates more transient failures before opening.
    pub fn tolerant() -> CircuitBreakerOptionsBuilder<AppErr> {
        Self::builder()
            .failure_threshold(10)
            .break_duration(Duration::from_secs(60))
    }
}

/// Builder for [`CircuitBreakerOptions`].
pub struct CircuitBreakerOptionsBuilder<AppErr> {
    break_duration: Duration,
    failure_threshold: u32,
    should_handle: ShouldHandle<AppErr>,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
    time_provider: Arc<dyn TimeProvider>,
}

impl<AppErr> CircuitBreakerOptionsBuilder<AppErr>
where
    AppErr: Clone + Send + 'static,
{
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            break_duration: Duration::from_secs(5),
            failure_threshold: 5,
            should_handle: default_should_handle(),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    /// Sets how long the circuit stays `Open` before probing again.
    ///
    /// Default: 5 seconds. Must be at least 500ms.
    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Sets the number of consecutive failures that trip the circuit.
    ///
    /// Default: 5.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Overrides the clock used for break-duration expiry. Mainly useful
    /// in tests; production code should leave this at its default.
    pub fn time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = provider;
        self
    }

    /// Sets a custom predicate deciding whether a failure counts against
    /// this breaker.
    ///
    /// Default: every failure counts.
    pub fn should_handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError<AppErr>) -> bool + Send + Sync + 'static,
    {
        self.should_handle = Arc::new(predicate);
        self
    }

    /// Sets the name of this strategy instance, used in telemetry.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when the circuit trips open.
    pub fn on_opened<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::OnCircuitOpened { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when the circuit closes.
    pub fn on_closed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::OnCircuitClosed { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when the circuit starts probing again.
    pub fn on_half_opened<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::OnCircuitHalfOpened { .. }) {
                f();
            }
        }));
        self
    }

    /// Validates and builds the strategy.
    pub fn build(self) -> Result<CircuitBreakerStrategy<AppErr>, ResilienceError<AppErr>> {
        if self.break_duration < MINIMUM_BREAK_DURATION {
            return Err(ResilienceError::InvalidOptions {
                field: "break_duration",
                reason: "must be at least 500ms".to_string(),
            });
        }
        if self.failure_threshold == 0 {
            return Err(ResilienceError::InvalidOptions {
                field: "failure_threshold",
                reason: "must be at least 1".to_string(),
            });
        }

        let behavior = Box::new(crate::behavior::ConsecutiveFailuresBehavior::new(
            self.failure_threshold,
        ));
        let controller = Arc::new(StateController::new(
            behavior,
            self.break_duration,
            self.time_provider,
            self.event_listeners,
            self.name.clone(),
        ));

        Ok(CircuitBreakerStrategy::new(
            controller,
            self.should_handle,
            self.name,
        ))
    }
}

impl<AppErr> Default for CircuitBreakerOptionsBuilder<AppErr>
where
    AppErr: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the advanced (health-metric / rolling-rate) circuit
/// breaker.
pub struct AdvancedCircuitBreakerOptions<AppErr> {
    pub(crate) break_duration: Duration,
    pub(crate) failure_threshold: f64,
    pub(crate) minimum_throughput: usize,
    pub(crate) sampling_duration: Duration,
    pub(crate) should_handle: ShouldHandle<AppErr>,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl<AppErr> AdvancedCircuitBreakerOptions<AppErr>
where
    AppErr: Clone + Send + 'static,
{
    /// Creates a new builder with default values.
    pub fn builder() -> AdvancedCircuitBreakerOptionsBuilder<AppErr> {
        AdvancedCircuitBreakerOptionsBuilder::new()
    }

    /// Preset: 50% failure rate over a 100-call window, 30 second break.
    pub fn standard() -> AdvancedCircuitBreakerOptionsBuilder<AppErr> {
        Self::builder()
            .failure_threshold(0.5)
            .minimum_throughput(100)
            .sampling_duration(Duration::from_secs(30))
            .break_duration(Duration::from_secs(30))
    }

    /// Preset: 25% failure rate over a 20-call window, 10 second break.
    pub fn fast_fail() -> AdvancedCircuitBreakerOptionsBuilder<AppErr> {
        Self::builder()
            .failure_threshold(0.25)
            .minimum_throughput(20)
            .sampling_duration(Duration::from_secs(10))
            .break_duration(Duration::from_secs(10))
    }

    /// Preset: 75% failure rate over a 200-call window, 60 second break.
    pub fn tolerant() -> AdvancedCircuitBreakerOptionsBuilder<AppErr> {
        Self::builder()
            .failure_threshold(0.75)
            .minimum_throughput(200)
            .sampling_duration(Duration::from_secs(60))
            .break_duration(Duration::from_secs(60))
    }
}

/// Builder for [`AdvancedCircuitBreakerOptions`].
pub struct AdvancedCircuitBreakerOptionsBuilder<AppErr> {
    break_duration: Duration,
    failure_threshold: f64,
    minimum_throughput: usize,
    sampling_duration: Duration,
    should_handle: ShouldHandle<AppErr>,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
    time_provider: Arc<dyn TimeProvider>,
}

impl<AppErr> AdvancedCircuitBreakerOptionsBuilder<AppErr>
where
    AppErr: Clone + Send + 'static,
{
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            break_duration: Duration::from_secs(5),
            failure_threshold: 0.1,
            minimum_throughput: 100,
            sampling_duration: Duration::from_secs(30),
            should_handle: default_should_handle(),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    /// Sets how long the circuit stays `Open` before probing again.
    ///
    /// Default: 5 seconds. Must be at least 500ms.
    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Overrides the clock used for break-duration and sampling-window
    /// expiry. Mainly useful in tests; production code should leave this
    /// at its default.
    pub fn time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = provider;
        self
    }

    /// Sets the failure rate, in `(0, 1]`, at which the circuit trips.
    ///
    /// Default: 0.1 (10%).
    pub fn failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the minimum number of calls within the sampling window before
    /// the failure rate is evaluated at all.
    ///
    /// Default: 100. Must be at least 2.
    pub fn minimum_throughput(mut self, throughput: usize) -> Self {
        self.minimum_throughput = throughput;
        self
    }

    /// Sets the window over which health metrics are aggregated.
    ///
    /// Default: 30 seconds. Must be at least 500ms.
    pub fn sampling_duration(mut self, duration: Duration) -> Self {
        self.sampling_duration = duration;
        self
    }

    /// Sets a custom predicate deciding whether a failure counts against
    /// this breaker.
    ///
    /// Default: every failure counts.
    pub fn should_handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError<AppErr>) -> bool + Send + Sync + 'static,
    {
        self.should_handle = Arc::new(predicate);
        self
    }

    /// Sets the name of this strategy instance, used in telemetry.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when the circuit trips open.
    pub fn on_opened<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::OnCircuitOpened { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when the circuit closes.
    pub fn on_closed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::OnCircuitClosed { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when the circuit starts probing again.
    pub fn on_half_opened<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::OnCircuitHalfOpened { .. }) {
                f();
            }
        }));
        self
    }

    /// Validates and builds the strategy.
    pub fn build(self) -> Result<CircuitBreakerStrategy<AppErr>, ResilienceError<AppErr>> {
        if self.break_duration < MINIMUM_BREAK_DURATION {
            return Err(ResilienceError::InvalidOptions {
                field: "break_duration",
                reason: "must be at least 500ms".to_string(),
            });
        }
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(ResilienceError::InvalidOptions {
                field: "failure_threshold",
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if self.minimum_throughput < MINIMUM_THROUGHPUT_FLOOR {
            return Err(ResilienceError::InvalidOptions {
                field: "minimum_throughput",
                reason: "must be at least 2".to_string(),
            });
        }
        if self.sampling_duration < MINIMUM_BREAK_DURATION {
            return Err(ResilienceError::InvalidOptions {
                field: "sampling_duration",
                reason: "must be at least 500ms".to_string(),
            });
        }

        let behavior = Box::new(crate::behavior::HealthMetricBehavior::new(
            self.failure_threshold,
            self.minimum_throughput,
            self.sampling_duration,
        ));
        let controller = Arc::new(StateController::new(
            behavior,
            self.break_duration,
            self.time_provider,
            self.event_listeners,
            self.name.clone(),
        ));

        Ok(CircuitBreakerStrategy::new(
            controller,
            self.should_handle,
            self.name,
        ))
    }
}

impl<AppErr> Default for AdvancedCircuitBreakerOptionsBuilder<AppErr>
where
    AppErr: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_basic_build_succeeds() {
        let result = CircuitBreakerOptions::<String>::builder().build();
        assert!(result.is_ok());
    }

    #[test]
    fn sub_minimum_break_duration_is_rejected() {
        let err = CircuitBreakerOptions::<String>::builder()
            .break_duration(Duration::from_millis(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidOptions { field: "break_duration", .. }));
    }

    #[test]
    fn zero_failure_threshold_is_rejected() {
        let err = CircuitBreakerOptions::<String>::builder()
            .failure_threshold(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidOptions { field: "failure_threshold", .. }));
    }

    #[test]
    fn default_advanced_build_succeeds() {
        let result = AdvancedCircuitBreakerOptions::<String>::builder().build();
        assert!(result.is_ok());
    }

    #[test]
    fn out_of_range_advanced_threshold_is_rejected() {
        let err = AdvancedCircuitBreakerOptions::<String>::builder()
            .failure_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidOptions { field: "failure_threshold", .. }));
    }

    #[test]
    fn below_floor_minimum_throughput_is_rejected() {
        let err = AdvancedCircuitBreakerOptions::<String>::builder()
            .minimum_throughput(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidOptions { field: "minimum_throughput", .. }));
    }

    #[test]
    fn presets_build_successfully() {
        assert!(CircuitBreakerOptions::<String>::standard().build().is_ok());
        assert!(CircuitBreakerOptions::<String>::fast_fail().build().is_ok());
        assert!(CircuitBreakerOptions::<String>::tolerant().build().is_ok());
        assert!(AdvancedCircuitBreakerOptions::<String>::standard().build().is_ok());
        assert!(AdvancedCircuitBreakerOptions::<String>::fast_fail().build().is_ok());
        assert!(AdvancedCircuitBreakerOptions::<String>::tolerant().build().is_ok());
    }
}
