//! The circuit breaker strategy itself: it observes outcomes and never
//! transforms them, only ever substituting its own `BrokenCircuit`
//! rejection when a call is blocked outright.

use std::sync::Arc;

use resilience_core::{
    BoxCallback, BoxFuture, ExecutionContext, Outcome, ReportedResilienceEvent, ResilienceError,
    ResilienceEvent, Strategy,
};

use crate::controller::{ManualControl, PreExecute, StateController, StateProvider};
use crate::options::ShouldHandle;
use crate::state::CircuitState;

/// A composable circuit breaker. Built via
/// [`crate::CircuitBreakerOptions::builder`] or
/// [`crate::AdvancedCircuitBreakerOptions::builder`].
pub struct CircuitBreakerStrategy<AppErr> {
    controller: Arc<StateController<AppErr>>,
    should_handle: ShouldHandle<AppErr>,
    name: String,
}

impl<AppErr> CircuitBreakerStrategy<AppErr>
where
    AppErr: Clone + Send + 'static,
{
    pub(crate) fn new(
        controller: Arc<StateController<AppErr>>,
        should_handle: ShouldHandle<AppErr>,
        name: String,
    ) -> Self {
        Self {
            controller,
            should_handle,
            name,
        }
    }

    /// This strategy instance's name, as used in telemetry.
    pub fn strategy_name(&self) -> &str {
        &self.name
    }

    /// A handle that forces this circuit `Isolated` or back to `Closed`,
    /// independent of calls flowing through the strategy.
    pub fn manual_control(&self) -> ManualControl<AppErr> {
        ManualControl::new(Arc::clone(&self.controller))
    }

    /// A read-only handle for observing this circuit's state without
    /// contending on its internal lock.
    pub fn state_provider(&self) -> StateProvider {
        StateProvider::new(self.controller.state_atomic())
    }

    /// The circuit's current state, read without contending on the lock.
    pub fn circuit_state(&self) -> CircuitState {
        self.controller.state_sync()
    }
}

impl<S, T, AppErr> Strategy<S, T, ResilienceError<AppErr>> for CircuitBreakerStrategy<AppErr>
where
    S: Send + 'static,
    T: Send + 'static,
    AppErr: Clone + Send + 'static,
{
    fn execute_core<'a>(
        &'a self,
        callback: BoxCallback<'a, S, T, ResilienceError<AppErr>>,
        ctx: ExecutionContext,
        state: S,
    ) -> BoxFuture<'a, (ExecutionContext, Outcome<T, ResilienceError<AppErr>>)> {
        Box::pin(async move {
            let pre_event = match self.controller.on_action_pre_execute() {
                PreExecute::Permit(event) => event,
                PreExecute::Broken(last_error) => {
                    let error = ResilienceError::BrokenCircuit {
                        last_error: last_error.map(Box::new),
                    };
                    return (ctx, Outcome::Failure(error));
                }
            };

            let (mut ctx, outcome) = callback(ctx, state).await;

            let post_event = match &outcome {
                Outcome::Failure(error) if (self.should_handle)(error) => {
                    self.controller.on_action_failure(error.clone())
                }
                _ => self.controller.on_action_success(),
            };

            for event in [pre_event, post_event].into_iter().flatten() {
                ctx.add_event(ReportedResilienceEvent::new(event.event_type()));
            }

            (ctx, outcome)
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CircuitBreakerEvent;
    use crate::options::{AdvancedCircuitBreakerOptions, CircuitBreakerOptions};
    use resilience_core::ExecutionContextPool;
    use resilience_core::ManualTimeProvider;
    use std::sync::Mutex;
    use std::time::Duration;

    fn ok_callback<'a>() -> BoxCallback<'a, (), i32, ResilienceError<String>> {
        Box::new(|ctx, _state| Box::pin(async { (ctx, Outcome::Success(1)) }))
    }

    fn err_callback<'a>() -> BoxCallback<'a, (), i32, ResilienceError<String>> {
        Box::new(|ctx, _state| {
            Box::pin(async { (ctx, Outcome::Failure(ResilienceError::UserFailure("boom".to_string()))) })
        })
    }

    #[tokio::test]
    async fn consecutive_breaker_trips_at_threshold_and_blocks() {
        let strategy: CircuitBreakerStrategy<String> = CircuitBreakerOptions::builder()
            .failure_threshold(3)
            .break_duration(Duration::from_secs(30))
            .build()
            .unwrap();

        let pool = ExecutionContextPool::new();

        for _ in 0..3 {
            let ctx = pool.acquire();
            let (ctx, outcome) = strategy.execute_core(err_callback(), ctx, ()).await;
            assert!(outcome.is_failure());
            pool.release(ctx);
        }

        assert_eq!(strategy.circuit_state(), CircuitState::Open);

        let ctx = pool.acquire();
        let (ctx, outcome) = strategy.execute_core(ok_callback(), ctx, ()).await;
        pool.release(ctx);

        match outcome {
            Outcome::Failure(ResilienceError::BrokenCircuit { last_error }) => {
                match last_error.map(|e| *e) {
                    Some(ResilienceError::UserFailure(msg)) => assert_eq!(msg, "boom"),
                    other => panic!("expected the tripping failure on record, got {other:?}"),
                }
            }
            other => panic!("expected BrokenCircuit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tripping_the_breaker_adds_an_event_to_the_context() {
        let strategy: CircuitBreakerStrategy<String> = CircuitBreakerOptions::builder()
            .failure_threshold(1)
            .break_duration(Duration::from_secs(30))
            .build()
            .unwrap();

        let pool = ExecutionContextPool::new();
        let ctx = pool.acquire();
        let (ctx, outcome) = strategy.execute_core(err_callback(), ctx, ()).await;
        assert!(outcome.is_failure());

        let names: Vec<&str> = ctx.resilience_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["OnCircuitOpened"]);
        pool.release(ctx);
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_in_order() {
        let time_provider = Arc::new(ManualTimeProvider::new());
        let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let events_for_opened = Arc::clone(&events);
        let events_for_half_opened = Arc::clone(&events);
        let events_for_closed = Arc::clone(&events);

        let strategy: CircuitBreakerStrategy<String> = CircuitBreakerOptions::builder()
            .failure_threshold(1)
            .break_duration(Duration::from_secs(10))
            .time_provider(Arc::clone(&time_provider) as Arc<dyn resilience_core::TimeProvider>)
            .on_opened(move || events_for_opened.lock().unwrap().push("opened"))
            .on_half_opened(move || events_for_half_opened.lock().unwrap().push("half_opened"))
            .on_closed(move || events_for_closed.lock().unwrap().push("closed"))
            .build()
            .unwrap();

        let pool = ExecutionContextPool::new();

        let ctx = pool.acquire();
        let (ctx, _) = strategy.execute_core(err_callback(), ctx, ()).await;
        pool.release(ctx);
        assert_eq!(strategy.circuit_state(), CircuitState::Open);

        time_provider.advance(Duration::from_secs(11));

        let ctx = pool.acquire();
        let (ctx, outcome) = strategy.execute_core(ok_callback(), ctx, ()).await;
        assert!(outcome.is_success());
        assert_eq!(strategy.circuit_state(), CircuitState::Closed);

        let names: Vec<&str> = ctx.resilience_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["OnCircuitHalfOpened", "OnCircuitClosed"]);
        pool.release(ctx);

        assert_eq!(&*events.lock().unwrap(), &["opened", "half_opened", "closed"]);
    }

    #[tokio::test]
    async fn isolate_blocks_calls_and_reset_restores_service() {
        let strategy: CircuitBreakerStrategy<String> =
            CircuitBreakerOptions::builder().build().unwrap();
        let pool = ExecutionContextPool::new();

        strategy.manual_control().isolate();
        assert_eq!(strategy.circuit_state(), CircuitState::Isolated);

        let ctx = pool.acquire();
        let (ctx, outcome) = strategy.execute_core(ok_callback(), ctx, ()).await;
        pool.release(ctx);
        assert!(matches!(
            outcome,
            Outcome::Failure(ResilienceError::BrokenCircuit { .. })
        ));

        strategy.manual_control().reset();
        assert_eq!(strategy.circuit_state(), CircuitState::Closed);

        let ctx = pool.acquire();
        let (ctx, outcome) = strategy.execute_core(ok_callback(), ctx, ()).await;
        pool.release(ctx);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn should_handle_predicate_excludes_some_failures() {
        let strategy: CircuitBreakerStrategy<String> = CircuitBreakerOptions::builder()
            .failure_threshold(1)
            .should_handle(|error| !matches!(error, ResilienceError::UserFailure(msg) if msg == "ignored"))
            .build()
            .unwrap();
        let pool = ExecutionContextPool::new();

        let ignored_callback: BoxCallback<'_, (), i32, ResilienceError<String>> = Box::new(|ctx, _state| {
            Box::pin(async { (ctx, Outcome::Failure(ResilienceError::UserFailure("ignored".to_string()))) })
        });

        let ctx = pool.acquire();
        let (ctx, _) = strategy.execute_core(ignored_callback, ctx, ()).await;
        pool.release(ctx);

        assert_eq!(strategy.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn advanced_breaker_stays_closed_below_minimum_throughput_then_opens() {
        let strategy: CircuitBreakerStrategy<String> = AdvancedCircuitBreakerOptions::builder()
            .failure_threshold(0.5)
            .minimum_throughput(100)
            .sampling_duration(Duration::from_secs(30))
            .build()
            .unwrap();

        let pool = ExecutionContextPool::new();

        for call in 1..=99 {
            let ctx = pool.acquire();
            let (ctx, outcome) = strategy.execute_core(err_callback(), ctx, ()).await;
            assert!(outcome.is_failure());
            pool.release(ctx);
            assert_eq!(
                strategy.circuit_state(),
                CircuitState::Closed,
                "breaker opened early at call {call}, below minimum throughput"
            );
        }

        let ctx = pool.acquire();
        let (ctx, outcome) = strategy.execute_core(err_callback(), ctx, ()).await;
        assert!(outcome.is_failure());
        pool.release(ctx);
        assert_eq!(strategy.circuit_state(), CircuitState::Open);
    }

    #[test]
    fn event_target_states_match_emitted_events() {
        assert_eq!(
            CircuitBreakerEvent::OnCircuitOpened {
                pattern_name: "x".into(),
                timestamp: std::time::Instant::now(),
            }
            .target_state(),
            CircuitState::Open
        );
    }
}
