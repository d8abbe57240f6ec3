//! Stacks timeout and circuit breaker strategies into one pipeline, the
//! way an outbound HTTP client would: timeout innermost (bounds a single
//! call), circuit breaker outermost (stops calling a service that's
//! already failing).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilience_core::{BoxCallback, ExecutionContextPool, Outcome, Pipeline, ResilienceError};

#[derive(Debug, Clone)]
struct ApiError(String);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "api error: {}", self.0)
    }
}

impl std::error::Error for ApiError {}

fn build_pipeline(
    failure_threshold: u32,
) -> Pipeline<(), &'static str, ResilienceError<ApiError>> {
    let circuit_breaker: resilience_circuitbreaker::CircuitBreakerStrategy<ApiError> =
        resilience_circuitbreaker::CircuitBreakerOptions::builder()
            .failure_threshold(failure_threshold)
            .break_duration(Duration::from_secs(30))
            .build()
            .expect("valid circuit breaker options");

    let timeout: resilience_timeout::TimeoutStrategy = resilience_timeout::TimeoutOptions::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .expect("valid timeout options");

    let mut pipeline = Pipeline::new();
    pipeline.push(Arc::new(circuit_breaker));
    pipeline.push(Arc::new(timeout));
    pipeline
}

fn failing_callback<'a>(
    calls: Arc<AtomicUsize>,
) -> BoxCallback<'a, (), &'static str, ResilienceError<ApiError>> {
    Box::new(move |ctx, _state| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { (ctx, Outcome::Failure(ResilienceError::UserFailure(ApiError("down".into())))) })
    })
}

#[tokio::test]
async fn circuit_breaker_stops_calling_inner_timeout_once_tripped() {
    let pipeline = build_pipeline(2);
    let pool = ExecutionContextPool::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let ctx = pool.acquire();
        let (ctx, outcome) = pipeline
            .execute_core(failing_callback(Arc::clone(&calls)), ctx, ())
            .await;
        pool.release(ctx);
        assert!(outcome.is_failure());
    }

    // Third call: the circuit is open, so the callback underneath the
    // timeout layer is never invoked at all.
    let ctx = pool.acquire();
    let (ctx, outcome) = pipeline
        .execute_core(failing_callback(Arc::clone(&calls)), ctx, ())
        .await;
    pool.release(ctx);

    assert!(matches!(
        outcome,
        Outcome::Failure(ResilienceError::BrokenCircuit { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2, "callback must not run while the circuit is open");
}

#[tokio::test]
async fn successful_calls_never_trip_the_breaker() {
    let pipeline = build_pipeline(1);
    let pool = ExecutionContextPool::new();

    for _ in 0..5 {
        let ctx = pool.acquire();
        let callback: BoxCallback<'_, (), &'static str, ResilienceError<ApiError>> =
            Box::new(|ctx, _state| Box::pin(async { (ctx, Outcome::Success("ok")) }));
        let (ctx, outcome) = pipeline.execute_core(callback, ctx, ()).await;
        pool.release(ctx);
        assert!(outcome.is_success());
    }
}
