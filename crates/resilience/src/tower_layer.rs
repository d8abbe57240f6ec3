//! Adapts a [`Pipeline`] into a `tower::Layer`/`tower::Service` pair, so
//! hosts already built on `tower` can mount a pipeline the same way they'd
//! mount any other middleware.
//!
//! The wrapped service's error type is always [`ResilienceError<E>`]: a
//! pipeline strategy can itself fail the call (a `TimeoutRejected`, a
//! `BrokenCircuit`) without the inner service ever being invoked, so the
//! inner service's own error must be unifiable with those.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use resilience_core::{
    BoxCallback, ExecutionContext, ExecutionContextPool, Outcome, Pipeline, ResilienceError,
    TelemetryIdentity, TelemetrySource,
};
use tower::{Layer, Service};

/// A `tower::Layer` that wraps an inner service with a [`Pipeline`].
pub struct PipelineLayer<Req, Res, AppErr> {
    pipeline: Arc<Pipeline<Req, Res, ResilienceError<AppErr>>>,
    pool: Arc<ExecutionContextPool>,
    telemetry: Arc<TelemetrySource>,
}

impl<Req, Res, AppErr> Clone for PipelineLayer<Req, Res, AppErr> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            pool: Arc::clone(&self.pool),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

impl<Req, Res, AppErr> PipelineLayer<Req, Res, AppErr>
where
    Req: Send + 'static,
    Res: Send + 'static,
    AppErr: Send + 'static,
{
    /// Wraps an already-assembled pipeline for use as a `tower::Layer`.
    pub fn new(pipeline: Pipeline<Req, Res, ResilienceError<AppErr>>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            pool: Arc::new(ExecutionContextPool::new()),
            telemetry: Arc::new(TelemetrySource::new(TelemetryIdentity {
                builder_name: "pipeline".into(),
                builder_properties: Vec::new(),
                strategy_name: "pipeline".into(),
                strategy_type: "pipeline",
            })),
        }
    }
}

impl<S, Req, Res, AppErr> Layer<S> for PipelineLayer<Req, Res, AppErr>
where
    S: Clone,
    Req: Send + 'static,
    Res: Send + 'static,
    AppErr: Send + 'static,
{
    type Service = PipelineService<S, Req, Res, AppErr>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            inner,
            pipeline: Arc::clone(&self.pipeline),
            pool: Arc::clone(&self.pool),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

/// A `tower::Service` running its requests through a [`Pipeline`] before
/// (and around) delegating to the inner service.
pub struct PipelineService<S, Req, Res, AppErr> {
    inner: S,
    pipeline: Arc<Pipeline<Req, Res, ResilienceError<AppErr>>>,
    pool: Arc<ExecutionContextPool>,
    telemetry: Arc<TelemetrySource>,
}

impl<S: Clone, Req, Res, AppErr> Clone for PipelineService<S, Req, Res, AppErr> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            pipeline: Arc::clone(&self.pipeline),
            pool: Arc::clone(&self.pool),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

/// The `{result-type, exception-name}` telemetry tags for an outcome,
/// per spec.md §6.
fn telemetry_outcome_tags<T, E>(outcome: &Outcome<T, ResilienceError<E>>) -> (&'static str, Option<&'static str>) {
    match outcome {
        Outcome::Success(_) => ("Success", None),
        Outcome::Failure(error) => (
            "Failure",
            Some(match error {
                ResilienceError::InvalidArgument { .. } => "InvalidArgument",
                ResilienceError::InvalidOptions { .. } => "InvalidOptions",
                ResilienceError::OperationCancelled => "OperationCancelled",
                ResilienceError::TimeoutRejected { .. } => "TimeoutRejected",
                ResilienceError::BrokenCircuit { .. } => "BrokenCircuit",
                ResilienceError::UserFailure(_) => "UserFailure",
            }),
        ),
    }
}

impl<S, Req, Res, AppErr> Service<Req> for PipelineService<S, Req, Res, AppErr>
where
    S: Service<Req, Response = Res, Error = AppErr> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    Res: Send + 'static,
    AppErr: Send + 'static,
{
    type Response = Res;
    type Error = ResilienceError<AppErr>;
    type Future = BoxFuture<'static, Result<Res, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(ResilienceError::UserFailure)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let pipeline = Arc::clone(&self.pipeline);
        let pool = Arc::clone(&self.pool);
        let telemetry = Arc::clone(&self.telemetry);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let ctx = pool.acquire();

            let callback: BoxCallback<'_, Req, Res, ResilienceError<AppErr>> =
                Box::new(move |ctx, req| {
                    Box::pin(async move {
                        let result = inner.call(req).await;
                        (ctx, Outcome::from_result(result.map_err(ResilienceError::UserFailure)))
                    })
                });

            let started = Instant::now();
            let (ctx, outcome) = pipeline.execute_core(callback, ctx, req).await;
            let elapsed = started.elapsed();

            let (result_type, exception_name) = telemetry_outcome_tags(&outcome);
            telemetry.record_execution_duration(
                telemetry.identity().strategy_name.as_str(),
                result_type,
                exception_name,
                ctx.is_healthy(),
                elapsed,
                &Default::default(),
            );

            pool.release(ctx);
            outcome.into_result()
        })
    }
}
