//! The timeout strategy itself.

use std::sync::Arc;

use resilience_core::{
    BoxCallback, BoxFuture, CancellationSourcePool, ExecutionContext, ExecutionContextPool,
    Outcome, ReportedResilienceEvent, ResilienceError, ResilienceEvent, Strategy,
    SystemTimeProvider, TimeProvider,
};

use crate::events::TimeoutEvent;
use crate::options::{is_enabled, TimeoutOptions};

/// Races the wrapped callback against a timer, per call.
///
/// Implements [`Strategy`] for any `S`/`T` with `E = ResilienceError<AppErr>` —
/// every strategy in this workspace speaks `ResilienceError` on the wire so
/// composing strategies never needs layer-specific `From` glue at the
/// pipeline boundary.
///
/// Rust cannot cooperatively cancel a future without dropping it, and
/// [`ExecutionContext`] is not cheaply cloneable (its properties bag holds
/// `Box<dyn Any>`). So when the timer wins the race, the in-flight callback
/// future — and the context moved into it — is dropped, exactly as
/// `tokio::time::timeout` drops its future. The strategy hands the caller
/// back a freshly pooled context rather than the original, seeded with the
/// `OnTimeout` event and the restored cancellation signal.
pub struct TimeoutStrategy {
    options: TimeoutOptions,
    cancellation_pool: CancellationSourcePool,
    context_pool: ExecutionContextPool,
    time_provider: Arc<dyn TimeProvider>,
}

impl TimeoutStrategy {
    pub(crate) fn new(options: TimeoutOptions) -> Self {
        Self {
            options,
            cancellation_pool: CancellationSourcePool::new(),
            context_pool: ExecutionContextPool::new(),
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    /// Overrides the time provider. Used by tests to drive timing
    /// deterministically instead of sleeping on the wall clock.
    pub fn with_time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = provider;
        self
    }

    /// This strategy instance's name, as set on its options.
    pub fn strategy_name(&self) -> &str {
        &self.options.name
    }
}

enum Race<T, E> {
    Completed(ExecutionContext, Outcome<T, E>),
    Fired,
}

impl<S, T, AppErr> Strategy<S, T, ResilienceError<AppErr>> for TimeoutStrategy
where
    S: Send + 'static,
    T: Send + 'static,
    AppErr: Send + 'static,
{
    fn execute_core<'a>(
        &'a self,
        callback: BoxCallback<'a, S, T, ResilienceError<AppErr>>,
        mut ctx: ExecutionContext,
        state: S,
    ) -> BoxFuture<'a, (ExecutionContext, Outcome<T, ResilienceError<AppErr>>)> {
        Box::pin(async move {
            // Step 1: resolve the timeout for this call.
            let timeout = match &self.options.timeout_generator {
                Some(generator) => generator(&ctx).await,
                None => self.options.timeout,
            };

            // Step 2: no timeout applies — forward unchanged.
            if !is_enabled(timeout) {
                return callback(ctx, state).await;
            }

            let was_synchronous = ctx.is_synchronous();

            // Step 3: a fresh pooled source, linked as a child of the
            // context's current signal so outer cancellation still
            // propagates down, and armed against our own timer.
            let mut source = self.cancellation_pool.acquire();
            let previous = ctx.cancellation().clone();
            source.link_to(&previous);
            self.time_provider.cancel_after(source.token(), timeout);
            let inner_token = source.token().clone();

            // Step 4: swap it in as the active signal for the callback.
            ctx.swap_cancellation(inner_token.clone());

            let race = tokio::select! {
                biased;
                (ctx, outcome) = callback(ctx, state) => Race::Completed(ctx, outcome),
                _ = inner_token.cancelled() => Race::Fired,
            };

            self.cancellation_pool.release(source);

            match race {
                // Step 5: normal completion (or an inner failure unrelated
                // to this timer) — restore the previous signal and return.
                Race::Completed(mut ctx, outcome) => {
                    ctx.swap_cancellation(previous);
                    (ctx, outcome)
                }
                Race::Fired => {
                    let mut fresh = self.context_pool.acquire();
                    fresh.initialize::<T>(was_synchronous);
                    fresh.swap_cancellation(previous.clone());

                    if previous.is_cancelled() {
                        // Step 7: the outer signal fired too (it cancels
                        // this source's child token by construction), so
                        // this is outer cancellation, not our own timeout.
                        (fresh, Outcome::Failure(ResilienceError::OperationCancelled))
                    } else {
                        // Step 6: our timer fired first. Report and fail.
                        let event = TimeoutEvent::OnTimeout {
                            pattern_name: self.options.name.clone(),
                            timestamp: self.time_provider.now(),
                            timeout,
                        };
                        fresh.add_event(ReportedResilienceEvent::new(event.event_type()));
                        self.options.event_listeners.emit(&event);
                        record_timeout(&self.options.name, timeout);

                        (fresh, Outcome::Failure(ResilienceError::TimeoutRejected { timeout }))
                    }
                }
            }
        })
    }

    fn name(&self) -> &str {
        &self.options.name
    }
}

#[allow(unused_variables)]
fn record_timeout(pattern_name: &str, timeout: std::time::Duration) {
    #[cfg(feature = "tracing")]
    tracing::warn!(pattern = pattern_name, ?timeout, "timeout strategy rejected call");

    #[cfg(feature = "metrics")]
    metrics::counter!("resilience_timeout_rejections_total", "pattern" => pattern_name.to_string())
        .increment(1);
}
