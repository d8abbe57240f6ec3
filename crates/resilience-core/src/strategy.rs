//! The strategy contract and pipeline composition.
//!
//! A strategy wraps a callback and decides whether, when, and how to invoke
//! it. The callback itself may be the user's own call or the next strategy
//! in a [`Pipeline`] — from a strategy's point of view the two are
//! indistinguishable, which is what lets strategies compose.
//!
//! The execution context is threaded by value rather than by `&mut`
//! reference: each layer takes ownership of `ctx`, hands it to its
//! callback, and gets it back alongside the outcome. This avoids pinning
//! every strategy and the boxed continuation to a single shared borrow
//! lifetime, at the cost of one extra move per layer — cheap next to the
//! `Box<dyn Future>` allocation already on this path.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::outcome::Outcome;

/// A boxed, `Send` future, used throughout the pipeline so strategy and
/// callback types never need to name each other's concrete future type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The callback a strategy executes. Invoked at most once per
/// `execute_core` call — a strategy that needs to retry the user's work
/// belongs outside this crate's scope, since neither the timeout nor the
/// circuit breaker strategies retry internally. Returns the context back
/// to the caller alongside the outcome so the strategy can inspect or
/// restore it after the callback completes.
pub type BoxCallback<'a, S, T, E> = Box<
    dyn FnOnce(ExecutionContext, S) -> BoxFuture<'a, (ExecutionContext, Outcome<T, E>)>
        + Send
        + 'a,
>;

/// A single fault-handling strategy.
///
/// `S` is the state threaded through to the callback (commonly `()`), `T`
/// the success type, `E` the failure type produced by the callback.
pub trait Strategy<S, T, E>: Send + Sync
where
    S: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Executes this strategy around `callback`.
    ///
    /// Implementations must call `callback` at most once; if they choose
    /// not to call it at all (e.g. the circuit breaker rejecting while
    /// open), they return the appropriate `Outcome::Failure` themselves,
    /// handing `ctx` straight back.
    fn execute_core<'a>(
        &'a self,
        callback: BoxCallback<'a, S, T, E>,
        ctx: ExecutionContext,
        state: S,
    ) -> BoxFuture<'a, (ExecutionContext, Outcome<T, E>)>;

    /// A short, stable name identifying this strategy instance for
    /// telemetry (the `strategy-key` tag).
    fn name(&self) -> &str;
}

/// An ordered composition of strategies, applied outermost-first.
///
/// `execute_core` on a pipeline of `[s1, s2, .., sn]` invokes `s1` with a
/// callback that, when called, invokes `s2` with a callback that invokes
/// `s3`, and so on, with the user's own callback innermost. Each strategy
/// sees only the next one as an opaque callback.
pub struct Pipeline<S, T, E> {
    strategies: Vec<Arc<dyn Strategy<S, T, E>>>,
}

impl<S, T, E> Pipeline<S, T, E>
where
    S: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates an empty pipeline. An empty pipeline's `execute_core` is
    /// equivalent to invoking the callback directly.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy as the new innermost layer.
    pub fn push(&mut self, strategy: Arc<dyn Strategy<S, T, E>>) -> &mut Self {
        self.strategies.push(strategy);
        self
    }

    /// The number of strategies currently composed.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// `true` if no strategies have been added.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Runs the pipeline around `callback`.
    pub fn execute_core<'a>(
        &'a self,
        callback: BoxCallback<'a, S, T, E>,
        ctx: ExecutionContext,
        state: S,
    ) -> BoxFuture<'a, (ExecutionContext, Outcome<T, E>)> {
        self.execute_from(0, callback, ctx, state)
    }

    fn execute_from<'a>(
        &'a self,
        index: usize,
        callback: BoxCallback<'a, S, T, E>,
        ctx: ExecutionContext,
        state: S,
    ) -> BoxFuture<'a, (ExecutionContext, Outcome<T, E>)> {
        if index == self.strategies.len() {
            return callback(ctx, state);
        }

        let next: BoxCallback<'a, S, T, E> = Box::new(move |ctx, state| {
            self.execute_from(index + 1, callback, ctx, state)
        });
        self.strategies[index].execute_core(next, ctx, state)
    }
}

impl<S, T, E> Default for Pipeline<S, T, E>
where
    S: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingStrategy {
        name: &'static str,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl Strategy<(), i32, String> for RecordingStrategy {
        fn execute_core<'a>(
            &'a self,
            callback: BoxCallback<'a, (), i32, String>,
            ctx: ExecutionContext,
            state: (),
        ) -> BoxFuture<'a, (ExecutionContext, Outcome<i32, String>)> {
            self.order.lock().unwrap().push(self.name);
            callback(ctx, state)
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn strategies_run_outermost_first() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline: Pipeline<(), i32, String> = Pipeline::new();
        pipeline.push(Arc::new(RecordingStrategy {
            name: "outer",
            order: Arc::clone(&order),
        }));
        pipeline.push(Arc::new(RecordingStrategy {
            name: "inner",
            order: Arc::clone(&order),
        }));

        let pool = crate::context::ExecutionContextPool::new();
        let ctx = pool.acquire();

        let callback: BoxCallback<'_, (), i32, String> =
            Box::new(|ctx, _state| Box::pin(async { (ctx, Outcome::Success(42)) }));

        let (ctx, outcome) = pipeline.execute_core(callback, ctx, ()).await;
        assert!(matches!(outcome, Outcome::Success(42)));
        assert_eq!(&*order.lock().unwrap(), &["outer", "inner"]);
        pool.release(ctx);
    }

    #[tokio::test]
    async fn empty_pipeline_invokes_callback_directly() {
        let pipeline: Pipeline<(), i32, String> = Pipeline::new();
        let pool = crate::context::ExecutionContextPool::new();
        let ctx = pool.acquire();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let callback: BoxCallback<'_, (), i32, String> = Box::new(move |ctx, _state| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { (ctx, Outcome::Success(1)) })
        });

        let (ctx, outcome) = pipeline.execute_core(callback, ctx, ()).await;
        assert!(matches!(outcome, Outcome::Success(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        pool.release(ctx);
    }
}
