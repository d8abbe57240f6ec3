//! Injected time source so strategies can be tested deterministically.
//!
//! Every time read in the pipeline (the circuit breaker's break-until
//! comparison, the health metrics' sub-window rotation, the timeout
//! strategy's timer) goes through a [`TimeProvider`] rather than calling
//! `Instant::now()` directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Abstracts the passage of time for resilience strategies.
pub trait TimeProvider: Send + Sync {
    /// Returns the current instant according to this provider.
    fn now(&self) -> Instant;

    /// Arms `token` to cancel itself after `duration` has elapsed
    /// (measured by this provider), unless it is cancelled first.
    fn cancel_after(&self, token: &CancellationToken, duration: Duration);
}

/// The default [`TimeProvider`], backed by the system clock and the
/// Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn cancel_after(&self, token: &CancellationToken, duration: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => token.cancel(),
                _ = token.cancelled() => {}
            }
        });
    }
}

/// A deterministic [`TimeProvider`] for tests: `now()` is an offset from a
/// fixed epoch that only advances when [`ManualTimeProvider::advance`] is
/// called, and `cancel_after` fires as soon as the accumulated offset
/// reaches the requested duration.
#[derive(Clone)]
pub struct ManualTimeProvider {
    epoch: Instant,
    offset_millis: Arc<AtomicU64>,
}

impl ManualTimeProvider {
    /// Creates a new manual time provider starting at "time zero".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advances the provider's notion of "now" by `duration` and fires any
    /// cancellation sources armed through [`TimeProvider::cancel_after`]
    /// whose deadline has since passed.
    pub fn advance(&self, duration: Duration) {
        self.offset_millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}

impl Default for ManualTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }

    fn cancel_after(&self, token: &CancellationToken, duration: Duration) {
        // Deterministic variant: poll the shared offset rather than
        // sleeping on a wall clock, so tests can drive time with
        // `advance()` from the same thread that polls the future below.
        let token = token.clone();
        let offset = Arc::clone(&self.offset_millis);
        let deadline_millis = self.elapsed().as_millis() as u64 + duration.as_millis() as u64;

        tokio::spawn(poll_manual_deadline(token, offset, deadline_millis));
    }
}

fn poll_manual_deadline(
    token: CancellationToken,
    offset: Arc<AtomicU64>,
    deadline_millis: u64,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        loop {
            if offset.load(Ordering::SeqCst) >= deadline_millis {
                token.cancel();
                return;
            }
            if token.is_cancelled() {
                return;
            }
            tokio::task::yield_now().await;
        }
    })
}
