//! Cancellation sources and their pool.
//!
//! A [`CancellationSource`] wraps a [`tokio_util::sync::CancellationToken`].
//! The timeout strategy acquires one from the pool, links it as a *child*
//! of the context's current signal via [`CancellationSource::link_to`], and
//! arms it with a [`crate::time::TimeProvider`]. Cancelling the parent
//! always cancels the child (so outer cancellation still propagates),
//! while the child can additionally be cancelled on its own (the timer
//! firing) without affecting the parent. Racing `token.cancelled()`
//! against the callback and then checking `parent.is_cancelled()` is
//! exactly how the "inner fired, outer did not" distinction in the spec is
//! detected.

use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A single cancellation handle, pooled to avoid a fresh allocation on
/// every timeout-guarded call.
pub struct CancellationSource {
    token: CancellationToken,
}

impl CancellationSource {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns the underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Re-links this source as a child of `parent`: cancelling `parent`
    /// from this point on also cancels this source, while cancelling this
    /// source does not affect `parent`.
    pub fn link_to(&mut self, parent: &CancellationToken) {
        self.token = parent.child_token();
    }

    /// Resets this source so it can be returned to its pool and reused.
    /// A cancelled `CancellationToken` cannot be un-cancelled, so "reset"
    /// here means discarding the token (and any parent linkage) and
    /// minting a fresh, standalone one.
    fn reset(&mut self) {
        self.token = CancellationToken::new();
    }
}

/// A process-wide pool of [`CancellationSource`]s.
///
/// Unbounded; the only contract is that a source released and then
/// immediately acquired again may be the same underlying allocation.
pub struct CancellationSourcePool {
    free: Mutex<Vec<CancellationSource>>,
}

impl CancellationSourcePool {
    /// Creates a new, empty pool.
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Acquires a cancellation source, reusing a released one if available.
    /// The returned source always has a fresh, un-cancelled, unlinked
    /// token.
    pub fn acquire(&self) -> CancellationSource {
        let mut free = self.free.lock().unwrap_or_else(|poison| poison.into_inner());
        free.pop().unwrap_or_else(CancellationSource::new)
    }

    /// Returns `source` to the pool after resetting it to a fresh,
    /// un-cancelled, unlinked state.
    pub fn release(&self, mut source: CancellationSource) {
        source.reset();
        let mut free = self.free.lock().unwrap_or_else(|poison| poison.into_inner());
        free.push(source);
    }
}

impl Default for CancellationSourcePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_source_is_reusable_and_uncancelled() {
        let pool = CancellationSourcePool::new();
        let source = pool.acquire();
        source.token().cancel();
        assert!(source.token().is_cancelled());

        pool.release(source);
        let reused = pool.acquire();
        assert!(!reused.token().is_cancelled());
    }

    #[test]
    fn child_is_cancelled_when_parent_is() {
        let parent = CancellationToken::new();
        let mut source = CancellationSource::new();
        source.link_to(&parent);
        assert!(!source.token().is_cancelled());

        parent.cancel();
        assert!(source.token().is_cancelled());
    }

    #[test]
    fn parent_survives_child_cancellation() {
        let parent = CancellationToken::new();
        let mut source = CancellationSource::new();
        source.link_to(&parent);

        source.token().cancel();
        assert!(source.token().is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn reset_drops_parent_linkage() {
        let parent = CancellationToken::new();
        let mut source = CancellationSource::new();
        source.link_to(&parent);

        source.reset();
        parent.cancel();
        assert!(!source.token().is_cancelled());
    }
}
