//! Execution context: the per-call, poolable carrier that strategies thread
//! through `execute_core`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::error::ResilienceError;

/// The static type a call is expected to produce, tracked so telemetry and
/// debugging can report it without the strategies themselves being generic
/// over `T` everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTypeTag {
    /// No call has been initialized on this context yet.
    Unknown,
    /// The call produces no meaningful result (`()`).
    Void,
    /// The call produces a value of the given type.
    Typed(TypeId),
}

impl Default for ResultTypeTag {
    fn default() -> Self {
        ResultTypeTag::Unknown
    }
}

/// A named marker recording that some resilience event occurred during a
/// call. Equality is by name, per the spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedResilienceEvent {
    name: String,
}

impl ReportedResilienceEvent {
    /// Creates a new reported event with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The event's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A typed key into a [`Properties`] bag. The phantom `T` parameter is the
/// declared value type for this key; `get`/`set` are only callable with a
/// matching `T`, so the bag is heterogeneous but type-safe at each key.
pub struct PropertyKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PropertyKey<T> {
    /// Creates a new property key with the given unique name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

// Manual impls: `#[derive(Clone, Copy)]` would incorrectly require `T: Clone`.
impl<T> Clone for PropertyKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for PropertyKey<T> {}

/// A key-indexed heterogeneous map from [`PropertyKey<T>`] to values of
/// type `T`. Keys are unique by name.
#[derive(Default)]
pub struct Properties {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Properties {
    /// Creates an empty properties bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value for `key`, returning the previous value if present.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: PropertyKey<T>, value: T) -> Option<T> {
        self.values
            .insert(key.name, Box::new(value))
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Gets a reference to the value for `key`, if set.
    pub fn get<T: Send + Sync + 'static>(&self, key: PropertyKey<T>) -> Option<&T> {
        self.values.get(key.name).and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Removes and returns the value for `key`, if set.
    pub fn remove<T: Send + Sync + 'static>(&mut self, key: PropertyKey<T>) -> Option<T> {
        self.values
            .remove(key.name)
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Clears all properties.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Returns `true` if no properties are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Per-call mutable carrier of cancellation, mode, properties, and emitted
/// events. Acquired from an [`ExecutionContextPool`] and released back to
/// it when the call completes.
pub struct ExecutionContext {
    cancellation: CancellationToken,
    is_synchronous: bool,
    continue_on_captured_context: bool,
    result_type: ResultTypeTag,
    is_initialized: bool,
    properties: Properties,
    resilience_events: Vec<ReportedResilienceEvent>,
}

impl ExecutionContext {
    fn default_state() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            is_synchronous: false,
            continue_on_captured_context: false,
            result_type: ResultTypeTag::Unknown,
            is_initialized: false,
            properties: Properties::new(),
            resilience_events: Vec::new(),
        }
    }

    /// Initializes this context for a call producing `T`, recording
    /// whether the call executes synchronously.
    pub fn initialize<T: 'static>(&mut self, is_synchronous: bool) {
        self.result_type = if TypeId::of::<T>() == TypeId::of::<VoidResult>() {
            ResultTypeTag::Void
        } else {
            ResultTypeTag::Typed(TypeId::of::<T>())
        };
        self.is_initialized = true;
        self.is_synchronous = is_synchronous;
    }

    /// Appends a resilience event to this context's event log.
    pub fn add_event(&mut self, event: ReportedResilienceEvent) {
        self.resilience_events.push(event);
    }

    /// The events reported so far during this call.
    pub fn resilience_events(&self) -> &[ReportedResilienceEvent] {
        &self.resilience_events
    }

    /// `true` iff no resilience events were reported — the basis for the
    /// `execution-health` telemetry tag.
    pub fn is_healthy(&self) -> bool {
        self.resilience_events.is_empty()
    }

    /// The current cancellation signal.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Replaces the cancellation signal, returning the previous one so the
    /// caller can restore it later.
    pub fn swap_cancellation(&mut self, new_signal: CancellationToken) -> CancellationToken {
        std::mem::replace(&mut self.cancellation, new_signal)
    }

    /// Whether this call runs synchronously.
    pub fn is_synchronous(&self) -> bool {
        self.is_synchronous
    }

    /// Whether a captured host scheduling context should be resumed on.
    /// Always `false` when no host scheduling context exists.
    pub fn continue_on_captured_context(&self) -> bool {
        self.continue_on_captured_context
    }

    /// Sets whether a captured host scheduling context should be resumed on.
    pub fn set_continue_on_captured_context(&mut self, value: bool) {
        self.continue_on_captured_context = value;
    }

    /// The static result type tag for the current call.
    pub fn result_type(&self) -> ResultTypeTag {
        self.result_type
    }

    /// Whether `initialize` has been called since the last `release`.
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Read-only access to the properties bag.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Mutable access to the properties bag.
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    /// Resets all fields to their defaults, as `release` requires.
    fn reset(&mut self) {
        *self = Self::default_state();
    }

    /// Returns `true` iff this context matches the default predicate
    /// `acquire` is required to satisfy: uninitialized, unknown result
    /// type, no cancellation requested, empty collections, synchronous
    /// off, captured-context continuation off.
    pub fn is_default(&self) -> bool {
        !self.is_initialized
            && self.result_type == ResultTypeTag::Unknown
            && !self.cancellation.is_cancelled()
            && self.properties.is_empty()
            && self.resilience_events.is_empty()
            && !self.is_synchronous
            && !self.continue_on_captured_context
    }
}

/// Sentinel type for "no result" (`T = VoidResult` means the call is
/// fire-and-forget).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoidResult;

/// A process-wide pool of [`ExecutionContext`]s.
pub struct ExecutionContextPool {
    free: Mutex<Vec<ExecutionContext>>,
}

impl ExecutionContextPool {
    /// Creates a new, empty pool.
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Acquires a context, reusing a released one if available. The
    /// returned context always satisfies [`ExecutionContext::is_default`].
    pub fn acquire(&self) -> ExecutionContext {
        let mut free = self.free.lock().unwrap_or_else(|poison| poison.into_inner());
        free.pop().unwrap_or_else(ExecutionContext::default_state)
    }

    /// Releases `ctx` back to the pool after resetting it to defaults.
    pub fn release(&self, mut ctx: ExecutionContext) {
        ctx.reset();
        let mut free = self.free.lock().unwrap_or_else(|poison| poison.into_inner());
        free.push(ctx);
    }

    /// Releases an optional context, surfacing `InvalidArgument` for the
    /// `None` case — the idiomatic analogue of "releasing a null reference
    /// fails".
    pub fn release_handle(
        &self,
        ctx: Option<ExecutionContext>,
    ) -> Result<(), ResilienceError<Infallible>> {
        match ctx {
            Some(ctx) => {
                self.release(ctx);
                Ok(())
            }
            None => Err(ResilienceError::InvalidArgument { argument: "ctx" }),
        }
    }
}

impl Default for ExecutionContextPool {
    fn default() -> Self {
        Self::new()
    }
}
