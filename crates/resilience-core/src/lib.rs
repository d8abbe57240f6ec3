//! Core infrastructure shared by every resilience strategy: the execution
//! context strategies thread through a call, the unified error and outcome
//! types, the strategy/pipeline contract, and the telemetry sink.
//!
//! Concrete strategies (timeout, circuit breaker) live in their own crates
//! and depend on this one.

pub mod cancellation;
pub mod context;
pub mod error;
pub mod events;
pub mod outcome;
pub mod strategy;
pub mod telemetry;
pub mod time;

pub use cancellation::{CancellationSource, CancellationSourcePool};
pub use context::{
    ExecutionContext, ExecutionContextPool, Properties, PropertyKey, ReportedResilienceEvent,
    ResultTypeTag, VoidResult,
};
pub use error::ResilienceError;
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, ResilienceEvent};
pub use outcome::Outcome;
pub use strategy::{BoxCallback, BoxFuture, Pipeline, Strategy};
pub use telemetry::{EnrichmentContext, Enricher, EventArgs, TelemetryIdentity, TelemetryReport, TelemetrySource};
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
