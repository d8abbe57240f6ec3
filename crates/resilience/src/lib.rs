//! Composable resilience strategies, re-exported behind feature flags.
//!
//! ```toml
//! [dependencies]
//! resilience = { version = "0.8", features = ["timeout", "circuitbreaker"] }
//! ```
//!
//! The `core` module (re-exported from [`resilience_core`]) is always
//! available: [`core::Pipeline`], [`core::Strategy`] and
//! [`core::ExecutionContext`] are what the `timeout` and `circuitbreaker`
//! strategies below compose into. Enable `tower` to mount a pipeline as a
//! `tower::Layer`/`tower::Service`.

pub use resilience_core as core;

#[cfg(feature = "timeout")]
pub use resilience_timeout as timeout;

#[cfg(feature = "circuitbreaker")]
pub use resilience_circuitbreaker as circuitbreaker;

#[cfg(feature = "tower")]
mod tower_layer;

#[cfg(feature = "tower")]
pub use tower_layer::{PipelineLayer, PipelineService};
