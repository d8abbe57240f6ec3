//! Circuit breaker strategy: the basic consecutive-failures variant and
//! the advanced rolling-health-metric variant, sharing one state machine.

mod behavior;
mod controller;
mod events;
mod health;
mod options;
mod state;
mod strategy;

pub use behavior::{BehaviorPolicy, ConsecutiveFailuresBehavior, HealthMetricBehavior};
pub use controller::{ManualControl, PreExecute, StateController, StateProvider};
pub use events::CircuitBreakerEvent;
pub use health::{make_health_metrics, HealthInfo, HealthMetrics, RollingHealthMetrics, SingleWindowHealthMetrics};
pub use options::{
    AdvancedCircuitBreakerOptions, AdvancedCircuitBreakerOptionsBuilder, CircuitBreakerOptions,
    CircuitBreakerOptionsBuilder, ShouldHandle,
};
pub use state::CircuitState;
pub use strategy::CircuitBreakerStrategy;
