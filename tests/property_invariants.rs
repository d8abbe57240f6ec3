//! Property-based checks for the invariants spec.md's testable-properties
//! section names: pool acquire/release, and the two breaker behaviors'
//! threshold logic under randomized call sequences.

use std::time::{Duration, Instant};

use proptest::prelude::*;

use resilience_circuitbreaker::{BehaviorPolicy, CircuitState, ConsecutiveFailuresBehavior, HealthMetricBehavior};
use resilience_core::ExecutionContextPool;

proptest! {
    /// For all sequences of acquire/release, the next acquire always
    /// returns a context satisfying the default predicate: no recorded
    /// events, healthy, synchronous.
    #[test]
    fn pool_acquire_after_any_release_sequence_is_default(release_count in 0usize..16) {
        let pool = ExecutionContextPool::new();

        for _ in 0..release_count {
            let mut ctx = pool.acquire();
            ctx.initialize::<()>(true);
            pool.release(ctx);
        }

        let ctx = pool.acquire();
        prop_assert!(ctx.resilience_events().is_empty());
        prop_assert!(ctx.is_healthy());
    }

    /// `ConsecutiveFailuresBehavior(threshold)`: any run of `threshold - 1`
    /// failures followed by a success never trips, and `threshold`
    /// consecutive failures always trips on the last one.
    #[test]
    fn consecutive_failures_trips_exactly_at_threshold(threshold in 1u32..20) {
        let now = Instant::now();

        let mut never_trips = ConsecutiveFailuresBehavior::new(threshold);
        for _ in 0..threshold - 1 {
            prop_assert!(!never_trips.on_action_failure(CircuitState::Closed, now));
        }
        never_trips.on_action_success(CircuitState::Closed, now);
        prop_assert!(!never_trips.on_action_failure(CircuitState::Closed, now));

        let mut trips = ConsecutiveFailuresBehavior::new(threshold);
        for _ in 0..threshold - 1 {
            prop_assert!(!trips.on_action_failure(CircuitState::Closed, now));
        }
        prop_assert!(trips.on_action_failure(CircuitState::Closed, now));
    }

    /// `ConsecutiveFailuresBehavior` is indifferent to interleaved successes
    /// that don't immediately precede the threshold-reaching failure: a
    /// randomized sequence of failures with scattered resets never trips
    /// before accumulating `threshold` failures since the last reset.
    #[test]
    fn consecutive_failures_matches_run_length_since_last_success(
        threshold in 1u32..10,
        outcomes in prop::collection::vec(any::<bool>(), 0..50),
    ) {
        let now = Instant::now();
        let mut behavior = ConsecutiveFailuresBehavior::new(threshold);
        let mut run = 0u32;

        for &succeeded in &outcomes {
            if succeeded {
                behavior.on_action_success(CircuitState::Closed, now);
                run = 0;
            } else {
                run += 1;
                let tripped = behavior.on_action_failure(CircuitState::Closed, now);
                prop_assert_eq!(tripped, run >= threshold);
                if tripped {
                    run = 0;
                    behavior.on_circuit_closed();
                }
            }
        }
    }

    /// `HealthMetricBehavior`: below `minimum_throughput`, no failure rate
    /// trips the breaker; once enough failing calls accumulate to reach
    /// both the minimum throughput and the failure-rate threshold, it trips.
    #[test]
    fn health_metric_behavior_respects_minimum_throughput(
        minimum_throughput in 1usize..50,
        failure_threshold in 0.1f64..0.9,
    ) {
        let mut behavior = HealthMetricBehavior::new(failure_threshold, minimum_throughput, Duration::from_secs(60));
        let now = Instant::now();

        let mut tripped_at = None;
        for call in 1..=minimum_throughput {
            let tripped = behavior.on_action_failure(CircuitState::Closed, now);
            if call < minimum_throughput {
                prop_assert!(!tripped, "tripped below minimum throughput at call {call}");
            }
            if tripped {
                tripped_at = Some(call);
                break;
            }
        }

        prop_assert!(tripped_at.is_none() || tripped_at == Some(minimum_throughput));
    }
}
