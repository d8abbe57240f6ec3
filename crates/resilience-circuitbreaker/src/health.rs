//! Rolling health statistics for the advanced (health-metric) behavior.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of sub-windows a [`RollingHealthMetrics`] divides its sampling
/// duration into.
const WINDOW_COUNT: u32 = 10;

/// The shortest sub-window duration worth tracking individually; below
/// this, rolling sub-windows would advance faster than they could usefully
/// discriminate, so a single counter pair is used instead.
const TIMER_RESOLUTION: Duration = Duration::from_millis(20);

/// A point-in-time snapshot of a circuit breaker's call health.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInfo {
    /// Number of samples recorded in the current window.
    pub throughput: usize,
    /// Number of those samples that were failures.
    pub failure_count: usize,
    /// `failure_count / throughput`, or `0.0` when `throughput == 0`.
    pub failure_rate: f64,
}

impl HealthInfo {
    fn from_counts(throughput: usize, failure_count: usize) -> Self {
        let failure_rate = if throughput > 0 {
            failure_count as f64 / throughput as f64
        } else {
            0.0
        };
        Self {
            throughput,
            failure_count,
            failure_rate,
        }
    }
}

/// Tracks successes and failures over a rolling sampling window.
///
/// Implementations are always called with the state controller's lock
/// held, so no internal synchronization is needed.
pub trait HealthMetrics: Send {
    /// Records a successful call at `now`.
    fn record_success(&mut self, now: Instant);

    /// Records a failed call at `now`.
    fn record_failure(&mut self, now: Instant);

    /// Returns the current health snapshot as of `now`.
    fn health_info(&mut self, now: Instant) -> HealthInfo;

    /// Clears all recorded samples.
    fn reset(&mut self);
}

/// Builds the appropriate [`HealthMetrics`] implementation for
/// `sampling_duration`, per the factory rule: sampling durations shorter
/// than `WINDOW_COUNT * TIMER_RESOLUTION` (200ms) cannot usefully support
/// ten sub-windows, so a single counter pair is used instead.
pub fn make_health_metrics(sampling_duration: Duration) -> Box<dyn HealthMetrics> {
    if sampling_duration < TIMER_RESOLUTION * WINDOW_COUNT {
        Box::new(SingleWindowHealthMetrics::new(sampling_duration))
    } else {
        Box::new(RollingHealthMetrics::new(sampling_duration))
    }
}

/// One counter pair, reset wholesale when the window expires.
pub struct SingleWindowHealthMetrics {
    sampling_duration: Duration,
    window_start: Option<Instant>,
    successes: usize,
    failures: usize,
}

impl SingleWindowHealthMetrics {
    /// Creates a new single-window tracker over `sampling_duration`.
    pub fn new(sampling_duration: Duration) -> Self {
        Self {
            sampling_duration,
            window_start: None,
            successes: 0,
            failures: 0,
        }
    }

    fn roll_if_expired(&mut self, now: Instant) {
        match self.window_start {
            Some(start) if now.duration_since(start) < self.sampling_duration => {}
            _ => {
                self.window_start = Some(now);
                self.successes = 0;
                self.failures = 0;
            }
        }
    }
}

impl HealthMetrics for SingleWindowHealthMetrics {
    fn record_success(&mut self, now: Instant) {
        self.roll_if_expired(now);
        self.successes += 1;
    }

    fn record_failure(&mut self, now: Instant) {
        self.roll_if_expired(now);
        self.failures += 1;
    }

    fn health_info(&mut self, now: Instant) -> HealthInfo {
        self.roll_if_expired(now);
        HealthInfo::from_counts(self.successes + self.failures, self.failures)
    }

    fn reset(&mut self) {
        self.window_start = None;
        self.successes = 0;
        self.failures = 0;
    }
}

struct SubWindow {
    start: Instant,
    successes: usize,
    failures: usize,
}

/// Divides `sampling_duration` into ten equal sub-windows, rotating in a
/// new one as time advances and discarding any whose age exceeds
/// `sampling_duration`.
pub struct RollingHealthMetrics {
    sampling_duration: Duration,
    sub_window_duration: Duration,
    windows: VecDeque<SubWindow>,
}

impl RollingHealthMetrics {
    /// Creates a new rolling-window tracker over `sampling_duration`.
    pub fn new(sampling_duration: Duration) -> Self {
        Self {
            sampling_duration,
            sub_window_duration: sampling_duration / WINDOW_COUNT,
            windows: VecDeque::new(),
        }
    }

    fn advance(&mut self, now: Instant) {
        let needs_new_window = match self.windows.back() {
            Some(current) => now.duration_since(current.start) >= self.sub_window_duration,
            None => true,
        };
        if needs_new_window {
            self.windows.push_back(SubWindow {
                start: now,
                successes: 0,
                failures: 0,
            });
        }

        while let Some(oldest) = self.windows.front() {
            if now.duration_since(oldest.start) > self.sampling_duration {
                self.windows.pop_front();
            } else {
                break;
            }
        }
    }
}

impl HealthMetrics for RollingHealthMetrics {
    fn record_success(&mut self, now: Instant) {
        self.advance(now);
        if let Some(current) = self.windows.back_mut() {
            current.successes += 1;
        }
    }

    fn record_failure(&mut self, now: Instant) {
        self.advance(now);
        if let Some(current) = self.windows.back_mut() {
            current.failures += 1;
        }
    }

    fn health_info(&mut self, now: Instant) -> HealthInfo {
        self.advance(now);
        let (mut total, mut failures) = (0usize, 0usize);
        for window in &self.windows {
            if now.duration_since(window.start) <= self.sampling_duration {
                total += window.successes + window.failures;
                failures += window.failures;
            }
        }
        HealthInfo::from_counts(total, failures)
    }

    fn reset(&mut self) {
        self.windows.clear();
    }
}
