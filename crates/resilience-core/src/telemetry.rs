//! Telemetry source: the narrow, fan-out-only sink strategies report
//! events and outcomes through.

use std::sync::Arc;
use std::time::Duration;

use crate::outcome::Outcome;

/// Tags an enricher may add to an event before it reaches telemetry
/// backends (and, for the top-level pipeline metric, before it is
/// recorded).
#[derive(Debug, Clone, Default)]
pub struct EnrichmentContext {
    tags: Vec<(String, String)>,
}

impl EnrichmentContext {
    /// Creates an empty enrichment context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag, overwriting any existing value with the same key.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.tags.retain(|(existing, _)| existing != &key);
        self.tags.push((key, value.into()));
    }

    /// Returns all tags added so far.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }
}

/// A user-supplied function that augments telemetry tags before an event
/// is recorded. Invoked synchronously, before metrics are emitted, as
/// required by the concurrency model.
pub trait Enricher: Send + Sync {
    /// Adds tags to `ctx` based on `event_name` and the arguments.
    fn enrich(&self, event_name: &str, ctx: &mut EnrichmentContext);
}

/// Everything identifying who emitted a telemetry event.
#[derive(Debug, Clone)]
pub struct TelemetryIdentity {
    /// The pipeline/builder this strategy belongs to.
    pub builder_name: String,
    /// Arbitrary properties attached at the builder level.
    pub builder_properties: Vec<(String, String)>,
    /// The strategy instance's own name.
    pub strategy_name: String,
    /// The strategy's type, e.g. `"timeout"` or `"circuit_breaker"`.
    pub strategy_type: &'static str,
}

/// Arguments accompanying a reported event.
#[derive(Debug, Clone, Default)]
pub struct EventArgs {
    /// Free-form key/value pairs describing the event.
    pub fields: Vec<(String, String)>,
}

impl EventArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// A single reported telemetry occurrence, ready to be handed to
/// backends.
#[derive(Debug, Clone)]
pub struct TelemetryReport<T, E> {
    /// The event's name, e.g. `"OnTimeout"`.
    pub event_name: &'static str,
    /// Who emitted it.
    pub identity: TelemetryIdentity,
    /// Event-specific arguments.
    pub args: EventArgs,
    /// The callback outcome, if this report accompanies one.
    pub outcome: Option<Outcome<T, E>>,
}

/// Narrow sink strategies call to report events and outcomes. Fan-out
/// only: it never blocks the calling strategy beyond synchronous dispatch
/// to subscribers.
pub struct TelemetrySource {
    identity: TelemetryIdentity,
    enrichers: Vec<Arc<dyn Enricher>>,
    #[cfg(feature = "metrics")]
    metrics_init: std::sync::Once,
}

impl TelemetrySource {
    /// Creates a telemetry source bound to a builder/strategy identity.
    pub fn new(identity: TelemetryIdentity) -> Self {
        Self {
            identity,
            enrichers: Vec::new(),
            #[cfg(feature = "metrics")]
            metrics_init: std::sync::Once::new(),
        }
    }

    /// Registers an enricher; enrichers run in registration order.
    pub fn add_enricher(&mut self, enricher: impl Enricher + 'static) {
        self.enrichers.push(Arc::new(enricher));
    }

    /// Reports an event with no accompanying outcome.
    pub fn report<T, E>(&self, event_name: &'static str, args: EventArgs) -> EnrichmentContext {
        self.report_with_outcome::<T, E>(event_name, args, None)
    }

    /// Reports an event alongside the outcome that triggered it.
    pub fn report_with_outcome<T, E>(
        &self,
        event_name: &'static str,
        args: EventArgs,
        outcome: Option<Outcome<T, E>>,
    ) -> EnrichmentContext {
        let mut enrichment = EnrichmentContext::new();
        for tag in &args.fields {
            enrichment.add_tag(tag.0.clone(), tag.1.clone());
        }
        for enricher in &self.enrichers {
            enricher.enrich(event_name, &mut enrichment);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            builder = %self.identity.builder_name,
            strategy = %self.identity.strategy_name,
            strategy_type = self.identity.strategy_type,
            event = event_name,
            "resilience event reported"
        );

        let _ = &outcome;
        enrichment
    }

    /// Records the per-pipeline-execution `strategy-execution-duration`
    /// metric with the tags the spec requires, plus any enricher tags.
    pub fn record_execution_duration(
        &self,
        strategy_key: &str,
        result_type: &str,
        exception_name: Option<&str>,
        is_healthy: bool,
        duration: Duration,
        enrichment: &EnrichmentContext,
    ) {
        #[cfg(feature = "metrics")]
        {
            self.metrics_init.call_once(|| {
                metrics::describe_histogram!(
                    "strategy-execution-duration",
                    "Duration of a top-level pipeline execution"
                );
            });

            let mut labels = vec![
                ("builder-name".to_string(), self.identity.builder_name.clone()),
                ("strategy-key".to_string(), strategy_key.to_string()),
                ("result-type".to_string(), result_type.to_string()),
                (
                    "exception-name".to_string(),
                    exception_name.unwrap_or("").to_string(),
                ),
                (
                    "execution-health".to_string(),
                    if is_healthy { "Healthy" } else { "Unhealthy" }.to_string(),
                ),
            ];
            labels.extend(enrichment.tags().iter().cloned());

            let recorder = metrics::histogram!("strategy-execution-duration", labels);
            recorder.record(duration.as_secs_f64());
        }

        #[cfg(not(feature = "metrics"))]
        {
            let _ = (strategy_key, result_type, exception_name, is_healthy, duration, enrichment);
        }
    }

    /// The identity this source reports on behalf of.
    pub fn identity(&self) -> &TelemetryIdentity {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TagAdder;
    impl Enricher for TagAdder {
        fn enrich(&self, _event_name: &str, ctx: &mut EnrichmentContext) {
            ctx.add_tag("region", "us-east-1");
        }
    }

    #[test]
    fn enrichers_run_before_tags_are_returned() {
        let mut source = TelemetrySource::new(TelemetryIdentity {
            builder_name: "pipeline".into(),
            builder_properties: vec![],
            strategy_name: "cb".into(),
            strategy_type: "circuit_breaker",
        });
        source.add_enricher(TagAdder);

        let enrichment = source.report::<(), ()>("OnCircuitOpened", EventArgs::new());
        assert!(enrichment
            .tags()
            .iter()
            .any(|(k, v)| k == "region" && v == "us-east-1"));
    }

    #[test]
    fn execution_health_tag_reflects_event_presence() {
        // `record_execution_duration` itself only has an externally
        // observable effect behind the `metrics` feature; here we assert
        // it at least doesn't panic and threads enrichment tags through.
        let source = TelemetrySource::new(TelemetryIdentity {
            builder_name: "pipeline".into(),
            builder_properties: vec![],
            strategy_name: "cb".into(),
            strategy_type: "circuit_breaker",
        });
        let enrichment = EnrichmentContext::new();
        source.record_execution_duration("cb", "String", None, true, Duration::from_millis(5), &enrichment);
    }
}
