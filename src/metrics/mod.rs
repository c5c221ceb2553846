// Private module declaration
mod observer;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};
use std::time::Duration;

pub use observer::{MessageOutcome, Operation, PipelineObserver, RequestOutcome};

// ============================================================================
// Metrics - Prometheus sink for pipeline observations
// ============================================================================
//
// `Metrics` is the production `PipelineObserver`. The orchestrator and the
// consumer report to the observer at fixed points; this type turns those
// reports into Prometheus series exposed on GET /metrics.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Orchestrator
    pub requests_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub requests_in_flight: IntGauge,
    pub cache_lookups: IntCounterVec,
    pub persistence_total: IntCounterVec,

    // Stream consumer
    pub messages_total: IntCounterVec,

    // Load generator
    pub published_total: IntCounterVec,
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("order_requests_total", "Orchestrator requests by operation and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("order_request_duration_seconds", "Orchestrator request duration")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let requests_in_flight = IntGauge::new(
            "order_requests_in_flight",
            "Orchestrator requests currently running",
        )?;
        registry.register(Box::new(requests_in_flight.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("order_cache_lookups_total", "Cache lookups by result"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let persistence_total = IntCounterVec::new(
            Opts::new("order_persistence_total", "Durable store writes by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(persistence_total.clone()))?;

        let messages_total = IntCounterVec::new(
            Opts::new("order_stream_messages_total", "Consumed stream messages by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let published_total = IntCounterVec::new(
            Opts::new("order_generator_published_total", "Synthetic orders published by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(published_total.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "order_generator_circuit_state",
            "Producer circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("order_generator_circuit_transitions_total", "Producer circuit breaker transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            requests_in_flight,
            cache_lookups,
            persistence_total,
            messages_total,
            published_total,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl PipelineObserver for Metrics {
    fn request_started(&self, _operation: Operation) {
        self.requests_in_flight.inc();
    }

    fn request_finished(&self, operation: Operation, outcome: RequestOutcome, elapsed: Duration) {
        self.requests_in_flight.dec();
        self.requests_total
            .with_label_values(&[operation.as_str(), outcome.as_str()])
            .inc();
        self.request_duration
            .with_label_values(&[operation.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    fn cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    fn persisted(&self, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.persistence_total.with_label_values(&[outcome]).inc();
    }

    fn message_processed(&self, outcome: MessageOutcome) {
        self.messages_total.with_label_values(&[outcome.as_str()]).inc();
    }

    fn order_published(&self, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.published_total.with_label_values(&[outcome]).inc();
    }

    fn circuit_transition(&self, from: &str, to: &str) {
        let state = match to {
            "open" => 1,
            "half_open" => 2,
            _ => 0,
        };
        self.circuit_breaker_state.set(state);
        self.circuit_breaker_transitions.with_label_values(&[from, to]).inc();
    }
}
