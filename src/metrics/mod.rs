//! Metrics collection for observability

use prometheus::{
    CounterVec, Histogram, HistogramOpts, Opts, Registry, register_counter_vec_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;
use std::time::Duration;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Estimation metrics
    pub estimations: CounterVec,
    pub estimation_duration: Histogram,
    pub similarity_matches: Histogram,

    // Provider metrics
    pub provider_request_duration: Histogram,
    pub provider_tokens: CounterVec,

    // Batch metrics
    pub batch_tasks: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let estimations = register_counter_vec_with_registry!(
            Opts::new("estimations_total", "Total task estimations"),
            &["status"],
            registry
        )?;

        let estimation_duration = register_histogram_with_registry!(
            HistogramOpts::new(
                "estimation_duration_seconds",
                "End-to-end duration of a single task estimation in seconds"
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            registry
        )?;

        let similarity_matches = register_histogram_with_registry!(
            HistogramOpts::new(
                "similarity_matches",
                "Genuine similarity matches found per estimation"
            )
            .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 10.0, 15.0, 25.0, 50.0]),
            registry
        )?;

        let provider_request_duration = register_histogram_with_registry!(
            HistogramOpts::new(
                "provider_request_duration_seconds",
                "Estimation provider request duration in seconds"
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
            registry
        )?;

        let provider_tokens = register_counter_vec_with_registry!(
            Opts::new("provider_tokens_total", "Tokens consumed by the estimation provider"),
            &["kind"],
            registry
        )?;

        let batch_tasks = register_counter_vec_with_registry!(
            Opts::new("batch_tasks_total", "Tasks processed by batch runs"),
            &["status"],
            registry
        )?;

        Ok(Self {
            registry,
            estimations,
            estimation_duration,
            similarity_matches,
            provider_request_duration,
            provider_tokens,
            batch_tasks,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the outcome of one estimation
    pub fn record_estimation(&self, success: bool, elapsed: Duration) {
        let status = if success { "success" } else { "error" };
        self.estimations.with_label_values(&[status]).inc();
        self.estimation_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_similarity_matches(&self, matches: usize) {
        self.similarity_matches.observe(matches as f64);
    }

    pub fn record_provider_request(&self, elapsed: Duration) {
        self.provider_request_duration.observe(elapsed.as_secs_f64());
    }

    /// Record token usage reported by the provider
    pub fn record_provider_tokens(&self, prompt: u64, completion: u64) {
        self.provider_tokens.with_label_values(&["prompt"]).inc_by(prompt as f64);
        self.provider_tokens.with_label_values(&["completion"]).inc_by(completion as f64);
    }

    pub fn record_batch_task(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.batch_tasks.with_label_values(&[status]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn gather_text(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}
