// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "analysis_requests_total",
            "Analyses that produced a result, by strategy."
        );
        describe_counter!(
            "analysis_failures_total",
            "Branch failures, by reason tag."
        );
        describe_counter!(
            "inference_calls_total",
            "Inference calls by model and outcome."
        );
        describe_histogram!("inference_latency_ms", "Inference call latency in milliseconds.");
        describe_gauge!("budget_units_used", "Compute units used today.");
        describe_gauge!("budget_daily_limit", "Configured daily compute unit limit.");
        describe_counter!(
            "budget_units_charged_total",
            "Compute units charged, by model."
        );
        describe_counter!(
            "telemetry_events_dropped_total",
            "Observability events dropped because the queue was full or closed."
        );
    });
}

impl Metrics {
    /// Install the global Prometheus recorder and seed the daily limit gauge.
    pub fn init(daily_limit: f64) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        gauge!("budget_daily_limit").set(daily_limit);
        Self { handle }
    }

    /// Recorder that is not installed globally; renders an empty exposition.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
