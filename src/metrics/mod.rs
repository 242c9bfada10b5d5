use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-global Prometheus recorder and returns its handle
/// for the `/metrics` route (spec §1 ambient stack — self-observability,
/// not the domain telemetry the pipeline carries as payload).
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("install prometheus recorder")
}

#[derive(Clone)]
pub struct PipelineMetrics {
    pub prometheus_handle: PrometheusHandle,
}

impl PipelineMetrics {
    pub fn new(prometheus_handle: PrometheusHandle) -> Self {
        Self { prometheus_handle }
    }

    pub fn record_request(&self, method: &str, status: u16) {
        metrics::counter!("http_requests_total", "method" => method.to_string(), "status" => status.to_string())
            .increment(1);
    }

    pub fn record_request_latency(&self, duration: Duration) {
        metrics::histogram!("http_request_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn record_repository_latency(&self, op: &str, duration: Duration) {
        metrics::histogram!("repository_call_duration_seconds", "op" => op.to_string())
            .record(duration.as_secs_f64());
    }
}

/// Records every request's method/status/latency into the self-observability
/// recorder. Distinct from `logging_middleware` (spec §1): this feeds
/// `/metrics`, logging feeds `tracing`.
pub async fn metrics_middleware(
    State(metrics): State<PipelineMetrics>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    metrics.record_request(&method, response.status().as_u16());
    metrics.record_request_latency(start.elapsed());
    response
}
