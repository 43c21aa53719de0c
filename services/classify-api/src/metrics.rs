//! Prometheus metrics exposition
//!
//! Registers and exposes:
//!
//! - `classify_requests_total` (counter): labels `endpoint`, `status`
//! - `classify_request_duration_seconds` (histogram): label `endpoint`
//! - `classify_pipeline_failures_total` (counter): label `stage`

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Process-level counters surfaced by the liveness probe.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `classify_request_duration_seconds` with explicit buckets so
/// it renders as a histogram (with `_bucket` lines for
/// `histogram_quantile()` queries) rather than the default summary. The
/// range covers sub-10ms credential checks up to the 60s worst case of a
/// slow fetch plus slow inference.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "classify_request_duration_seconds".to_string(),
            ),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed request with endpoint and body-level status labels.
pub fn record_request(endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("classify_requests_total", "endpoint" => endpoint.to_string(), "status" => status_str)
        .increment(1);
    metrics::histogram!("classify_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration_secs);
}

/// Record a pipeline failure with the stage that aborted the request.
pub fn record_pipeline_failure(stage: &str) {
    metrics::counter!("classify_pipeline_failures_total", "stage" => stage.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // When no recorder is installed, metrics calls are no-ops.
        record_request("classify", 200, 0.05);
        record_pipeline_failure("fetch");
    }

    /// Create an isolated recorder/handle pair for unit tests. Uses
    /// build_recorder() instead of install_recorder() because only one
    /// global recorder can exist per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(
                    "classify_request_duration_seconds".to_string(),
                ),
                &[
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ],
            )
            .expect("failed to set histogram buckets")
            .build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("classify", 200, 0.042);
        record_request("refill", 302, 0.002);

        let output = handle.render();
        assert!(
            output.contains("classify_requests_total"),
            "rendered output must contain the request counter"
        );
        assert!(output.contains("endpoint=\"classify\""));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("endpoint=\"refill\""));
        assert!(output.contains("status=\"302\""));
        assert!(
            output.contains("classify_request_duration_seconds_bucket"),
            "histogram must render _bucket lines for histogram_quantile() queries"
        );
    }

    #[test]
    fn record_pipeline_failure_carries_stage_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_pipeline_failure("fetch");
        record_pipeline_failure("inference");

        let output = handle.render();
        assert!(output.contains("classify_pipeline_failures_total"));
        assert!(output.contains("stage=\"fetch\""));
        assert!(output.contains("stage=\"inference\""));
    }

    #[test]
    fn histogram_buckets_cover_timeout_range() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("classify", 200, 0.003);

        let output = handle.render();
        assert!(output.contains("le=\"0.005\""), "5ms bucket must exist");
        assert!(
            output.contains("le=\"60\""),
            "60s bucket must exist (fetch + inference worst case)"
        );
        assert!(output.contains("le=\"+Inf\""));
    }

    #[test]
    fn service_metrics_counters_start_at_zero() {
        let metrics = ServiceMetrics::new();
        assert_eq!(
            metrics
                .requests_total
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );
        assert_eq!(
            metrics
                .errors_total
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );
    }
}
