//! Metrics and observability utilities
//!
//! Prometheus metrics for the grading endpoint and the cloud calls it makes.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Tutorgrade metrics
pub const METRICS_PREFIX: &str = "tutorgrade";

/// Buckets for end-to-end grading latency (model calls dominate)
pub const GRADING_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    30.00,  // 30s
    60.00,  // 1m
    120.0,  // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Grading metrics
    describe_counter!(
        format!("{}_gradings_total", METRICS_PREFIX),
        Unit::Count,
        "Total grading requests by submission type and outcome"
    );

    describe_histogram!(
        format!("{}_grading_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end grading pipeline latency in seconds"
    );

    // OCR metrics
    describe_counter!(
        format!("{}_ocr_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total OCR calls"
    );

    describe_histogram!(
        format!("{}_ocr_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "OCR call latency in seconds"
    );

    // Model metrics
    describe_counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative model calls"
    );

    describe_histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Generative model latency in seconds"
    );

    // Storage metrics
    describe_counter!(
        format!("{}_storage_fetches_total", METRICS_PREFIX),
        Unit::Count,
        "Total blob fetches for templates and answer keys"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a finished grading run
pub fn record_grading(duration_secs: f64, submission_type: &str, outcome: &str) {
    counter!(
        format!("{}_gradings_total", METRICS_PREFIX),
        "submission_type" => submission_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_grading_duration_seconds", METRICS_PREFIX),
        "submission_type" => submission_type.to_string()
    )
    .record(duration_secs);
}

/// Helper to record OCR metrics
pub fn record_ocr(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_ocr_requests_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(format!("{}_ocr_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record model metrics
pub fn record_model_call(duration_secs: f64, model: &str, status: &str) {
    counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Helper to record storage metrics
pub fn record_storage_fetch(kind: &str, found: bool) {
    counter!(
        format!("{}_storage_fetches_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "found" => found.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grading_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in GRADING_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/api/grade");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }

    #[test]
    fn test_helpers_without_recorder() {
        record_grading(1.5, "段落寫作評閱", "success");
        record_ocr(0.2, false);
        record_model_call(3.0, "gemini-2.0-flash", "ok");
        record_storage_fetch("template", true);
    }
}
