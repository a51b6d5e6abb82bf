//! Prometheus metrics exposition
//!
//! The library crates record:
//!
//! - `api_call_attempts_total` (counter): label `outcome`
//! - `api_call_retries_total` (counter): label `reason`
//! - `api_call_duration_seconds` (histogram)
//! - `auth_refresh_total` (counter): label `outcome`
//! - `auth_interactive_logins_total` (counter): label `outcome`
//! - `auth_logged_in` (gauge)
//!
//! The service itself adds `auth_callbacks_total` (counter): label `outcome`.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Histogram buckets for whole logical calls, retry waits included.
const CALL_DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        metrics_exporter_prometheus::Matcher::Full("api_call_duration_seconds".to_string()),
        CALL_DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `api_call_duration_seconds` gets explicit buckets so it renders as a
/// Prometheus histogram rather than a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record the outcome of a login callback.
pub fn record_callback(outcome: &'static str) {
    metrics::counter!("auth_callbacks_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_callback_does_not_panic_without_recorder() {
        record_callback("success");
    }

    #[test]
    fn record_callback_increments_counter_with_label() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_callback("success");
        record_callback("state_mismatch");
        record_callback("success");

        let output = handle.render();
        assert!(
            output.contains("auth_callbacks_total{outcome=\"success\"} 2"),
            "got: {output}"
        );
        assert!(
            output.contains("auth_callbacks_total{outcome=\"state_mismatch\"} 1"),
            "got: {output}"
        );
    }

    #[test]
    fn call_duration_renders_as_histogram() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        metrics::histogram!("api_call_duration_seconds").record(0.3);

        let output = handle.render();
        assert!(
            output.contains("api_call_duration_seconds_bucket"),
            "histogram must render _bucket lines, got: {output}"
        );
    }
}
