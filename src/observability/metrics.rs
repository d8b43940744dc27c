use crate::error::{AppError, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the payment service.
///
/// Recording is a no-op until a recorder is installed with [`init_metrics`].
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_idempotency_decision(&self, decision: &'static str) {
        counter!("idempotency_requests_total", "decision" => decision).increment(1);
    }

    pub fn set_recorded_responses(&self, count: usize) {
        gauge!("idempotency_recorded_responses").set(count as f64);
    }

    pub fn record_payment_created(&self, currency: &str) {
        counter!("payments_created_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_payment_updated(&self, currency: &str) {
        counter!("payments_updated_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_payment_operation_latency(&self, operation: &'static str, duration_ms: f64) {
        histogram!("payment_operation_duration_ms", "operation" => operation).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder and returns its handle.
///
/// Calling this again returns the handle installed by the first call.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    // Concurrent first calls queue here; only one of them installs.
    let _init = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e)))?;

    describe_metrics();
    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("idempotency_requests_total", Unit::Count, "Idempotency decisions by outcome");
    describe_gauge!("idempotency_recorded_responses", Unit::Count, "Number of recorded idempotent responses");

    describe_counter!("payments_created_total", Unit::Count, "Total number of payments created");
    describe_counter!("payments_updated_total", Unit::Count, "Total number of payments partially updated");
    describe_histogram!("payment_operation_duration_ms", Unit::Milliseconds, "Payment operation latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
