//! Prometheus metrics for transaction processors.
//!
//! All metrics follow the naming convention: `tp_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PROCESSOR METRICS
    // =========================================================================

    /// Execution requests answered, by family and response status
    pub static ref PROCESS_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("tp_processor_requests_total", "Execution requests answered"),
        &["family", "status"]
    ).expect("metric creation failed");

    /// Handler execution time
    pub static ref PROCESS_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "tp_processor_apply_duration_seconds",
            "Time spent inside handler apply"
        ).buckets(exponential_buckets(0.0005, 2.0, 15).expect("bucket layout")),
        &["family"]
    ).expect("metric creation failed");

    /// Handlers registered with the validator
    pub static ref REGISTERED_HANDLERS: Gauge = Gauge::new(
        "tp_processor_registered_handlers",
        "Family/version pairs registered with the validator"
    ).expect("metric creation failed");

    // =========================================================================
    // DISPATCHER METRICS
    // =========================================================================

    /// Sub-requests by message type and outcome (ok/timeout/closed/error)
    pub static ref SUB_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("tp_dispatch_sub_requests_total", "Correlated requests issued to the validator"),
        &["message_type", "outcome"]
    ).expect("metric creation failed");

    /// Sub-requests awaiting a reply
    pub static ref PENDING_SUB_REQUESTS: Gauge = Gauge::new(
        "tp_dispatch_pending_sub_requests",
        "Correlated requests currently awaiting a reply"
    ).expect("metric creation failed");

    /// Inbound messages not matching any pending request
    pub static ref UNSOLICITED_MESSAGES: CounterVec = CounterVec::new(
        Opts::new("tp_dispatch_unsolicited_messages_total", "Inbound messages from the validator"),
        &["message_type"]
    ).expect("metric creation failed");

    /// Inbound frames that failed to decode
    pub static ref DROPPED_FRAMES: Counter = Counter::new(
        "tp_dispatch_dropped_frames_total",
        "Inbound frames dropped as malformed"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Processor
        Box::new(PROCESS_REQUESTS.clone()),
        Box::new(PROCESS_DURATION.clone()),
        Box::new(REGISTERED_HANDLERS.clone()),
        // Dispatcher
        Box::new(SUB_REQUESTS.clone()),
        Box::new(PENDING_SUB_REQUESTS.clone()),
        Box::new(UNSOLICITED_MESSAGES.clone()),
        Box::new(DROPPED_FRAMES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
