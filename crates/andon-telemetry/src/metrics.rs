//! Prometheus metrics for the Andon relay.
//!
//! Naming convention: `andon_<area>_<metric>_<unit>`
//!
//! The relay keeps its own atomic counters; the runtime copies them into
//! these gauges through [`record_relay_sample`] before each scrape, so the
//! relay core never touches the global registry.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Gauge, HistogramOpts, HistogramVec, IntCounterVec, IntGauge,
    IntGaugeVec, Encoder, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONNECTION METRICS
    // =========================================================================

    /// Live connections
    pub static ref CONNECTIONS: IntGauge = IntGauge::new(
        "andon_relay_connections",
        "Number of currently registered client connections"
    ).expect("metric creation failed");

    /// Mean connection health score
    pub static ref AVERAGE_HEALTH: Gauge = Gauge::new(
        "andon_relay_average_health_score",
        "Mean health score across live connections (1.0 when idle)"
    ).expect("metric creation failed");

    /// Connections evicted by the health sweep
    pub static ref EVICTIONS: IntGauge = IntGauge::new(
        "andon_relay_evictions",
        "Connections evicted as unhealthy or stale since start"
    ).expect("metric creation failed");

    // =========================================================================
    // SUBSCRIPTION METRICS
    // =========================================================================

    /// Total (connection, topic) pairs
    pub static ref SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "andon_relay_subscriptions",
        "Number of active (connection, topic) subscription pairs"
    ).expect("metric creation failed");

    /// Subscriptions by topic kind
    pub static ref TOPIC_SUBSCRIPTIONS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("andon_relay_topic_subscriptions", "Subscriptions by topic kind"),
        &["kind"]  // kind: line/equipment/downtime/job/escalation/escalation_priority/recipient
    ).expect("metric creation failed");

    // =========================================================================
    // DELIVERY METRICS
    // =========================================================================

    /// Messages delivered
    pub static ref MESSAGES_SENT: IntGauge = IntGauge::new(
        "andon_relay_messages_sent",
        "Messages delivered to transports since start"
    ).expect("metric creation failed");

    /// Bytes delivered
    pub static ref BYTES_SENT: IntGauge = IntGauge::new(
        "andon_relay_sent_bytes",
        "Encoded bytes delivered to transports since start"
    ).expect("metric creation failed");

    /// Failed frames
    pub static ref DELIVERY_ERRORS: IntGauge = IntGauge::new(
        "andon_relay_delivery_errors",
        "Frames that failed or timed out on send since start"
    ).expect("metric creation failed");

    /// Rejected enqueues
    pub static ref RATE_LIMITED: IntGauge = IntGauge::new(
        "andon_relay_rate_limited",
        "Messages rejected by the per-connection rate limit since start"
    ).expect("metric creation failed");

    /// Batch flushes that reached a transport
    pub static ref FLUSHES: IntGauge = IntGauge::new(
        "andon_relay_flushes",
        "Batch flushes delivered since start"
    ).expect("metric creation failed");

    // =========================================================================
    // ANDON METRICS
    // =========================================================================

    /// Alarms not yet resolved
    pub static ref OPEN_ALARMS: IntGauge = IntGauge::new(
        "andon_alarms_active",
        "Alarms in OPEN, ACKNOWLEDGED or ESCALATED status"
    ).expect("metric creation failed");

    /// Escalation notifications published
    pub static ref ESCALATIONS: IntGauge = IntGauge::new(
        "andon_escalations_fired",
        "Escalation notifications published since start"
    ).expect("metric creation failed");

    /// Armed escalation timers
    pub static ref PENDING_TIMERS: IntGauge = IntGauge::new(
        "andon_escalation_timers_pending",
        "Escalation timers currently armed"
    ).expect("metric creation failed");

    // =========================================================================
    // HTTP METRICS
    // =========================================================================

    /// HTTP requests by route and status
    pub static ref HTTP_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("andon_http_requests_total", "HTTP requests by route and status"),
        &["route", "status"]
    ).expect("metric creation failed");

    /// HTTP request duration
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "andon_http_request_duration_seconds",
            "Time spent handling HTTP requests"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).expect("bucket layout")),
        &["route"]
    ).expect("metric creation failed");
}

/// Point-in-time relay values copied into the gauges.
#[derive(Debug, Clone, Default)]
pub struct RelaySample {
    pub connections: usize,
    pub subscriptions: usize,
    pub topic_kinds: Vec<(String, usize)>,
    pub average_health: f64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub delivery_errors: u64,
    pub rate_limited: u64,
    pub flushes: u64,
    pub evictions: u64,
    pub escalations: u64,
    pub active_alarms: usize,
    pub pending_timers: usize,
}

/// Handle returned by [`register_metrics`].
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Registering twice is not an error; the second call finds the collectors
/// already present.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Connections
        Box::new(CONNECTIONS.clone()),
        Box::new(AVERAGE_HEALTH.clone()),
        Box::new(EVICTIONS.clone()),
        // Subscriptions
        Box::new(SUBSCRIPTIONS.clone()),
        Box::new(TOPIC_SUBSCRIPTIONS.clone()),
        // Delivery
        Box::new(MESSAGES_SENT.clone()),
        Box::new(BYTES_SENT.clone()),
        Box::new(DELIVERY_ERRORS.clone()),
        Box::new(RATE_LIMITED.clone()),
        Box::new(FLUSHES.clone()),
        // Andon
        Box::new(OPEN_ALARMS.clone()),
        Box::new(ESCALATIONS.clone()),
        Box::new(PENDING_TIMERS.clone()),
        // HTTP
        Box::new(HTTP_REQUESTS.clone()),
        Box::new(HTTP_REQUEST_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Copy a relay sample into the gauges.
pub fn record_relay_sample(sample: &RelaySample) {
    CONNECTIONS.set(saturating_i64(sample.connections as u64));
    SUBSCRIPTIONS.set(saturating_i64(sample.subscriptions as u64));
    for (kind, count) in &sample.topic_kinds {
        TOPIC_SUBSCRIPTIONS
            .with_label_values(&[kind.as_str()])
            .set(saturating_i64(*count as u64));
    }
    AVERAGE_HEALTH.set(sample.average_health);
    MESSAGES_SENT.set(saturating_i64(sample.messages_sent));
    BYTES_SENT.set(saturating_i64(sample.bytes_sent));
    DELIVERY_ERRORS.set(saturating_i64(sample.delivery_errors));
    RATE_LIMITED.set(saturating_i64(sample.rate_limited));
    FLUSHES.set(saturating_i64(sample.flushes));
    EVICTIONS.set(saturating_i64(sample.evictions));
    ESCALATIONS.set(saturating_i64(sample.escalations));
    OPEN_ALARMS.set(saturating_i64(sample.active_alarms as u64));
    PENDING_TIMERS.set(saturating_i64(sample.pending_timers as u64));
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
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

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &prometheus::Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
