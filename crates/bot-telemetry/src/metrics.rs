//! Prometheus metrics for the poll bot.
//!
//! All metrics follow the naming convention: `poll_bot_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Inbound chat events by kind (paired/text)
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("poll_bot_messages_received_total", "Inbound chat events"),
        &["event"]
    ).expect("metric creation failed");

    /// Messages dropped without a reply (oversized)
    pub static ref MESSAGES_IGNORED: Counter = Counter::new(
        "poll_bot_messages_ignored_total",
        "Inbound messages dropped without a reply"
    ).expect("metric creation failed");

    /// Replies sent, by reply kind
    pub static ref REPLIES_SENT: CounterVec = CounterVec::new(
        Opts::new("poll_bot_replies_sent_total", "Replies sent to devices"),
        &["kind"]
    ).expect("metric creation failed");

    /// Balance tallies rendered before the device's vote was visible
    pub static ref STALE_TALLIES: Counter = Counter::new(
        "poll_bot_stale_tallies_total",
        "Results sent while the latest vote was not yet visible"
    ).expect("metric creation failed");

    /// Handler failures by error kind
    pub static ref HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("poll_bot_handler_failures_total", "Failed message handlers"),
        &["error_type"]
    ).expect("metric creation failed");

    /// Time spent handling one inbound event
    pub static ref HANDLING_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "poll_bot_handling_duration_seconds",
            "Time spent handling one inbound event"
        ).buckets(exponential_buckets(0.001, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(MESSAGES_IGNORED.clone()),
        Box::new(REPLIES_SENT.clone()),
        Box::new(STALE_TALLIES.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(HANDLING_DURATION.clone()),
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

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_counters_show_up_in_encoding() {
        register_metrics().unwrap();
        REPLIES_SENT.with_label_values(&["poll_list"]).inc();
        STALE_TALLIES.inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("poll_bot_replies_sent_total"));
        assert!(text.contains("poll_bot_stale_tallies_total"));
    }

    #[test]
    fn test_timer_observes_on_drop() {
        let before = HANDLING_DURATION.get_sample_count();
        {
            let _timer = HistogramTimer::new(&HANDLING_DURATION);
        }
        assert_eq!(HANDLING_DURATION.get_sample_count(), before + 1);
    }
}
