//! Prometheus metrics for operational visibility.
//!
//! Only aggregate counts and timings are exposed; no push tokens, user
//! identifiers, or notification content ever become label values.

use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};

use crate::registry::RegisterOutcome;

/// All metrics for the Courier service.
#[derive(Clone)]
pub struct Metrics {
    /// The Prometheus registry containing all metrics.
    pub registry: Registry,

    // === Device Registry Metrics ===
    /// Total register calls, by outcome (created/updated/already_registered).
    pub devices_registered_total: IntCounterVec,

    /// Total token rotations.
    pub devices_rotated_total: IntCounter,

    /// Total device removals, by reason (client/pruned).
    pub devices_removed_total: IntCounterVec,

    // === Dispatch Metrics ===
    /// Total dispatch calls, by target kind (user/all/filter).
    pub dispatches_total: IntCounterVec,

    /// Total per-device deliveries that succeeded.
    pub push_delivered_total: IntCounter,

    /// Total per-device deliveries that failed, by reason.
    pub push_failed_total: IntCounterVec,

    /// Total delivery retry attempts.
    pub push_retries_total: IntCounter,

    /// Duration of individual gateway requests in seconds.
    pub push_request_duration_seconds: Histogram,

    // === Server Metrics ===
    /// Timestamp when the server started (Unix seconds).
    pub server_start_time_seconds: Gauge,

    /// Server version information.
    pub server_info: IntGaugeVec,
}

impl Metrics {
    /// Create a new metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let devices_registered_total = IntCounterVec::new(
            Opts::new(
                "courier_devices_registered_total",
                "Total register calls by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(devices_registered_total.clone()))?;

        let devices_rotated_total = IntCounter::with_opts(Opts::new(
            "courier_devices_rotated_total",
            "Total device token rotations",
        ))?;
        registry.register(Box::new(devices_rotated_total.clone()))?;

        let devices_removed_total = IntCounterVec::new(
            Opts::new(
                "courier_devices_removed_total",
                "Total device removals by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(devices_removed_total.clone()))?;

        let dispatches_total = IntCounterVec::new(
            Opts::new(
                "courier_dispatches_total",
                "Total dispatch calls by target kind",
            ),
            &["target"],
        )?;
        registry.register(Box::new(dispatches_total.clone()))?;

        let push_delivered_total = IntCounter::with_opts(Opts::new(
            "courier_push_delivered_total",
            "Total successful per-device deliveries",
        ))?;
        registry.register(Box::new(push_delivered_total.clone()))?;

        let push_failed_total = IntCounterVec::new(
            Opts::new(
                "courier_push_failed_total",
                "Total failed per-device deliveries by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(push_failed_total.clone()))?;

        let push_retries_total = IntCounter::with_opts(Opts::new(
            "courier_push_retries_total",
            "Total delivery retry attempts",
        ))?;
        registry.register(Box::new(push_retries_total.clone()))?;

        let push_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "courier_push_request_duration_seconds",
                "Duration of gateway requests in seconds",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(push_request_duration_seconds.clone()))?;

        let server_start_time_seconds = Gauge::with_opts(Opts::new(
            "courier_server_start_time_seconds",
            "Unix timestamp when the server started",
        ))?;
        registry.register(Box::new(server_start_time_seconds.clone()))?;

        let server_info = IntGaugeVec::new(
            Opts::new("courier_server_info", "Server version and build information"),
            &["version"],
        )?;
        registry.register(Box::new(server_info.clone()))?;

        Ok(Self {
            registry,
            devices_registered_total,
            devices_rotated_total,
            devices_removed_total,
            dispatches_total,
            push_delivered_total,
            push_failed_total,
            push_retries_total,
            push_request_duration_seconds,
            server_start_time_seconds,
            server_info,
        })
    }

    /// Initialize server startup metrics.
    pub fn init_server_info(&self, version: &str) {
        self.server_start_time_seconds.set(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        );
        self.server_info.with_label_values(&[version]).set(1);
    }

    /// Record a register call outcome.
    pub fn record_device_registered(&self, outcome: RegisterOutcome) {
        let label = match outcome {
            RegisterOutcome::Created => "created",
            RegisterOutcome::Updated => "updated",
            RegisterOutcome::AlreadyRegistered => "already_registered",
        };
        self.devices_registered_total
            .with_label_values(&[label])
            .inc();
    }

    /// Record a token rotation.
    pub fn record_device_rotated(&self) {
        self.devices_rotated_total.inc();
    }

    /// Record a device removal.
    ///
    /// `reason` should be "client" or "pruned".
    pub fn record_device_removed(&self, reason: &str) {
        self.devices_removed_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a dispatch call.
    ///
    /// `target` should be "user", "all" or "filter".
    pub fn record_dispatch(&self, target: &str) {
        self.dispatches_total.with_label_values(&[target]).inc();
    }

    /// Record a successful per-device delivery.
    pub fn record_push_delivered(&self) {
        self.push_delivered_total.inc();
    }

    /// Record a failed per-device delivery.
    ///
    /// `reason` should be "token_invalid" or "transient".
    pub fn record_push_failed(&self, reason: &str) {
        self.push_failed_total.with_label_values(&[reason]).inc();
    }

    /// Record the retries spent on one delivery.
    pub fn record_push_retries(&self, count: u32) {
        if count > 0 {
            self.push_retries_total.inc_by(u64::from(count));
        }
    }

    /// Observe a gateway request duration.
    pub fn observe_push_duration(&self, duration_secs: f64) {
        self.push_request_duration_seconds.observe(duration_secs);
    }

    /// Gather all metrics for export.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_registry_metrics() {
        let metrics = Metrics::new().unwrap();

        metrics.record_device_registered(RegisterOutcome::Created);
        metrics.record_device_registered(RegisterOutcome::Updated);
        metrics.record_device_registered(RegisterOutcome::AlreadyRegistered);
        metrics.record_device_rotated();
        metrics.record_device_removed("client");
        metrics.record_device_removed("pruned");

        let created = metrics
            .devices_registered_total
            .with_label_values(&["created"])
            .get();
        let pruned = metrics
            .devices_removed_total
            .with_label_values(&["pruned"])
            .get();
        assert_eq!(created, 1);
        assert_eq!(pruned, 1);
        assert_eq!(metrics.devices_rotated_total.get(), 1);
    }

    #[test]
    fn test_dispatch_metrics() {
        let metrics = Metrics::new().unwrap();

        metrics.record_dispatch("user");
        metrics.record_dispatch("all");
        metrics.record_dispatch("filter");
        metrics.record_push_delivered();
        metrics.record_push_failed("token_invalid");
        metrics.record_push_failed("transient");
        metrics.record_push_retries(0);
        metrics.record_push_retries(2);
        metrics.observe_push_duration(0.125);

        assert_eq!(metrics.push_delivered_total.get(), 1);
        assert_eq!(
            metrics
                .push_failed_total
                .with_label_values(&["transient"])
                .get(),
            1
        );
        assert_eq!(metrics.push_retries_total.get(), 2);
    }

    #[test]
    fn test_server_info() {
        let metrics = Metrics::new().unwrap();
        metrics.init_server_info("0.1.0");

        let families = metrics.gather();
        assert!(families
            .iter()
            .any(|f| f.name() == "courier_server_info"));
    }
}
