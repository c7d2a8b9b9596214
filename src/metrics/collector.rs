// src/metrics/collector.rs
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use anyhow::Result;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Text exposition of every registered metric.
    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Session metrics
    pub sessions_total: IntCounter,
    pub sessions_without_primary_total: IntCounter,
    pub dial_failures_total: IntCounterVec,

    // Forwarder metrics
    pub active_forwarders: IntGauge,
    pub lines_forwarded_total: IntCounterVec,
    pub write_failures_total: IntCounterVec,

    // Control plane
    pub reconfigurations_total: IntCounter,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let collector = Self::unregistered()?;

        registry.register(Box::new(collector.sessions_total.clone()))?;
        registry.register(Box::new(collector.sessions_without_primary_total.clone()))?;
        registry.register(Box::new(collector.dial_failures_total.clone()))?;
        registry.register(Box::new(collector.active_forwarders.clone()))?;
        registry.register(Box::new(collector.lines_forwarded_total.clone()))?;
        registry.register(Box::new(collector.write_failures_total.clone()))?;
        registry.register(Box::new(collector.reconfigurations_total.clone()))?;

        Ok(collector)
    }

    /// A collector that is not attached to any registry. Used where metrics
    /// are not exported, e.g. in tests.
    pub fn unregistered() -> Result<Self> {
        let sessions_total =
            IntCounter::new("fanout_sessions_total", "Accepted client sessions")?;

        let sessions_without_primary_total = IntCounter::new(
            "fanout_sessions_without_primary_total",
            "Sessions for which no backend could be reached",
        )?;

        let dial_failures_total = IntCounterVec::new(
            Opts::new("fanout_dial_failures_total", "Failed backend connection attempts"),
            &["backend"],
        )?;

        let active_forwarders =
            IntGauge::new("fanout_active_forwarders", "Currently running line forwarders")?;

        let lines_forwarded_total = IntCounterVec::new(
            Opts::new("fanout_lines_forwarded_total", "Lines read and relayed"),
            &["direction"],
        )?;

        let write_failures_total = IntCounterVec::new(
            Opts::new(
                "fanout_write_failures_total",
                "Lines that could not be delivered to one destination",
            ),
            &["direction"],
        )?;

        let reconfigurations_total = IntCounter::new(
            "fanout_reconfigurations_total",
            "Toggle batches applied through the admin interface",
        )?;

        Ok(Self {
            sessions_total,
            sessions_without_primary_total,
            dial_failures_total,
            active_forwarders,
            lines_forwarded_total,
            write_failures_total,
            reconfigurations_total,
        })
    }

    pub fn record_session(&self, has_primary: bool) {
        self.sessions_total.inc();
        if !has_primary {
            self.sessions_without_primary_total.inc();
        }
    }

    pub fn record_dial_failure(&self, backend: &str) {
        self.dial_failures_total.with_label_values(&[backend]).inc();
    }

    pub fn record_line(&self, direction: &str, failed_writes: u64) {
        self.lines_forwarded_total
            .with_label_values(&[direction])
            .inc();
        if failed_writes > 0 {
            self.write_failures_total
                .with_label_values(&[direction])
                .inc_by(failed_writes);
        }
    }

    pub fn forwarder_started(&self) {
        self.active_forwarders.inc();
    }

    pub fn forwarder_stopped(&self) {
        self.active_forwarders.dec();
    }

    pub fn record_reconfiguration(&self) {
        self.reconfigurations_total.inc();
    }
}
