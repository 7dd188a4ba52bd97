//! Prometheus view of the collector counters
//!
//! The pipeline only touches [`GlobalStats`] atomics; this collector advances
//! its counters to a fresh snapshot whenever it is refreshed (on scrape).

use crate::stats::{GlobalStats, StatsSnapshot};
use parking_lot::Mutex;
use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct MetricsCollector {
    // Counters
    pub ipfix_packets_total: IntCounter,
    pub ipfix_bytes_total: IntCounter,
    pub flow_bytes_total: IntCounter,
    pub flow_packets_total: IntCounter,
    pub flows_v4_total: IntCounter,
    pub flows_v6_total: IntCounter,
    pub non_ipv4_exporters_total: IntCounter,
    pub decode_errors_total: IntCounter,
    pub unknown_templates_total: IntCounter,
    pub unknown_family_total: IntCounter,
    pub socket_errors_total: IntCounter,

    // Gauges
    pub templates_cached: IntGauge,

    // Registry for export
    pub registry: Arc<Registry>,

    // Serializes read-then-advance of the counters across concurrent scrapes
    refresh_lock: Arc<Mutex<()>>,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter =
                IntCounter::with_opts(Opts::new(format!("flowcollectord_{}", name), help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let ipfix_packets_total = counter("ipfix_packets_total", "IPFIX datagrams received")?;
        let ipfix_bytes_total = counter("ipfix_bytes_total", "IPFIX octets received")?;
        let flow_bytes_total =
            counter("flow_bytes_total", "Bytes accounted in annotated flows")?;
        let flow_packets_total =
            counter("flow_packets_total", "Packets accounted in annotated flows")?;
        let flows_v4_total = counter("flows_v4_total", "IPv4 flows decoded")?;
        let flows_v6_total = counter("flows_v6_total", "IPv6 flows decoded")?;
        let non_ipv4_exporters_total = counter(
            "non_ipv4_exporters_total",
            "Datagrams dropped because the exporter is not IPv4",
        )?;
        let decode_errors_total = counter(
            "decode_errors_total",
            "IPFIX messages or data sets that failed to decode",
        )?;
        let unknown_templates_total = counter(
            "unknown_templates_total",
            "Data sets dropped because their template is unknown",
        )?;
        let unknown_family_total = counter(
            "unknown_family_total",
            "Records dropped because their address family is unknown",
        )?;
        let socket_errors_total = counter("socket_errors_total", "UDP socket read errors")?;

        let templates_cached = IntGauge::with_opts(Opts::new(
            "flowcollectord_templates_cached",
            "Templates in the template cache",
        ))?;
        registry.register(Box::new(templates_cached.clone()))?;

        Ok(Self {
            ipfix_packets_total,
            ipfix_bytes_total,
            flow_bytes_total,
            flow_packets_total,
            flows_v4_total,
            flows_v6_total,
            non_ipv4_exporters_total,
            decode_errors_total,
            unknown_templates_total,
            unknown_family_total,
            socket_errors_total,
            templates_cached,
            registry: Arc::new(registry),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Brings the counters and the template gauge up to date with `stats`.
    pub fn refresh(&self, stats: &GlobalStats, templates: usize) {
        self.refresh_from(&stats.snapshot(), templates);
    }

    /// Advances every counter to its snapshot value.
    ///
    /// Counters only move forward; a snapshot older than what was already
    /// exported leaves them where they are.
    pub fn refresh_from(&self, snap: &StatsSnapshot, templates: usize) {
        let _guard = self.refresh_lock.lock();
        let advance = |counter: &IntCounter, value: u64| {
            let delta = value.saturating_sub(counter.get());
            if delta > 0 {
                counter.inc_by(delta);
            }
        };

        advance(&self.ipfix_packets_total, snap.ipfix_packets);
        advance(&self.ipfix_bytes_total, snap.ipfix_bytes);
        advance(&self.flow_bytes_total, snap.flow_bytes);
        advance(&self.flow_packets_total, snap.flow_packets);
        advance(&self.flows_v4_total, snap.flows4);
        advance(&self.flows_v6_total, snap.flows6);
        advance(&self.non_ipv4_exporters_total, snap.non_ipv4_exporters);
        advance(&self.decode_errors_total, snap.decode_errors);
        advance(&self.unknown_templates_total, snap.unknown_templates);
        advance(&self.unknown_family_total, snap.unknown_family);
        advance(&self.socket_errors_total, snap.socket_errors);
        self.templates_cached
            .set(i64::try_from(templates).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_flow_types::AddressFamily;

    #[test]
    fn test_metrics_creation() {
        let metrics = MetricsCollector::new().unwrap();
        assert_eq!(metrics.registry.gather().len(), 12);
    }

    #[test]
    fn test_refresh_copies_snapshot() {
        let metrics = MetricsCollector::new().unwrap();
        let stats = GlobalStats::new();
        stats.record_datagram(100);
        stats.record_flow(AddressFamily::V6);
        stats.record_flow_volume(1500, 2);
        stats.record_decode_error();

        metrics.refresh(&stats, 3);
        assert_eq!(metrics.ipfix_packets_total.get(), 1);
        assert_eq!(metrics.ipfix_bytes_total.get(), 100);
        assert_eq!(metrics.flows_v6_total.get(), 1);
        assert_eq!(metrics.flows_v4_total.get(), 0);
        assert_eq!(metrics.flow_bytes_total.get(), 1500);
        assert_eq!(metrics.decode_errors_total.get(), 1);
        assert_eq!(metrics.templates_cached.get(), 3);
    }

    #[test]
    fn test_refresh_is_monotonic() {
        let metrics = MetricsCollector::new().unwrap();
        let stats = GlobalStats::new();
        stats.record_datagram(10);
        stats.record_datagram(10);
        metrics.refresh(&stats, 0);
        metrics.refresh(&stats, 0);
        assert_eq!(metrics.ipfix_packets_total.get(), 2);

        let stale = GlobalStats::new().snapshot();
        metrics.refresh_from(&stale, 0);
        assert_eq!(metrics.ipfix_packets_total.get(), 2);
        assert_eq!(metrics.ipfix_bytes_total.get(), 20);

        stats.record_datagram(5);
        metrics.refresh(&stats, 0);
        assert_eq!(metrics.ipfix_packets_total.get(), 3);
        assert_eq!(metrics.ipfix_bytes_total.get(), 25);
    }

    #[test]
    fn test_exposition_types() {
        use prometheus::{Encoder, TextEncoder};

        let metrics = MetricsCollector::new().unwrap();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("# TYPE flowcollectord_ipfix_packets_total counter"));
        assert!(text.contains("# TYPE flowcollectord_socket_errors_total counter"));
        assert!(text.contains("# TYPE flowcollectord_templates_cached gauge"));
        assert!(!text.contains("_total gauge"));
    }

    #[test]
    fn test_text_exposition() {
        use prometheus::{Encoder, TextEncoder};

        let metrics = MetricsCollector::new().unwrap();
        metrics.refresh(&GlobalStats::new(), 5);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("flowcollectord_ipfix_packets_total 0"));
        assert!(text.contains("flowcollectord_templates_cached 5"));
    }
}
