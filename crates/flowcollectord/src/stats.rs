//! Process-wide collector counters.
//!
//! Plain atomics shared by every pipeline stage behind one `Arc`. Counters
//! only ever increase; readers take a [`StatsSnapshot`].

use serde::Serialize;
use sonic_flow_types::AddressFamily;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GlobalStats {
    /// Datagrams received on the socket
    pub ipfix_packets: AtomicU64,
    /// Octets received on the socket
    pub ipfix_bytes: AtomicU64,
    /// Sum of flow byte counts seen by the annotation stage
    pub flow_bytes: AtomicU64,
    /// Sum of flow packet counts seen by the annotation stage
    pub flow_packets: AtomicU64,
    pub flows4: AtomicU64,
    pub flows6: AtomicU64,

    pub non_ipv4_exporters: AtomicU64,
    pub decode_errors: AtomicU64,
    pub unknown_templates: AtomicU64,
    pub unknown_family: AtomicU64,
    pub socket_errors: AtomicU64,
}

/// Point-in-time copy of [`GlobalStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ipfix_packets: u64,
    pub ipfix_bytes: u64,
    pub flow_bytes: u64,
    pub flow_packets: u64,
    pub flows4: u64,
    pub flows6: u64,
    pub non_ipv4_exporters: u64,
    pub decode_errors: u64,
    pub unknown_templates: u64,
    pub unknown_family: u64,
    pub socket_errors: u64,
}

impl GlobalStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_datagram(&self, len: usize) {
        Self::add(&self.ipfix_packets, 1);
        Self::add(&self.ipfix_bytes, len as u64);
    }

    pub fn record_flow(&self, family: AddressFamily) {
        match family {
            AddressFamily::V4 => Self::add(&self.flows4, 1),
            AddressFamily::V6 => Self::add(&self.flows6, 1),
        }
    }

    pub fn record_flow_volume(&self, bytes: u64, packets: u64) {
        Self::add(&self.flow_bytes, bytes);
        Self::add(&self.flow_packets, packets);
    }

    pub fn record_non_ipv4_exporter(&self) {
        Self::add(&self.non_ipv4_exporters, 1);
    }

    pub fn record_decode_error(&self) {
        Self::add(&self.decode_errors, 1);
    }

    pub fn record_unknown_template(&self) {
        Self::add(&self.unknown_templates, 1);
    }

    pub fn record_unknown_family(&self) {
        Self::add(&self.unknown_family, 1);
    }

    pub fn record_socket_error(&self) {
        Self::add(&self.socket_errors, 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            ipfix_packets: get(&self.ipfix_packets),
            ipfix_bytes: get(&self.ipfix_bytes),
            flow_bytes: get(&self.flow_bytes),
            flow_packets: get(&self.flow_packets),
            flows4: get(&self.flows4),
            flows6: get(&self.flows6),
            non_ipv4_exporters: get(&self.non_ipv4_exporters),
            decode_errors: get(&self.decode_errors),
            unknown_templates: get(&self.unknown_templates),
            unknown_family: get(&self.unknown_family),
            socket_errors: get(&self.socket_errors),
        }
    }
}

impl StatsSnapshot {
    pub fn flows(&self) -> u64 {
        self.flows4 + self.flows6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(GlobalStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_record_helpers() {
        let stats = GlobalStats::new();
        stats.record_datagram(120);
        stats.record_datagram(80);
        stats.record_flow(AddressFamily::V4);
        stats.record_flow(AddressFamily::V6);
        stats.record_flow(AddressFamily::V6);
        stats.record_flow_volume(1500, 3);
        stats.record_unknown_template();

        let snap = stats.snapshot();
        assert_eq!(snap.ipfix_packets, 2);
        assert_eq!(snap.ipfix_bytes, 200);
        assert_eq!(snap.flows4, 1);
        assert_eq!(snap.flows6, 2);
        assert_eq!(snap.flows(), 3);
        assert_eq!(snap.flow_bytes, 1500);
        assert_eq!(snap.flow_packets, 3);
        assert_eq!(snap.unknown_templates, 1);
        assert_eq!(snap.decode_errors, 0);
    }

    #[test]
    fn test_concurrent_increments_conserved() {
        let stats = GlobalStats::new();
        std::thread::scope(|s| {
            for t in 0..8u64 {
                let stats = &stats;
                s.spawn(move || {
                    for i in 0..1000u64 {
                        stats.record_flow_volume(t + i, 1);
                    }
                });
            }
        });

        let expected_bytes: u64 = (0..8u64).map(|t| (0..1000u64).map(|i| t + i).sum::<u64>()).sum();
        let snap = stats.snapshot();
        assert_eq!(snap.flow_bytes, expected_bytes);
        assert_eq!(snap.flow_packets, 8000);
    }
}
