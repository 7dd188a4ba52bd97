//! Template to field-position resolution.
//!
//! A [`FieldLayout`] records, for each flow attribute the collector cares
//! about, which value of a decoded record holds it. Slots a template does not
//! carry stay `None` and read as zero (scalars) or empty (addresses).

use sonic_flow_types::AddressFamily;
use sonic_ipfix::fields::*;
use sonic_ipfix::{DataRecord, TemplateRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldLayout {
    pub src_addr: Option<usize>,
    pub dst_addr: Option<usize>,
    pub protocol: Option<usize>,
    pub packets: Option<usize>,
    pub bytes: Option<usize>,
    pub int_in: Option<usize>,
    pub int_out: Option<usize>,
    pub next_hop: Option<usize>,
    pub src_port: Option<usize>,
    pub dst_port: Option<usize>,
    pub src_as: Option<usize>,
    pub dst_as: Option<usize>,
    /// Set by the source address element only
    pub family: Option<AddressFamily>,
}

impl FieldLayout {
    /// Walks the template's fields once; the last occurrence of an element
    /// wins and unknown or enterprise-specific elements are skipped.
    pub fn resolve(template: &TemplateRecord) -> Self {
        let mut layout = Self::default();

        for (index, field) in template.fields.iter().enumerate() {
            if field.enterprise.is_some() {
                continue;
            }
            let slot = Some(index);
            match field.id {
                SOURCE_IPV4_ADDRESS => {
                    layout.src_addr = slot;
                    layout.family = Some(AddressFamily::V4);
                }
                SOURCE_IPV6_ADDRESS => {
                    layout.src_addr = slot;
                    layout.family = Some(AddressFamily::V6);
                }
                DESTINATION_IPV4_ADDRESS | DESTINATION_IPV6_ADDRESS => layout.dst_addr = slot,
                IP_NEXT_HOP_IPV4_ADDRESS | IP_NEXT_HOP_IPV6_ADDRESS => layout.next_hop = slot,
                PROTOCOL_IDENTIFIER => layout.protocol = slot,
                PACKET_DELTA_COUNT => layout.packets = slot,
                OCTET_DELTA_COUNT => layout.bytes = slot,
                INGRESS_INTERFACE => layout.int_in = slot,
                EGRESS_INTERFACE => layout.int_out = slot,
                SOURCE_TRANSPORT_PORT => layout.src_port = slot,
                DESTINATION_TRANSPORT_PORT => layout.dst_port = slot,
                BGP_SOURCE_AS_NUMBER => layout.src_as = slot,
                BGP_DESTINATION_AS_NUMBER => layout.dst_as = slot,
                _ => {}
            }
        }

        layout
    }
}

/// Raw value at `slot`, empty when the slot is absent or out of range.
pub fn value(record: &DataRecord, slot: Option<usize>) -> &[u8] {
    slot.and_then(|i| record.values.get(i))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Value at `slot` read as an unsigned big-endian integer.
///
/// Absent slots read as zero. Values wider than eight octets keep their
/// least significant eight.
pub fn uint(record: &DataRecord, slot: Option<usize>) -> u64 {
    let raw = value(record, slot);
    let raw = &raw[raw.len().saturating_sub(8)..];
    raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Address at `slot` restored to network byte order.
pub fn address(record: &DataRecord, slot: Option<usize>) -> Vec<u8> {
    value(record, slot).iter().rev().copied().collect()
}
