//! Normalized flow record.

use crate::{AddressFamily, IpPrefix};
use serde::{Serialize, Serializer};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// One exported flow, decoded from an IPFIX data record.
///
/// Built once by an ingestion worker. Afterwards only the annotation stage
/// touches it: the timestamp is aligned to the aggregation grid and, when
/// routing augmentation is enabled, the AS and prefix fields are filled in.
///
/// Address fields hold raw octets in network byte order. They are empty when
/// the template did not carry the corresponding field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flow {
    /// Exporter (router) that sent the flow
    pub router: Ipv4Addr,
    /// Export time in seconds since the epoch
    pub timestamp: i64,
    pub family: AddressFamily,
    pub packets: u64,
    pub bytes: u64,
    pub protocol: u8,
    pub int_in: u32,
    pub int_out: u32,
    pub src_port: u16,
    pub dst_port: u16,
    #[serde(serialize_with = "serialize_address")]
    pub src_addr: Vec<u8>,
    #[serde(serialize_with = "serialize_address")]
    pub dst_addr: Vec<u8>,
    #[serde(serialize_with = "serialize_address")]
    pub next_hop: Vec<u8>,
    pub src_as: u32,
    pub dst_as: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_prefix: Option<IpPrefix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_prefix: Option<IpPrefix>,
}

impl Flow {
    /// Creates an empty flow for the given exporter, export time and family.
    pub fn new(router: Ipv4Addr, timestamp: i64, family: AddressFamily) -> Self {
        Self {
            router,
            timestamp,
            family,
            packets: 0,
            bytes: 0,
            protocol: 0,
            int_in: 0,
            int_out: 0,
            src_port: 0,
            dst_port: 0,
            src_addr: Vec::new(),
            dst_addr: Vec::new(),
            next_hop: Vec::new(),
            src_as: 0,
            dst_as: 0,
            src_prefix: None,
            dst_prefix: None,
        }
    }

    /// Source address, if the raw octets form a valid IPv4/IPv6 address.
    pub fn src_ip(&self) -> Option<IpAddr> {
        ip_from_octets(&self.src_addr)
    }

    /// Destination address, if the raw octets form a valid IPv4/IPv6 address.
    pub fn dst_ip(&self) -> Option<IpAddr> {
        ip_from_octets(&self.dst_addr)
    }

    /// Next-hop address, if the raw octets form a valid IPv4/IPv6 address.
    pub fn next_hop_ip(&self) -> Option<IpAddr> {
        ip_from_octets(&self.next_hop)
    }
}

fn ip_from_octets(octets: &[u8]) -> Option<IpAddr> {
    match octets.len() {
        4 => {
            let raw: [u8; 4] = octets.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(raw)))
        }
        16 => {
            let raw: [u8; 16] = octets.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(raw)))
        }
        _ => None,
    }
}

fn serialize_address<S>(octets: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match ip_from_octets(octets) {
        Some(addr) => serializer.collect_str(&addr),
        None => serializer.serialize_none(),
    }
}
