//! IANA IPFIX information element identifiers used by the collector.
//!
//! Only the elements the collector maps into a flow are listed here; any
//! other element is carried through as an opaque value.

pub const OCTET_DELTA_COUNT: u16 = 1;
pub const PACKET_DELTA_COUNT: u16 = 2;
pub const PROTOCOL_IDENTIFIER: u16 = 4;
pub const SOURCE_TRANSPORT_PORT: u16 = 7;
pub const SOURCE_IPV4_ADDRESS: u16 = 8;
pub const INGRESS_INTERFACE: u16 = 10;
pub const DESTINATION_TRANSPORT_PORT: u16 = 11;
pub const DESTINATION_IPV4_ADDRESS: u16 = 12;
pub const EGRESS_INTERFACE: u16 = 14;
pub const IP_NEXT_HOP_IPV4_ADDRESS: u16 = 15;
pub const BGP_SOURCE_AS_NUMBER: u16 = 16;
pub const BGP_DESTINATION_AS_NUMBER: u16 = 17;
pub const BGP_NEXT_HOP_IPV4_ADDRESS: u16 = 18;
pub const SOURCE_IPV6_ADDRESS: u16 = 27;
pub const DESTINATION_IPV6_ADDRESS: u16 = 28;
pub const IP_NEXT_HOP_IPV6_ADDRESS: u16 = 62;
pub const BGP_NEXT_HOP_IPV6_ADDRESS: u16 = 63;

/// Returns true for IANA elements whose value is an IP address.
///
/// The codec hands these values out with their octets reversed.
pub const fn is_address(id: u16) -> bool {
    matches!(
        id,
        SOURCE_IPV4_ADDRESS
            | DESTINATION_IPV4_ADDRESS
            | IP_NEXT_HOP_IPV4_ADDRESS
            | BGP_NEXT_HOP_IPV4_ADDRESS
            | SOURCE_IPV6_ADDRESS
            | DESTINATION_IPV6_ADDRESS
            | IP_NEXT_HOP_IPV6_ADDRESS
            | BGP_NEXT_HOP_IPV6_ADDRESS
    )
}
