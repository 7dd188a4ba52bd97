//! Common flow telemetry types.
//!
//! This crate provides the normalized representation shared by every stage of
//! the flow collection pipeline:
//!
//! - [`Flow`]: One exported flow after template decoding
//! - [`AddressFamily`]: IPv4 / IPv6 discriminator carried by each flow
//! - [`IpPrefix`]: Routing prefix attached by the augmentation stage

mod family;
mod flow;
mod ip;

pub use family::AddressFamily;
pub use flow::Flow;
pub use ip::IpPrefix;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("unknown address family: {0}")]
    UnknownAddressFamily(u8),
}
