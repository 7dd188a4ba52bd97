//! Routing prefix attached to flows by the augmentation stage.

use crate::{AddressFamily, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A route prefix as reported by the routing daemon, e.g. `198.51.100.0/24`.
///
/// Flows carry it in textual CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    network: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Builds a prefix, rejecting lengths wider than the address.
    pub fn new(network: IpAddr, len: u8) -> Result<Self, ParseError> {
        let family = AddressFamily::of(&network);
        let bits = family.address_len() * 8;
        if usize::from(len) > bits {
            return Err(ParseError::InvalidIpPrefix(format!("{}/{}", network, len)));
        }
        Ok(IpPrefix { network, len })
    }

    pub const fn network(&self) -> IpAddr {
        self.network
    }

    /// Mask length in bits.
    pub const fn mask_len(&self) -> u8 {
        self.len
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.network)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((net, len)) = s.split_once('/') else {
            return Err(ParseError::InvalidIpPrefix(s.to_string()));
        };
        let network = net
            .parse::<IpAddr>()
            .map_err(|_| ParseError::InvalidIpAddress(net.to_string()))?;
        let len = len
            .parse::<u8>()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        Self::new(network, len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> Self {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_route_prefixes() {
        let v4: IpPrefix = "198.51.100.0/24".parse().unwrap();
        assert_eq!(v4.family(), AddressFamily::V4);
        assert_eq!(v4.mask_len(), 24);
        assert_eq!(v4.network(), "198.51.100.0".parse::<IpAddr>().unwrap());

        let v6: IpPrefix = "2001:db8:100::/40".parse().unwrap();
        assert_eq!(v6.family(), AddressFamily::V6);
        assert_eq!(v6.to_string(), "2001:db8:100::/40");
    }

    #[test]
    fn test_length_bounds() {
        assert!("0.0.0.0/0".parse::<IpPrefix>().is_ok());
        assert!("203.0.113.9/32".parse::<IpPrefix>().is_ok());
        assert!("203.0.113.0/33".parse::<IpPrefix>().is_err());
        assert!("::/128".parse::<IpPrefix>().is_ok());
        assert!("::/129".parse::<IpPrefix>().is_err());
    }

    #[test]
    fn test_malformed_text() {
        assert!("203.0.113.0".parse::<IpPrefix>().is_err());
        assert!("203.0.113.0/x".parse::<IpPrefix>().is_err());
        assert_eq!(
            "unreachable/8".parse::<IpPrefix>(),
            Err(ParseError::InvalidIpAddress("unreachable".to_string()))
        );
    }

    #[test]
    fn test_json_form() {
        let prefix: IpPrefix = "10.20.0.0/16".parse().unwrap();
        assert_eq!(serde_json::to_string(&prefix).unwrap(), "\"10.20.0.0/16\"");
        let back: IpPrefix = serde_json::from_str("\"10.20.0.0/16\"").unwrap();
        assert_eq!(back, prefix);
        assert!(serde_json::from_str::<IpPrefix>("\"10.20.0.0/40\"").is_err());
    }
}
