//! Address family of a flow.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address family of the addresses carried in a flow.
///
/// Serialized as the numeric family (`4` or `6`), which is what downstream
/// consumers key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Returns the numeric family (4 or 6).
    pub const fn as_u8(self) -> u8 {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 6,
        }
    }

    /// Family of a socket-level address.
    pub const fn of(addr: &std::net::IpAddr) -> Self {
        match addr {
            std::net::IpAddr::V4(_) => AddressFamily::V4,
            std::net::IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Returns the address length in octets for this family.
    pub const fn address_len(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }
}

impl TryFrom<u8> for AddressFamily {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(AddressFamily::V4),
            6 => Ok(AddressFamily::V6),
            other => Err(ParseError::UnknownAddressFamily(other)),
        }
    }
}

impl From<AddressFamily> for u8 {
    fn from(family: AddressFamily) -> Self {
        family.as_u8()
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPv{}", self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_round_trip() {
        assert_eq!(AddressFamily::try_from(4).unwrap(), AddressFamily::V4);
        assert_eq!(AddressFamily::try_from(6).unwrap(), AddressFamily::V6);
        assert_eq!(u8::from(AddressFamily::V6), 6);
    }

    #[test]
    fn test_unknown_family_rejected() {
        assert_eq!(
            AddressFamily::try_from(0),
            Err(ParseError::UnknownAddressFamily(0))
        );
    }

    #[test]
    fn test_address_len() {
        assert_eq!(AddressFamily::V4.address_len(), 4);
        assert_eq!(AddressFamily::V6.address_len(), 16);
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&AddressFamily::V4).unwrap();
        assert_eq!(json, "4");
        let parsed: AddressFamily = serde_json::from_str("6").unwrap();
        assert_eq!(parsed, AddressFamily::V6);
        assert!(serde_json::from_str::<AddressFamily>("5").is_err());
    }
}
