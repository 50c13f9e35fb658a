//! Thread extended address (IEEE 802.15.4 EUI-64 as used on the mesh)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("extended address must be 16 hex digits, got {0:?}")]
    Length(String),
    #[error("extended address is not valid hex: {0:?}")]
    Hex(String),
}

/// Unique key of a mesh node.
///
/// Parsing is case-insensitive and accepts `:` or `-` separators, so
/// `AABBCCDDEEFF0011`, `aabbccddeeff0011` and `aa:bb:cc:dd:ee:ff:00:11` are
/// the same address. Displayed as 16 upper-case hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtAddress([u8; 8]);

impl ExtAddress {
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Organizationally unique identifier (first three bytes) as `AA:BB:CC`
    pub fn oui(&self) -> String {
        format!("{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }

    /// Last four hex digits, used for short display names
    pub fn short(&self) -> String {
        format!("{:02X}{:02X}", self.0[6], self.0[7])
    }

    /// Parse, returning `None` for anything that is not a valid address
    pub fn parse_lenient(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromStr for ExtAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();
        if digits.len() != 16 {
            return Err(AddressError::Length(s.to_string()));
        }
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|_| AddressError::Hex(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ExtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl Serialize for ExtAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExtAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
