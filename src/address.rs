/// Lowercase-normalized account addresses
///
/// Every lookup and write keyed by an address goes through this type, so a
/// record stored for `0xABC...` is found again via `0xabc...`.
use crate::error::{ArcIdError, ArcIdResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 20-byte account address, held as `0x` + 40 lowercase hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address string
    pub fn parse(raw: &str) -> ArcIdResult<Self> {
        let trimmed = raw.trim();
        if !is_valid_address(trimmed) {
            return Err(ArcIdError::Validation(format!(
                "Invalid address: expected 0x followed by 40 hex characters, got {:?}",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Build from raw bytes (e.g. a recovered signer)
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 20 raw bytes
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Invariant from parse/from_bytes: 40 valid hex digits after the prefix
        if let Ok(decoded) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&decoded);
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ArcIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Well-formed address check (0x + 40 hex chars, any case)
pub fn is_valid_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let upper = Address::parse("0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD").unwrap();
        let lower = Address::parse("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("0x").is_err());
        assert!(Address::parse("0x123").is_err());
        assert!(Address::parse("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef00").is_err());
        assert!(Address::parse("0xGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGG").is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let addr = Address::parse("0x00000000000000000000000000000000000000ff").unwrap();
        let bytes = addr.to_bytes();
        assert_eq!(bytes[19], 0xff);
        assert_eq!(Address::from_bytes(bytes), addr);
    }

    #[test]
    fn test_deserialize_normalizes() {
        let addr: Address =
            serde_json::from_str("\"0xAbCdEf0123456789AbCdEf0123456789AbCdEf01\"").unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }
}
