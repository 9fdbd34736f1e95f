use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// Length of an EVM account or contract address.
pub const ADDRESS_LENGTH: usize = 20;

/// A 20-byte EVM address.
///
/// Parsing accepts `0x`-prefixed hex in any case; display is always
/// lowercase so two addresses compare equal regardless of checksum casing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ADDRESS_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                what: "address",
                expected: ADDRESS_LENGTH,
                got: bytes.len(),
            })?;
        Ok(Address(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Left-pad to a 32-byte ABI word (also the indexed-topic form).
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| CryptoError::InvalidAddress(format!("missing 0x prefix: {}", s)))?;
        if digits.len() != ADDRESS_LENGTH * 2 {
            return Err(CryptoError::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                digits.len()
            )));
        }
        let bytes =
            hex::decode(digits).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
        Address::from_slice(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Decode `0x`-prefixed (or bare) hex into bytes.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, CryptoError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(digits).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}

/// Encode bytes as lowercase `0x`-prefixed hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_case() {
        let lower: Address = "0x1234567890abcdef1234567890abcdef12345678".parse().unwrap();
        let upper: Address = "0x1234567890ABCDEF1234567890ABCDEF12345678".parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(
            upper.to_string(),
            "0x1234567890abcdef1234567890abcdef12345678"
        );
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = "1234567890123456789012345678901234567890"
            .parse::<Address>()
            .unwrap_err();
        assert!(err.to_string().contains("missing 0x prefix"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("0x12345".parse::<Address>().is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!("0xzz34567890123456789012345678901234567890"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn word_is_left_padded() {
        let addr: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        let word = addr.to_word();
        assert!(word[..31].iter().all(|b| *b == 0));
        assert_eq!(word[31], 0xff);
    }

    #[test]
    fn serde_uses_hex_string() {
        let addr: Address = "0xABCDEF0000000000000000000000000000000001".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0xabcdef0000000000000000000000000000000001\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
