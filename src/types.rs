//! Value types shared across the session layer: ciphertext handles,
//! encrypted payloads, ledger logs and receipts, and indexed records.

use std::fmt;
use std::str::FromStr;

use fhevm_crypto::{decode_hex, encode_hex, Address};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A 32-byte EVM word.
pub type Word = [u8; 32];

macro_rules! fixed_bytes32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Word);

        impl $name {
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let word = <Word>::try_from(bytes).map_err(|_| {
                    Error::InvalidResponse(format!(
                        "{} must be 32 bytes, got {}",
                        stringify!($name),
                        bytes.len()
                    ))
                })?;
                Ok(Self(word))
            }

            pub fn as_bytes(&self) -> &Word {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_slice(&decode_hex(s)?)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_hex(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes32!(
    /// Opaque reference to a ciphertext held by the encryption backend.
    CiphertextHandle
);

fixed_bytes32!(
    /// Ledger transaction id.
    TxHash
);

// ============================================================================
// Encoding
// ============================================================================

/// Output of input encoding: ciphertext handles plus the proof that binds
/// them to one contract and one submitter.
///
/// Not `Clone`: a payload is consumed by exactly one transaction.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub handles: Vec<CiphertextHandle>,
    pub input_proof: Vec<u8>,
}

/// A handle together with the contract it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract_address: Address,
}

// ============================================================================
// Ledger
// ============================================================================

/// Transaction to send from the wallet's account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    pub data: Vec<u8>,
}

/// Event log filter. A `None` topic position matches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topics: Vec<Option<Word>>,
    pub from_block: u64,
    /// `None` scans to the latest block.
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn matches(&self, log: &LogEntry) -> bool {
        if let Some(address) = self.address {
            if log.address != address {
                return false;
            }
        }
        if log.block_number < self.from_block {
            return false;
        }
        if let Some(to) = self.to_block {
            if log.block_number > to {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            Some(topic) => log.topics.get(i) == Some(topic),
            None => true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Word>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

// ============================================================================
// Records
// ============================================================================

/// A past submission reconstructed from a `ResultSubmitted` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub handle: CiphertextHandle,
    /// Contract that emitted the event (and owns the handle).
    pub contract: Address,
    /// Unix seconds, as emitted by the contract.
    pub submission_timestamp: u64,
    pub transaction_id: TxHash,
    pub block_height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_value: Option<u64>,
}
