//! EIP-712 structured data hashing.
//!
//! Supports the atomic types wallets sign in practice (`address`, `bool`,
//! `string`, `bytes`, `bytesN`, `uintN`, non-negative `intN`), dynamic arrays
//! of any supported type, and nested struct types declared in `types`.
//!
//! Message values use the JSON conventions of `eth_signTypedData_v4`:
//! addresses and byte strings as `0x` hex, integers as JSON numbers or
//! decimal/hex strings.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CryptoError;
use crate::types::{decode_hex, Address};
use crate::wallet::keccak256;

/// One field of a struct type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypedField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TypedField {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// The `EIP712Domain` separator fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    /// `keccak256(encodeType(EIP712Domain) || fields)`.
    pub fn separator(&self) -> [u8; 32] {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let mut buf = Vec::with_capacity(32 * 5);
        buf.extend_from_slice(&type_hash);
        buf.extend_from_slice(&keccak256(self.name.as_bytes()));
        buf.extend_from_slice(&keccak256(self.version.as_bytes()));
        buf.extend_from_slice(&u128_word(self.chain_id as u128));
        buf.extend_from_slice(&self.verifying_contract.to_word());
        keccak256(&buf)
    }
}

/// A complete typed-data document, as passed to a wallet's
/// `signTypedData(domain, types, message)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub domain: Eip712Domain,
    pub types: BTreeMap<String, Vec<TypedField>>,
    pub primary_type: String,
    pub message: Value,
}

impl TypedData {
    /// The 32-byte digest a wallet signs:
    /// `keccak256(0x19 0x01 || domainSeparator || hashStruct(message))`.
    pub fn signing_digest(&self) -> Result<[u8; 32], CryptoError> {
        let struct_hash = self.hash_struct(&self.primary_type, &self.message)?;
        let mut buf = Vec::with_capacity(2 + 32 + 32);
        buf.extend_from_slice(&[0x19, 0x01]);
        buf.extend_from_slice(&self.domain.separator());
        buf.extend_from_slice(&struct_hash);
        Ok(keccak256(&buf))
    }

    /// `encodeType` for a struct: the primary type followed by every
    /// referenced struct type in alphabetical order.
    pub fn encode_type(&self, primary: &str) -> Result<String, CryptoError> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(primary, &mut deps)?;
        deps.remove(primary);

        let mut out = self.format_struct(primary)?;
        for dep in deps {
            out.push_str(&self.format_struct(&dep)?);
        }
        Ok(out)
    }

    pub fn hash_struct(&self, kind: &str, value: &Value) -> Result<[u8; 32], CryptoError> {
        let fields = self
            .types
            .get(kind)
            .ok_or_else(|| CryptoError::UnknownType(kind.to_string()))?;
        let obj = value.as_object().ok_or_else(|| CryptoError::InvalidFieldValue {
            field: kind.to_string(),
            reason: "expected object".to_string(),
        })?;

        let mut buf = Vec::with_capacity(32 * (fields.len() + 1));
        buf.extend_from_slice(&keccak256(self.encode_type(kind)?.as_bytes()));
        for field in fields {
            let field_value = obj
                .get(&field.name)
                .ok_or_else(|| CryptoError::MissingField(field.name.clone()))?;
            buf.extend_from_slice(&self.encode_value(&field.name, &field.kind, field_value)?);
        }
        Ok(keccak256(&buf))
    }

    fn format_struct(&self, kind: &str) -> Result<String, CryptoError> {
        let fields = self
            .types
            .get(kind)
            .ok_or_else(|| CryptoError::UnknownType(kind.to_string()))?;
        let members: Vec<String> = fields
            .iter()
            .map(|f| format!("{} {}", f.kind, f.name))
            .collect();
        Ok(format!("{}({})", kind, members.join(",")))
    }

    fn collect_dependencies(
        &self,
        kind: &str,
        found: &mut BTreeSet<String>,
    ) -> Result<(), CryptoError> {
        let base = strip_array(kind);
        if found.contains(base) || !self.types.contains_key(base) {
            return Ok(());
        }
        found.insert(base.to_string());
        let fields = &self.types[base];
        for field in fields {
            self.collect_dependencies(&field.kind, found)?;
        }
        Ok(())
    }

    fn encode_value(&self, field: &str, kind: &str, value: &Value) -> Result<[u8; 32], CryptoError> {
        if let Some(inner) = kind.strip_suffix("[]") {
            let items = value.as_array().ok_or_else(|| invalid(field, "expected array"))?;
            let mut buf = Vec::with_capacity(32 * items.len());
            for item in items {
                buf.extend_from_slice(&self.encode_value(field, inner, item)?);
            }
            return Ok(keccak256(&buf));
        }

        if self.types.contains_key(kind) {
            return self.hash_struct(kind, value);
        }

        match kind {
            "address" => {
                let s = value.as_str().ok_or_else(|| invalid(field, "expected address string"))?;
                let address: Address = s.parse()?;
                Ok(address.to_word())
            }
            "bool" => {
                let b = value.as_bool().ok_or_else(|| invalid(field, "expected bool"))?;
                Ok(u128_word(b as u128))
            }
            "string" => {
                let s = value.as_str().ok_or_else(|| invalid(field, "expected string"))?;
                Ok(keccak256(s.as_bytes()))
            }
            "bytes" => {
                let s = value.as_str().ok_or_else(|| invalid(field, "expected hex bytes"))?;
                Ok(keccak256(&decode_hex(s)?))
            }
            _ if kind.starts_with("bytes") => {
                let size: usize = kind[5..]
                    .parse()
                    .map_err(|_| CryptoError::UnknownType(kind.to_string()))?;
                if size == 0 || size > 32 {
                    return Err(CryptoError::UnknownType(kind.to_string()));
                }
                let s = value.as_str().ok_or_else(|| invalid(field, "expected hex bytes"))?;
                let bytes = decode_hex(s)?;
                if bytes.len() != size {
                    return Err(invalid(field, &format!("expected {} bytes", size)));
                }
                let mut word = [0u8; 32];
                word[..size].copy_from_slice(&bytes);
                Ok(word)
            }
            _ if kind.starts_with("uint") || kind.starts_with("int") => {
                encode_integer(field, value)
            }
            _ => Err(CryptoError::UnknownType(kind.to_string())),
        }
    }
}

fn strip_array(kind: &str) -> &str {
    kind.split('[').next().unwrap_or(kind)
}

fn invalid(field: &str, reason: &str) -> CryptoError {
    CryptoError::InvalidFieldValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn u128_word(n: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&n.to_be_bytes());
    word
}

fn encode_integer(field: &str, value: &Value) -> Result<[u8; 32], CryptoError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| u128_word(v as u128))
            .ok_or_else(|| invalid(field, "expected non-negative integer")),
        Value::String(s) if s.starts_with("0x") || s.starts_with("0X") => {
            let bytes = decode_hex(s)?;
            if bytes.len() > 32 {
                return Err(invalid(field, "integer wider than 256 bits"));
            }
            let mut word = [0u8; 32];
            word[32 - bytes.len()..].copy_from_slice(&bytes);
            Ok(word)
        }
        Value::String(s) => s
            .parse::<u128>()
            .map(u128_word)
            .map_err(|e| invalid(field, &e.to_string())),
        _ => Err(invalid(field, "expected integer")),
    }
}
