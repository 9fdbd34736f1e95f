use fhevm_crypto::Address;
use serde_json::{json, Map, Value};

use crate::error::DiscoveryError;
use crate::types::LocalBackendMetadata;
use crate::RELAYER_METADATA_METHOD;

/// Body of the metadata probe POSTed to a local node.
pub fn metadata_request_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": RELAYER_METADATA_METHOD,
        "params": [],
    })
}

/// Unwrap a JSON-RPC response envelope and validate its `result`.
///
/// # Errors
/// Returns `DiscoveryError` if the envelope carries an error, has no
/// `result`, or the result is not valid backend metadata.
pub fn parse_metadata_response(response: &Value) -> Result<LocalBackendMetadata, DiscoveryError> {
    let obj = response.as_object().ok_or(DiscoveryError::NotAnObject)?;

    if let Some(err) = obj.get("error").filter(|e| !e.is_null()) {
        return Err(DiscoveryError::JsonRpc {
            code: err.get("code").and_then(|c| c.as_i64()).unwrap_or_default(),
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("")
                .to_string(),
        });
    }

    match obj.get("result") {
        Some(result) if !result.is_null() => validate_local_metadata(result),
        _ => Err(DiscoveryError::MissingResult),
    }
}

/// Validate and parse a JSON value as local backend metadata.
///
/// # Errors
/// Returns `DiscoveryError` if a required address is missing or malformed.
pub fn validate_local_metadata(json: &Value) -> Result<LocalBackendMetadata, DiscoveryError> {
    let obj = json.as_object().ok_or(DiscoveryError::NotAnObject)?;

    Ok(LocalBackendMetadata {
        acl_address: get_address(obj, "ACLAddress")?,
        input_verifier_address: get_address(obj, "InputVerifierAddress")?,
        kms_verifier_address: get_address(obj, "KMSVerifierAddress")?,
    })
}

fn get_address(obj: &Map<String, Value>, field: &'static str) -> Result<Address, DiscoveryError> {
    match obj.get(field).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s.parse().map_err(|e: fhevm_crypto::CryptoError| {
            DiscoveryError::InvalidAddress {
                field,
                reason: e.to_string(),
            }
        }),
        _ => Err(DiscoveryError::MissingField { field }),
    }
}
