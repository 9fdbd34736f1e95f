use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid backend metadata: expected object")]
    NotAnObject,

    #[error("Invalid backend metadata: missing {field}")]
    MissingField { field: &'static str },

    #[error("Invalid backend metadata: {field} is not an address ({reason})")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("JSON-RPC response has no result")]
    MissingResult,

    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("Invalid endpoint for chain {chain_id}: {reason}")]
    InvalidEndpoint { chain_id: u64, reason: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
