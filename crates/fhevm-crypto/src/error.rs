use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid length for {what}: expected {expected} bytes, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Typed data: unknown type {0}")]
    UnknownType(String),

    #[error("Typed data: missing field {0}")]
    MissingField(String),

    #[error("Typed data: invalid value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Signature recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("JWE format error: {0}")]
    JweFormat(String),

    #[error("JWE unsupported algorithm: {0}")]
    JweUnsupportedAlgorithm(String),

    #[error("JWE encryption failed: {0}")]
    JweEncryptionFailed(String),

    #[error("JWE decryption failed: {0}")]
    JweDecryptionFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
