use thiserror::Error;

use crate::status::SessionStatus;
use crate::types::{CiphertextHandle, TxHash};

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Backend client library failed to load: {0}")]
    BackendLoadFailure(String),

    #[error("Backend initialization failed: {0}")]
    BackendInitFailure(String),

    #[error("Session is not ready (status: {status})")]
    InvalidSession { status: SessionStatus },

    #[error("Signer declined: {0}")]
    SignerDeclined(String),

    #[error("Transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: TxHash },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not authorized to decrypt handle {0}")]
    Unauthorized(CiphertextHandle),

    #[error("A provisioning attempt is already in flight")]
    ProvisioningInProgress,

    #[error("Provisioning failed during {step}: {source}")]
    Provisioning {
        step: SessionStatus,
        #[source]
        source: Box<Error>,
    },

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Encryption backend error: {0}")]
    Backend(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] fhevm_crypto::CryptoError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] fhevm_discovery::DiscoveryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying after a delay (network, backend availability).
    Transient,
    /// Retrying the same request will fail the same way.
    Permanent,
    /// The user declined a prompt; retrying immediately is fine.
    UserAction,
    /// The caller aborted the operation.
    Cancelled,
}

impl Error {
    /// Map a JSON-RPC error object, recognising user rejection.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == USER_REJECTED_CODE {
            Error::SignerDeclined(message)
        } else {
            Error::Rpc { code, message }
        }
    }

    /// The underlying error, looking through the provisioning step wrapper.
    pub fn cause(&self) -> &Error {
        match self {
            Error::Provisioning { source, .. } => source.cause(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Provisioning { source, .. } => source.kind(),
            Error::NetworkUnavailable(_)
            | Error::BackendLoadFailure(_)
            | Error::BackendInitFailure(_)
            | Error::ProvisioningInProgress => ErrorKind::Transient,
            Error::SignerDeclined(_) => ErrorKind::UserAction,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidSession { .. }
            | Error::TransactionReverted { .. }
            | Error::Unauthorized(_)
            | Error::Encoding(_)
            | Error::Backend(_)
            | Error::Rpc { .. }
            | Error::InvalidResponse(_)
            | Error::Config(_)
            | Error::Crypto(_)
            | Error::Discovery(_)
            | Error::Json(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::UserAction)
    }
}
