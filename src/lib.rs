//! Client-side encrypted session and authorization layer for fhEVM
//! contracts: backend selection and provisioning, input encoding,
//! submission, wallet-signed decryption, and record indexing.

pub mod backend;
pub mod config;
pub mod contract;
pub mod decryption;
pub mod encoder;
pub mod error;
pub mod ledger;
pub mod provisioner;
pub mod records;
pub mod resolver;
pub mod rpc;
pub mod session;
pub mod status;
pub mod submission;
pub mod types;
pub mod wallet;

pub use backend::{
    BackendKind, EncryptionBackend, LocalBackend, PreloadedRelayerSdk, RelayerSdk,
    RelayerSdkLoader, UserDecryptRequest,
};
pub use config::{ClientConfig, RelayerConfig};
pub use contract::{TimeMaze, RESULT_SUBMITTED_SIGNATURE};
pub use decryption::{require_all, AuthorizationGrant, DecryptionAuthorizationManager};
pub use encoder::InputEncoder;
pub use error::{Error, ErrorKind, Result};
pub use ledger::{Ledger, RpcLedger};
pub use provisioner::SessionProvisioner;
pub use records::{decrypt_missing, merge_clear_values, ClearValueCache, RecordIndexer};
pub use resolver::{BackendProbe, HttpBackendProbe, NetworkResolver, Resolution};
pub use rpc::{HttpJsonRpc, JsonRpc};
pub use session::{Session, SessionKey, SessionSlot};
pub use status::{SessionStatus, StatusCallback};
pub use submission::SubmissionCoordinator;
pub use types::{
    CiphertextHandle, EncryptedPayload, HandleContractPair, LogEntry, LogFilter, Record,
    TransactionReceipt, TransactionRequest, TxHash,
};
pub use wallet::{LocalWallet, Signature, WalletSigner};

pub use fhevm_crypto::Address;
