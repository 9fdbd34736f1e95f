use fhevm_crypto::Address;
use serde::{Deserialize, Serialize};

/// Result of the `fhevm_relayer_metadata` call on a local node.
///
/// These are the coprocessor contracts the local backend is deployed
/// against; a session built from them needs no remote client library.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalBackendMetadata {
    #[serde(rename = "ACLAddress")]
    pub acl_address: Address,
    #[serde(rename = "InputVerifierAddress")]
    pub input_verifier_address: Address,
    #[serde(rename = "KMSVerifierAddress")]
    pub kms_verifier_address: Address,
}
