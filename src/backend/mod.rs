//! Encryption backend capability behind a session.
//!
//! The homomorphic math lives in the backend. This layer only asks it to
//! encrypt inputs and to re-encrypt authorized plaintexts to a caller's
//! ephemeral key.

pub mod local;
pub mod remote;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use fhevm_crypto::{encode_hex, Address, Eip712Domain, TypedData, TypedField};
use serde_json::json;

use crate::error::Result;
use crate::types::{CiphertextHandle, EncryptedPayload, HandleContractPair};

pub use local::LocalBackend;
pub use remote::{relayer_decryption_domain, PreloadedRelayerSdk, RelayerSdk, RelayerSdkLoader};

pub const DECRYPTION_DOMAIN_NAME: &str = "Decryption";
pub const DECRYPTION_DOMAIN_VERSION: &str = "1";
pub const USER_DECRYPT_PRIMARY_TYPE: &str = "UserDecryptRequestVerification";
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Opaque trailing field of the decryption statement.
const EXTRA_DATA: &[u8] = &[0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Deterministic in-process backend for test networks.
    Local,
    /// Production relayer reached through its client library.
    Remote,
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

pub fn decryption_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain {
        name: DECRYPTION_DOMAIN_NAME.to_string(),
        version: DECRYPTION_DOMAIN_VERSION.to_string(),
        chain_id,
        verifying_contract,
    }
}

/// The statement a user signs to authorize decryption.
///
/// Deterministic in its inputs so the backend can rebuild and verify it.
pub fn user_decrypt_typed_data(
    domain: Eip712Domain,
    public_key: &[u8],
    contract_addresses: &[Address],
    start_timestamp: u64,
    duration_days: u32,
) -> TypedData {
    let mut types = BTreeMap::new();
    types.insert(
        USER_DECRYPT_PRIMARY_TYPE.to_string(),
        vec![
            TypedField::new("publicKey", "bytes"),
            TypedField::new("contractAddresses", "address[]"),
            TypedField::new("startTimestamp", "uint256"),
            TypedField::new("durationDays", "uint256"),
            TypedField::new("extraData", "bytes"),
        ],
    );
    let contracts: Vec<String> = contract_addresses.iter().map(Address::to_string).collect();
    TypedData {
        domain,
        types,
        primary_type: USER_DECRYPT_PRIMARY_TYPE.to_string(),
        message: json!({
            "publicKey": encode_hex(public_key),
            "contractAddresses": contracts,
            "startTimestamp": start_timestamp.to_string(),
            "durationDays": duration_days.to_string(),
            "extraData": encode_hex(EXTRA_DATA),
        }),
    }
}

/// One batched user-decryption exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDecryptRequest {
    pub handles: Vec<HandleContractPair>,
    /// Ephemeral P-256 public key, SEC1 uncompressed.
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u32,
}

impl UserDecryptRequest {
    pub fn typed_data(&self, domain: Eip712Domain) -> TypedData {
        user_decrypt_typed_data(
            domain,
            &self.public_key,
            &self.contract_addresses,
            self.start_timestamp,
            self.duration_days,
        )
    }

    /// Unix second at which the grant stops being valid.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(u64::from(self.duration_days) * SECONDS_PER_DAY)
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }
}

/// Capability of an initialized session.
#[async_trait]
pub trait EncryptionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn chain_id(&self) -> u64;

    /// Encrypt `value` bound to `contract` and `user`. CPU-heavy; callers
    /// run it on a blocking thread.
    fn encrypt_u64(&self, value: u64, contract: Address, user: Address) -> Result<EncryptedPayload>;

    /// Make freshly encrypted inputs known to whatever serves later
    /// decryptions. Called once per payload, after `encrypt_u64`.
    async fn commit_inputs(&self, _payload: &EncryptedPayload) -> Result<()> {
        Ok(())
    }

    /// EIP-712 domain user-decryption statements are signed under.
    fn decryption_domain(&self) -> Eip712Domain;

    /// Returns a compact JWE per authorized handle, sealed to the request's
    /// public key over the 32-byte big-endian plaintext. Unauthorized
    /// handles are left out rather than reported as errors.
    async fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, String>>;
}
