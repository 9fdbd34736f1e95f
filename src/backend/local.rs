//! Deterministic in-process backend for local test networks.
//!
//! Ciphertexts are not real FHE ciphertexts: the backend keeps each
//! plaintext in memory under a handle derived from its binding, together
//! with the ACL entry (owner and contract) the contract would record.
//!
//! A backend connected to the local node also publishes every input it
//! encrypts there and looks up handles it has never seen, so values
//! submitted by an earlier or replacement session stay decryptable. The
//! node side of that exchange is [`LocalBackend::serve`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fhevm_crypto::{keccak256, recover_address, seal_to_public_key, Address, Eip712Domain};
use fhevm_discovery::LocalBackendMetadata;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{decryption_domain, unix_now, BackendKind, EncryptionBackend, UserDecryptRequest};
use crate::contract::u64_word;
use crate::error::{Error, Result};
use crate::rpc::JsonRpc;
use crate::types::{CiphertextHandle, EncryptedPayload, HandleContractPair};

/// FHE type tag for `euint64`, stored in byte 30 of a handle.
const EUINT64_TYPE: u8 = 5;
const HANDLE_VERSION: u8 = 0;
const HANDLE_DOMAIN: &[u8] = b"fhevm-local-input";
const PROOF_DOMAIN: &[u8] = b"fhevm-local-proof";

/// Node method publishing one [`CiphertextEntry`]. Returns `true`.
pub const STORE_CIPHERTEXT_METHOD: &str = "fhevm_local_storeCiphertext";
/// Node method looking up a handle. Returns a [`CiphertextEntry`] or `null`.
pub const GET_CIPHERTEXT_METHOD: &str = "fhevm_local_getCiphertext";

static INSTANCES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoredCiphertext {
    value: u64,
    contract: Address,
    owner: Address,
}

/// A ciphertext as exchanged with the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiphertextEntry {
    pub handle: CiphertextHandle,
    pub value: u64,
    pub contract: Address,
    pub owner: Address,
}

impl CiphertextEntry {
    fn new(handle: CiphertextHandle, stored: StoredCiphertext) -> Self {
        Self {
            handle,
            value: stored.value,
            contract: stored.contract,
            owner: stored.owner,
        }
    }

    fn stored(&self) -> StoredCiphertext {
        StoredCiphertext {
            value: self.value,
            contract: self.contract,
            owner: self.owner,
        }
    }
}

#[derive(Debug, Default)]
struct LocalState {
    next_index: u64,
    ciphertexts: HashMap<CiphertextHandle, StoredCiphertext>,
}

pub struct LocalBackend {
    chain_id: u64,
    metadata: LocalBackendMetadata,
    node: Option<Arc<dyn JsonRpc>>,
    /// Mixed into handle seeds so two instances never issue the same handle.
    salt: [u8; 32],
    state: Mutex<LocalState>,
}

impl LocalBackend {
    /// A standalone backend: only handles it encrypted itself are readable.
    pub fn new(chain_id: u64, metadata: LocalBackendMetadata) -> Self {
        let mut seed = Vec::with_capacity(16);
        seed.extend_from_slice(
            &chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        seed.extend_from_slice(&INSTANCES.fetch_add(1, Ordering::Relaxed).to_be_bytes());
        Self {
            chain_id,
            metadata,
            node: None,
            salt: keccak256(&seed),
            state: Mutex::new(LocalState::default()),
        }
    }

    /// A backend sharing its ciphertexts through the local node at `node`.
    pub fn connected(chain_id: u64, metadata: LocalBackendMetadata, node: Arc<dyn JsonRpc>) -> Self {
        Self {
            node: Some(node),
            ..Self::new(chain_id, metadata)
        }
    }

    pub fn is_connected(&self) -> bool {
        self.node.is_some()
    }

    pub fn metadata(&self) -> &LocalBackendMetadata {
        &self.metadata
    }

    /// Check that `proof` binds `handle` to `contract` and `user`.
    pub fn verify_input(
        &self,
        handle: &CiphertextHandle,
        proof: &[u8],
        contract: Address,
        user: Address,
    ) -> bool {
        verify_input_proof(&self.metadata, self.chain_id, handle, proof, contract, user)
    }

    /// Answer a node-side ciphertext method from this backend's store.
    ///
    /// The first entry stored under a handle wins; later ones are ignored.
    pub fn serve(&self, method: &str, params: &Value) -> Result<Value> {
        match method {
            STORE_CIPHERTEXT_METHOD => {
                let entry: CiphertextEntry = first_param(method, params)?;
                self.state
                    .lock()
                    .ciphertexts
                    .entry(entry.handle)
                    .or_insert_with(|| entry.stored());
                debug!(handle = %entry.handle, "stored ciphertext for node");
                Ok(Value::Bool(true))
            }
            GET_CIPHERTEXT_METHOD => {
                let handle: CiphertextHandle = first_param(method, params)?;
                let found = self.state.lock().ciphertexts.get(&handle).copied();
                match found {
                    Some(stored) => Ok(serde_json::to_value(CiphertextEntry::new(handle, stored))?),
                    None => Ok(Value::Null),
                }
            }
            other => Err(Error::Rpc {
                code: -32601,
                message: format!("method {} not supported", other),
            }),
        }
    }

    /// Pull handles this instance has not seen from the node.
    async fn fetch_missing(&self, pairs: &[HandleContractPair]) -> Result<()> {
        let Some(node) = &self.node else {
            return Ok(());
        };
        let mut missing: Vec<CiphertextHandle> = {
            let state = self.state.lock();
            pairs
                .iter()
                .map(|pair| pair.handle)
                .filter(|handle| !state.ciphertexts.contains_key(handle))
                .collect()
        };
        missing.sort();
        missing.dedup();

        for handle in missing {
            let raw = node
                .request(GET_CIPHERTEXT_METHOD, Value::Array(vec![Value::String(handle.to_string())]))
                .await?;
            if raw.is_null() {
                debug!(%handle, "node does not know handle");
                continue;
            }
            let entry: CiphertextEntry = serde_json::from_value(raw).map_err(|e| {
                Error::InvalidResponse(format!("{} result: {}", GET_CIPHERTEXT_METHOD, e))
            })?;
            if entry.handle != handle {
                return Err(Error::InvalidResponse(format!(
                    "node answered {} for handle {}",
                    entry.handle, handle
                )));
            }
            self.state
                .lock()
                .ciphertexts
                .entry(handle)
                .or_insert_with(|| entry.stored());
            debug!(%handle, "fetched ciphertext from node");
        }
        Ok(())
    }

    fn seal_authorized(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, String>> {
        let state = self.state.lock();
        let mut sealed = HashMap::new();
        for pair in &request.handles {
            let Some(stored) = state.ciphertexts.get(&pair.handle) else {
                debug!(handle = %pair.handle, "unknown handle");
                continue;
            };
            let bound = stored.contract == pair.contract_address
                && request.contract_addresses.contains(&stored.contract);
            if stored.owner != request.user_address || !bound {
                debug!(handle = %pair.handle, "handle not readable under this grant");
                continue;
            }
            sealed.insert(
                pair.handle,
                seal_to_public_key(&u64_word(stored.value), &request.public_key)?,
            );
        }
        Ok(sealed)
    }
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("chain_id", &self.chain_id)
            .field("metadata", &self.metadata)
            .field("connected", &self.node.is_some())
            .finish_non_exhaustive()
    }
}

fn first_param<T: serde::de::DeserializeOwned>(method: &str, params: &Value) -> Result<T> {
    let param = params.get(0).cloned().unwrap_or(Value::Null);
    serde_json::from_value(param).map_err(|e| Error::Rpc {
        code: -32602,
        message: format!("invalid params for {}: {}", method, e),
    })
}

fn proof_binding(
    metadata: &LocalBackendMetadata,
    chain_id: u64,
    handle: &CiphertextHandle,
    contract: Address,
    user: Address,
) -> [u8; 32] {
    let mut buf = Vec::with_capacity(PROOF_DOMAIN.len() + 20 * 3 + 8 + 32);
    buf.extend_from_slice(PROOF_DOMAIN);
    buf.extend_from_slice(metadata.input_verifier_address.as_bytes());
    buf.extend_from_slice(&chain_id.to_be_bytes());
    buf.extend_from_slice(contract.as_bytes());
    buf.extend_from_slice(user.as_bytes());
    buf.extend_from_slice(handle.as_bytes());
    keccak256(&buf)
}

/// Input proof layout: `count (1) || handles (32 each) || binding (32)`.
pub fn verify_input_proof(
    metadata: &LocalBackendMetadata,
    chain_id: u64,
    handle: &CiphertextHandle,
    proof: &[u8],
    contract: Address,
    user: Address,
) -> bool {
    if proof.len() != 1 + 32 + 32 || proof[0] != 1 || proof[1..33] != handle.0 {
        return false;
    }
    proof[33..] == proof_binding(metadata, chain_id, handle, contract, user)
}

#[async_trait]
impl EncryptionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn encrypt_u64(&self, value: u64, contract: Address, user: Address) -> Result<EncryptedPayload> {
        let mut state = self.state.lock();
        let index = state.next_index;
        state.next_index += 1;

        let mut seed = Vec::with_capacity(HANDLE_DOMAIN.len() + 32 + 8 + 20 * 2 + 8);
        seed.extend_from_slice(HANDLE_DOMAIN);
        seed.extend_from_slice(&self.salt);
        seed.extend_from_slice(&self.chain_id.to_be_bytes());
        seed.extend_from_slice(contract.as_bytes());
        seed.extend_from_slice(user.as_bytes());
        seed.extend_from_slice(&index.to_be_bytes());
        let mut word = keccak256(&seed);
        word[30] = EUINT64_TYPE;
        word[31] = HANDLE_VERSION;
        let handle = CiphertextHandle(word);

        state.ciphertexts.insert(
            handle,
            StoredCiphertext {
                value,
                contract,
                owner: user,
            },
        );

        let mut input_proof = Vec::with_capacity(65);
        input_proof.push(1);
        input_proof.extend_from_slice(handle.as_bytes());
        input_proof.extend_from_slice(&proof_binding(
            &self.metadata,
            self.chain_id,
            &handle,
            contract,
            user,
        ));
        debug!(%handle, %contract, %user, "encrypted local input");

        Ok(EncryptedPayload {
            handles: vec![handle],
            input_proof,
        })
    }

    async fn commit_inputs(&self, payload: &EncryptedPayload) -> Result<()> {
        let Some(node) = &self.node else {
            return Ok(());
        };
        let entries: Vec<CiphertextEntry> = {
            let state = self.state.lock();
            payload
                .handles
                .iter()
                .filter_map(|handle| {
                    state
                        .ciphertexts
                        .get(handle)
                        .map(|stored| CiphertextEntry::new(*handle, *stored))
                })
                .collect()
        };
        for entry in entries {
            node.request(
                STORE_CIPHERTEXT_METHOD,
                Value::Array(vec![serde_json::to_value(entry)?]),
            )
            .await?;
            debug!(handle = %entry.handle, "published ciphertext to node");
        }
        Ok(())
    }

    fn decryption_domain(&self) -> Eip712Domain {
        decryption_domain(self.chain_id, self.metadata.kms_verifier_address)
    }

    async fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, String>> {
        if !request.is_valid_at(unix_now()) {
            warn!(
                start = request.start_timestamp,
                days = request.duration_days,
                "decryption grant outside its validity window"
            );
            return Ok(HashMap::new());
        }

        let digest = request.typed_data(self.decryption_domain()).signing_digest()?;
        match recover_address(&digest, &request.signature) {
            Ok(signer) if signer == request.user_address => {}
            Ok(signer) => {
                warn!(%signer, user = %request.user_address, "decryption grant signed by another account");
                return Ok(HashMap::new());
            }
            Err(e) => {
                warn!(error = %e, "decryption grant signature invalid");
                return Ok(HashMap::new());
            }
        }

        self.fetch_missing(&request.handles).await?;
        self.seal_authorized(request)
    }
}
