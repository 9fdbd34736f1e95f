//! Remote relayer backend, reached through its client library.
//!
//! Loading and initializing the library are separate steps so the
//! provisioner can report them as distinct statuses.

use std::sync::Arc;

use async_trait::async_trait;
use fhevm_crypto::Eip712Domain;

use crate::backend::{decryption_domain, EncryptionBackend};
use crate::config::RelayerConfig;
use crate::error::Result;
use crate::rpc::JsonRpc;

/// Fetches the relayer client library.
///
/// Failures should be reported as `Error::BackendLoadFailure`; other
/// errors are wrapped into it by the provisioner.
#[async_trait]
pub trait RelayerSdkLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn RelayerSdk>>;
}

/// A loaded relayer client library.
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    /// One-time initialization (key material download, WASM setup, ...).
    async fn initialize(&self) -> Result<()>;

    /// Build a session bound to `network` under the fixed `config`.
    async fn create_instance(
        &self,
        config: &RelayerConfig,
        network: Arc<dyn JsonRpc>,
    ) -> Result<Arc<dyn EncryptionBackend>>;
}

/// Loader for a library that is already linked into the process.
pub struct PreloadedRelayerSdk {
    sdk: Arc<dyn RelayerSdk>,
}

impl PreloadedRelayerSdk {
    pub fn new(sdk: Arc<dyn RelayerSdk>) -> Self {
        Self { sdk }
    }
}

#[async_trait]
impl RelayerSdkLoader for PreloadedRelayerSdk {
    async fn load(&self) -> Result<Arc<dyn RelayerSdk>> {
        Ok(self.sdk.clone())
    }
}

/// Decryption domain of the production relayer: statements are verified on
/// the gateway chain, not the host chain.
pub fn relayer_decryption_domain(config: &RelayerConfig) -> Eip712Domain {
    decryption_domain(
        config.gateway_chain_id,
        config.verifying_contract_address_decryption,
    )
}
