//! Client configuration.

use fhevm_crypto::Address;
use fhevm_discovery::LocalChains;
use hex_literal::hex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Chain id of the Sepolia production network family.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// Fixed configuration of the remote relayer for the production network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerConfig {
    pub acl_contract_address: Address,
    pub kms_contract_address: Address,
    pub input_verifier_contract_address: Address,
    pub verifying_contract_address_decryption: Address,
    pub verifying_contract_address_input_verification: Address,
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub relayer_url: String,
}

impl RelayerConfig {
    pub fn sepolia() -> Self {
        Self {
            acl_contract_address: Address(hex!("687820221192C5B662b25367F70076A37bc79b6c")),
            kms_contract_address: Address(hex!("1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC")),
            input_verifier_contract_address: Address(hex!(
                "bc91f3daD1A5F19F8390c400196e58073B6a0BC4"
            )),
            verifying_contract_address_decryption: Address(hex!(
                "b6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1"
            )),
            verifying_contract_address_input_verification: Address(hex!(
                "7048C39f048125eDa9d678AEbaDfB22F7900a29F"
            )),
            chain_id: SEPOLIA_CHAIN_ID,
            gateway_chain_id: 55815,
            relayer_url: "https://relayer.testnet.zama.cloud".to_string(),
        }
    }
}

impl RelayerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.relayer_url.starts_with("http://") || self.relayer_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "relayerUrl must be an http(s) URL, got {:?}",
                self.relayer_url
            )));
        }
        if self.chain_id == 0 {
            return Err(Error::Config("relayer chainId must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self::sepolia()
    }
}

/// Configuration for the whole session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Chains probed for a local backend, with their node endpoints.
    pub local_chains: LocalChains,
    /// Lifetime of a signed decryption grant.
    ///
    /// Longer windows mean fewer signature prompts, but a leaked ephemeral
    /// private key stays usable for that whole period. The key is dropped
    /// after each call here, so the window matters only if memory is
    /// compromised mid-call or the backend caches grants.
    pub decryption_validity_days: u32,
    /// Confirmations to wait for after a transaction is mined. At least 1.
    pub confirmations: u64,
    pub relayer: RelayerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local_chains: LocalChains::default(),
            decryption_validity_days: 365,
            confirmations: 1,
            relayer: RelayerConfig::sepolia(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.decryption_validity_days == 0 {
            return Err(Error::Config(
                "decryptionValidityDays must be at least 1".to_string(),
            ));
        }
        if self.confirmations == 0 {
            return Err(Error::Config("confirmations must be at least 1".to_string()));
        }
        self.local_chains.validate()?;
        self.relayer.validate()?;
        Ok(())
    }
}
