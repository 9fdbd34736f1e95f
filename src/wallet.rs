//! Wallet signer interface and a private-key implementation for development.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use fhevm_crypto::{
    address_from_verifying_key, generate_wallet_key, sign_digest, wallet_key_from_hex, Address,
    TypedData, SIGNATURE_LENGTH,
};
use k256::ecdsa::SigningKey;
use tracing::debug;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::types::{TransactionRequest, TxHash};

/// 65-byte `r || s || v` signature.
pub type Signature = [u8; SIGNATURE_LENGTH];

/// The user's on-chain identity. Both signing methods may wait on a human.
///
/// Implementations report a declined prompt as `Error::SignerDeclined`.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// EIP-712 `eth_signTypedData_v4` semantics.
    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature>;

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash>;
}

/// Signs with an in-memory secp256k1 key and submits through a ledger.
pub struct LocalWallet {
    key: SigningKey,
    address: Address,
    ledger: Arc<dyn Ledger>,
}

impl LocalWallet {
    pub fn new(key: SigningKey, ledger: Arc<dyn Ledger>) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self {
            key,
            address,
            ledger,
        }
    }

    pub fn random(ledger: Arc<dyn Ledger>) -> Self {
        Self::new(generate_wallet_key(), ledger)
    }

    pub fn from_hex(private_key: &str, ledger: Arc<dyn Ledger>) -> Result<Self> {
        Ok(Self::new(wallet_key_from_hex(private_key)?, ledger))
    }
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature> {
        let digest = data.signing_digest()?;
        debug!(signer = %self.address, primary_type = %data.primary_type, "signing typed data");
        Ok(sign_digest(&self.key, &digest)?)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        self.ledger.send_transaction(self.address, &tx).await
    }
}
