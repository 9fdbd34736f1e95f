//! Sends encoded results and proof mints to the contract and waits for
//! confirmation.

use std::sync::Arc;

use fhevm_crypto::Address;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::contract::TimeMaze;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::session::Session;
use crate::types::{EncryptedPayload, TransactionReceipt, TransactionRequest};
use crate::wallet::WalletSigner;

pub struct SubmissionCoordinator {
    ledger: Arc<dyn Ledger>,
    confirmations: u64,
}

impl SubmissionCoordinator {
    /// `confirmations` below 1 is raised to 1.
    pub fn new(ledger: Arc<dyn Ledger>, confirmations: u64) -> Self {
        Self {
            ledger,
            confirmations: confirmations.max(1),
        }
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// Call `submitResult(handles[0], inputProof)` on `contract`.
    ///
    /// The payload is consumed: a resubmission needs a fresh encoding.
    pub async fn submit(
        &self,
        session: &Session,
        payload: EncryptedPayload,
        contract: Address,
        wallet: &dyn WalletSigner,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt> {
        session.ensure_ready()?;
        let tx = TimeMaze::new(contract).submit_result(&payload)?;
        self.send_and_confirm(tx, wallet, cancel, "submitResult").await
    }

    /// Call `mintProof(metadataUri)` on `contract`.
    pub async fn mint_proof(
        &self,
        contract: Address,
        metadata_uri: &str,
        wallet: &dyn WalletSigner,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt> {
        let tx = TimeMaze::new(contract).mint_proof(metadata_uri);
        self.send_and_confirm(tx, wallet, cancel, "mintProof").await
    }

    async fn send_and_confirm(
        &self,
        tx: TransactionRequest,
        wallet: &dyn WalletSigner,
        cancel: &CancellationToken,
        call: &'static str,
    ) -> Result<TransactionReceipt> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let to = tx.to;
        let tx_hash = wallet.send_transaction(tx).await?;
        info!(call, %to, %tx_hash, from = %wallet.address(), "transaction sent");

        // The transaction is already out; cancelling only stops the wait.
        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            receipt = self.ledger.wait_for_receipt(tx_hash, self.confirmations) => receipt?,
        };

        if !receipt.success {
            warn!(call, %tx_hash, block = receipt.block_number, "transaction reverted");
            return Err(Error::TransactionReverted { tx_hash });
        }
        info!(call, %tx_hash, block = receipt.block_number, "transaction confirmed");
        Ok(receipt)
    }
}
