//! Rebuilds a player's submission history from event logs and fills in
//! plaintexts that have already been decrypted.

use std::collections::HashMap;
use std::sync::Arc;

use fhevm_crypto::Address;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::contract::{event_topic, ResultSubmitted};
use crate::decryption::DecryptionAuthorizationManager;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::session::Session;
use crate::types::{CiphertextHandle, HandleContractPair, LogFilter, Record};
use crate::wallet::WalletSigner;

pub struct RecordIndexer {
    ledger: Arc<dyn Ledger>,
}

impl RecordIndexer {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// All `event_signature` logs from `contract` with `submitter` as the
    /// first indexed topic, newest first.
    ///
    /// Scans from genesis on every call.
    // TODO: persist the last scanned block per (contract, submitter) and scan incrementally.
    pub async fn list_records(
        &self,
        contract: Address,
        event_signature: &str,
        submitter: Address,
    ) -> Result<Vec<Record>> {
        let filter = LogFilter {
            address: Some(contract),
            topics: vec![Some(event_topic(event_signature)), Some(submitter.to_word())],
            from_block: 0,
            to_block: None,
        };
        let mut logs = self.ledger.get_logs(&filter).await?;
        logs.sort_by(|a, b| {
            (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index))
        });

        let records = logs
            .iter()
            .map(|log| {
                let event = ResultSubmitted::decode(log)?;
                Ok(Record {
                    handle: event.input_handle,
                    contract: log.address,
                    submission_timestamp: event.timestamp,
                    transaction_id: log.transaction_hash,
                    block_height: log.block_number,
                    clear_value: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(%contract, %submitter, count = records.len(), "indexed records");
        Ok(records)
    }
}

/// Process-lifetime `handle -> plaintext` cache.
#[derive(Debug, Default)]
pub struct ClearValueCache {
    values: Mutex<HashMap<CiphertextHandle, u64>>,
}

impl ClearValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.values.lock().get(handle).copied()
    }

    pub fn contains(&self, handle: &CiphertextHandle) -> bool {
        self.values.lock().contains_key(handle)
    }

    /// First value wins; a handle's plaintext never changes.
    pub fn insert(&self, handle: CiphertextHandle, value: u64) {
        self.values.lock().entry(handle).or_insert(value);
    }

    pub fn extend(&self, values: impl IntoIterator<Item = (CiphertextHandle, u64)>) {
        let mut cache = self.values.lock();
        for (handle, value) in values {
            cache.entry(handle).or_insert(value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

/// Fill `clear_value` on every record whose handle is cached.
pub fn merge_clear_values(records: &mut [Record], cache: &ClearValueCache) {
    for record in records.iter_mut() {
        if record.clear_value.is_none() {
            record.clear_value = cache.get(&record.handle);
        }
    }
}

/// Decrypt only the uncached handles of `records` in a single batch, cache
/// the results, and merge them in. Returns how many values were newly
/// decrypted. No wallet prompt happens when everything is cached.
pub async fn decrypt_missing(
    records: &mut [Record],
    cache: &ClearValueCache,
    session: &Session,
    manager: &DecryptionAuthorizationManager,
    wallet: &dyn WalletSigner,
    cancel: &CancellationToken,
) -> Result<usize> {
    merge_clear_values(records, cache);

    let mut missing: Vec<HandleContractPair> = Vec::new();
    for record in records.iter().filter(|r| r.clear_value.is_none()) {
        let pair = HandleContractPair {
            handle: record.handle,
            contract_address: record.contract,
        };
        if !missing.contains(&pair) {
            missing.push(pair);
        }
    }
    if missing.is_empty() {
        return Ok(0);
    }

    let values = manager
        .request_decryption(session, &missing, wallet, cancel)
        .await?;
    let decrypted = values.len();
    cache.extend(values);
    merge_clear_values(records, cache);
    Ok(decrypted)
}
