//! Ledger access: chain identity, event logs, transactions, receipts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fhevm_crypto::{decode_hex, encode_hex, Address};
use fhevm_discovery::parse_chain_id;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::rpc::JsonRpc;
use crate::types::{LogEntry, LogFilter, TransactionReceipt, TransactionRequest, TxHash, Word};

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>>;

    /// Send a transaction from `from`. Only works for accounts the node
    /// can sign for (e.g. unlocked development accounts).
    async fn send_transaction(&self, from: Address, tx: &TransactionRequest) -> Result<TxHash>;

    /// Block until `tx_hash` is mined and has `confirmations` blocks on top
    /// (counting its own block). A reverted receipt is returned as-is.
    async fn wait_for_receipt(&self, tx_hash: TxHash, confirmations: u64)
        -> Result<TransactionReceipt>;
}

/// `Ledger` over standard `eth_*` JSON-RPC methods.
pub struct RpcLedger {
    rpc: Arc<dyn JsonRpc>,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl RpcLedger {
    pub fn new(rpc: Arc<dyn JsonRpc>) -> Self {
        Self {
            rpc,
            poll_interval: Duration::from_millis(1000),
            receipt_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, receipt_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.receipt_timeout = receipt_timeout;
        self
    }

    async fn block_number(&self) -> Result<u64> {
        quantity(&self.rpc.request("eth_blockNumber", json!([])).await?)
    }

    async fn poll_receipt(&self, tx_hash: TxHash, confirmations: u64) -> Result<TransactionReceipt> {
        loop {
            let raw = self
                .rpc
                .request("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
                .await?;
            if !raw.is_null() {
                let receipt = parse_receipt(&raw)?;
                if confirmations <= 1 {
                    return Ok(receipt);
                }
                let head = self.block_number().await?;
                if head.saturating_add(1) >= receipt.block_number.saturating_add(confirmations) {
                    return Ok(receipt);
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn chain_id(&self) -> Result<u64> {
        let raw = self.rpc.request("eth_chainId", json!([])).await?;
        Ok(parse_chain_id(&raw)?)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let mut query = Map::new();
        if let Some(address) = filter.address {
            query.insert("address".into(), json!(address.to_string()));
        }
        query.insert("fromBlock".into(), json!(format!("0x{:x}", filter.from_block)));
        query.insert(
            "toBlock".into(),
            match filter.to_block {
                Some(block) => json!(format!("0x{:x}", block)),
                None => json!("latest"),
            },
        );
        let topics: Vec<Value> = filter
            .topics
            .iter()
            .map(|t| match t {
                Some(word) => json!(encode_hex(word)),
                None => Value::Null,
            })
            .collect();
        query.insert("topics".into(), Value::Array(topics));

        let raw = self
            .rpc
            .request("eth_getLogs", json!([Value::Object(query)]))
            .await?;
        let entries = raw
            .as_array()
            .ok_or_else(|| Error::InvalidResponse("eth_getLogs result is not an array".to_string()))?;
        debug!(count = entries.len(), "fetched logs");
        entries.iter().map(parse_log).collect()
    }

    async fn send_transaction(&self, from: Address, tx: &TransactionRequest) -> Result<TxHash> {
        let raw = self
            .rpc
            .request(
                "eth_sendTransaction",
                json!([{
                    "from": from.to_string(),
                    "to": tx.to.to_string(),
                    "data": encode_hex(&tx.data),
                }]),
            )
            .await?;
        hash_field(&raw, "transaction hash")
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> Result<TransactionReceipt> {
        tokio::time::timeout(self.receipt_timeout, self.poll_receipt(tx_hash, confirmations))
            .await
            .map_err(|_| {
                Error::NetworkUnavailable(format!(
                    "no receipt for {} after {:?}",
                    tx_hash, self.receipt_timeout
                ))
            })?
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn quantity(value: &Value) -> Result<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::InvalidResponse(format!("expected hex quantity, got {}", value)))?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidResponse(format!("quantity missing 0x prefix: {}", s)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| Error::InvalidResponse(format!("invalid quantity: {}", s)))
}

fn field<'a>(obj: &'a Value, name: &str) -> Result<&'a Value> {
    obj.get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::InvalidResponse(format!("missing field {}", name)))
}

fn hash_field(value: &Value, what: &str) -> Result<TxHash> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::InvalidResponse(format!("{} is not a string", what)))?;
    s.parse()
}

fn parse_log(raw: &Value) -> Result<LogEntry> {
    let address: Address = field(raw, "address")?
        .as_str()
        .ok_or_else(|| Error::InvalidResponse("log address is not a string".to_string()))?
        .parse()?;
    let topics = field(raw, "topics")?
        .as_array()
        .ok_or_else(|| Error::InvalidResponse("log topics is not an array".to_string()))?
        .iter()
        .map(|t| -> Result<Word> { Ok(*hash_field(t, "topic")?.as_bytes()) })
        .collect::<Result<Vec<_>>>()?;
    let data = decode_hex(
        field(raw, "data")?
            .as_str()
            .ok_or_else(|| Error::InvalidResponse("log data is not a string".to_string()))?,
    )?;
    Ok(LogEntry {
        address,
        topics,
        data,
        block_number: quantity(field(raw, "blockNumber")?)?,
        log_index: quantity(field(raw, "logIndex")?)?,
        transaction_hash: hash_field(field(raw, "transactionHash")?, "transactionHash")?,
    })
}

fn parse_receipt(raw: &Value) -> Result<TransactionReceipt> {
    let logs = match raw.get("logs").and_then(Value::as_array) {
        Some(entries) => entries.iter().map(parse_log).collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(TransactionReceipt {
        transaction_hash: hash_field(field(raw, "transactionHash")?, "transactionHash")?,
        block_number: quantity(field(raw, "blockNumber")?)?,
        success: quantity(field(raw, "status")?)? == 1,
        logs,
    })
}
