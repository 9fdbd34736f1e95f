#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fhevm_crypto::{keccak256, TypedData};
use fhevm_discovery::LocalBackendMetadata;
use fhevm_session::backend::local::verify_input_proof;
use fhevm_session::contract::{decode_mint_proof, decode_submit_result, ResultSubmitted};
use fhevm_session::{
    Address, BackendProbe, ClientConfig, EncryptionBackend, Error, JsonRpc, Ledger,
    LocalBackend, LocalWallet, LogEntry, LogFilter, RelayerConfig, RelayerSdk, RelayerSdkLoader,
    Result, Session, SessionProvisioner, Signature, TransactionReceipt, TransactionRequest,
    TxHash, WalletSigner,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

pub fn metadata() -> LocalBackendMetadata {
    LocalBackendMetadata {
        acl_address: "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D".parse().unwrap(),
        input_verifier_address: "0x901F8942346f7AB3a01F6D7613119Bca447Bb030".parse().unwrap(),
        kms_verifier_address: "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC".parse().unwrap(),
    }
}

pub fn contract_x() -> Address {
    "0xABC0000000000000000000000000000000000001".parse().unwrap()
}

pub fn contract_y() -> Address {
    "0xABC0000000000000000000000000000000000002".parse().unwrap()
}

// ============================================================================
// JSON-RPC connection
// ============================================================================

/// Answers `eth_chainId` and nothing else.
pub struct ChainRpc(pub u64);

#[async_trait]
impl JsonRpc for ChainRpc {
    async fn request(&self, method: &str, _params: Value) -> Result<Value> {
        match method {
            "eth_chainId" => Ok(json!(format!("0x{:x}", self.0))),
            other => Err(Error::Rpc {
                code: -32601,
                message: format!("method {} not supported", other),
            }),
        }
    }
}

// ============================================================================
// Local node and backend probe
// ============================================================================

/// The local node's ciphertext store, shared by every session it serves.
pub struct MockNode {
    store: LocalBackend,
    pub calls: Mutex<Vec<String>>,
}

impl MockNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: LocalBackend::new(LOCAL_CHAIN_ID, metadata()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn method_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == method).count()
    }
}

#[async_trait]
impl JsonRpc for MockNode {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.calls.lock().push(method.to_string());
        self.store.serve(method, &params)
    }
}

pub struct MockProbe {
    answer: Option<LocalBackendMetadata>,
    pub node: Arc<MockNode>,
    pub calls: AtomicUsize,
}

impl MockProbe {
    pub fn reachable() -> Arc<Self> {
        Arc::new(Self {
            answer: Some(metadata()),
            node: MockNode::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            node: MockNode::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendProbe for MockProbe {
    async fn fetch_metadata(&self, _endpoint: &str) -> Result<LocalBackendMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .ok_or_else(|| Error::NetworkUnavailable("connection refused".into()))
    }

    fn connect(&self, _endpoint: &str) -> Arc<dyn JsonRpc> {
        self.node.clone()
    }
}

// ============================================================================
// Relayer client library
// ============================================================================

/// What the mock library does at each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkBehavior {
    Works,
    LoadFails,
    InitFails,
    /// `load` waits until cancelled or released.
    LoadHangs,
}

pub struct MockRelayer {
    behavior: SdkBehavior,
    pub loads: AtomicUsize,
    pub inits: Arc<AtomicUsize>,
    pub instances: Arc<AtomicUsize>,
    pub release: Notify,
    pub load_started: Notify,
}

impl MockRelayer {
    pub fn new(behavior: SdkBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            loads: AtomicUsize::new(0),
            inits: Arc::new(AtomicUsize::new(0)),
            instances: Arc::new(AtomicUsize::new(0)),
            release: Notify::new(),
            load_started: Notify::new(),
        })
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

struct MockSdk {
    behavior: SdkBehavior,
    inits: Arc<AtomicUsize>,
    instances: Arc<AtomicUsize>,
}

#[async_trait]
impl RelayerSdkLoader for MockRelayer {
    async fn load(&self) -> Result<Arc<dyn RelayerSdk>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            SdkBehavior::LoadFails => Err(Error::BackendLoadFailure(
                "Failed to load Relayer SDK: network error".into(),
            )),
            SdkBehavior::LoadHangs => {
                self.load_started.notify_one();
                self.release.notified().await;
                Err(Error::BackendLoadFailure("released".into()))
            }
            _ => Ok(Arc::new(MockSdk {
                behavior: self.behavior,
                inits: self.inits.clone(),
                instances: self.instances.clone(),
            })),
        }
    }
}

#[async_trait]
impl RelayerSdk for MockSdk {
    async fn initialize(&self) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            SdkBehavior::InitFails => Err(Error::BackendInitFailure("initSDK threw".into())),
            _ => Ok(()),
        }
    }

    async fn create_instance(
        &self,
        config: &RelayerConfig,
        _network: Arc<dyn JsonRpc>,
    ) -> Result<Arc<dyn EncryptionBackend>> {
        self.instances.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LocalBackend::new(config.chain_id, metadata())))
    }
}

// ============================================================================
// In-memory ledger hosting the TimeMaze contract
// ============================================================================

#[derive(Default)]
struct ChainState {
    block: u64,
    nonce: u64,
    logs: Vec<LogEntry>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    minted: Vec<(Address, String)>,
    waited_confirmations: Vec<u64>,
    get_logs_calls: usize,
}

/// Executes TimeMaze calls: `submitResult` checks the input proof against
/// the local backend metadata and emits `ResultSubmitted`; anything that
/// fails validation produces a reverted receipt.
pub struct MemoryLedger {
    chain_id: u64,
    contracts: Vec<Address>,
    metadata: LocalBackendMetadata,
    state: Mutex<ChainState>,
}

impl MemoryLedger {
    pub fn new(chain_id: u64, contracts: Vec<Address>) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            contracts,
            metadata: metadata(),
            state: Mutex::new(ChainState::default()),
        })
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.state.lock().logs.clone()
    }

    pub fn minted(&self) -> Vec<(Address, String)> {
        self.state.lock().minted.clone()
    }

    pub fn waited_confirmations(&self) -> Vec<u64> {
        self.state.lock().waited_confirmations.clone()
    }

    pub fn get_logs_calls(&self) -> usize {
        self.state.lock().get_logs_calls
    }

    /// Insert a log directly, e.g. from another player.
    pub fn push_log(&self, log: LogEntry) {
        let mut state = self.state.lock();
        state.block = state.block.max(log.block_number);
        state.logs.push(log);
    }

    fn execute(&self, from: Address, tx: &TransactionRequest, block: u64, hash: TxHash) -> Option<Vec<LogEntry>> {
        if !self.contracts.contains(&tx.to) {
            return None;
        }
        if let Ok((handle, proof)) = decode_submit_result(&tx.data) {
            if !verify_input_proof(&self.metadata, self.chain_id, &handle, &proof, tx.to, from) {
                return None;
            }
            let event = ResultSubmitted {
                player: from,
                input_handle: handle,
                timestamp: GENESIS_TIMESTAMP + block,
            };
            return Some(vec![LogEntry {
                address: tx.to,
                topics: event.topics(),
                data: event.encode_data(),
                block_number: block,
                log_index: 0,
                transaction_hash: hash,
            }]);
        }
        if let Ok(uri) = decode_mint_proof(&tx.data) {
            self.state.lock().minted.push((from, uri));
            return Some(Vec::new());
        }
        None
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let mut state = self.state.lock();
        state.get_logs_calls += 1;
        Ok(state.logs.iter().filter(|log| filter.matches(log)).cloned().collect())
    }

    async fn send_transaction(&self, from: Address, tx: &TransactionRequest) -> Result<TxHash> {
        let (block, hash) = {
            let mut state = self.state.lock();
            state.block += 1;
            state.nonce += 1;
            let mut seed = from.as_bytes().to_vec();
            seed.extend_from_slice(&state.nonce.to_be_bytes());
            (state.block, TxHash(keccak256(&seed)))
        };

        let outcome = self.execute(from, tx, block, hash);
        let mut state = self.state.lock();
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            block_number: block,
            success: outcome.is_some(),
            logs: outcome.clone().unwrap_or_default(),
        };
        if let Some(logs) = outcome {
            state.logs.extend(logs);
        }
        state.receipts.insert(hash, receipt);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash, confirmations: u64) -> Result<TransactionReceipt> {
        let mut state = self.state.lock();
        state.waited_confirmations.push(confirmations);
        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| Error::InvalidResponse(format!("unknown transaction {}", tx_hash)))
    }
}

// ============================================================================
// Wallets
// ============================================================================

/// Local wallet that remembers every statement it signed.
pub struct RecordingWallet {
    inner: LocalWallet,
    pub signed: Mutex<Vec<TypedData>>,
}

impl RecordingWallet {
    pub fn new(ledger: Arc<dyn Ledger>) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalWallet::random(ledger),
            signed: Mutex::new(Vec::new()),
        })
    }

    pub fn signature_count(&self) -> usize {
        self.signed.lock().len()
    }

    pub fn signed_public_keys(&self) -> Vec<String> {
        self.signed
            .lock()
            .iter()
            .map(|data| data.message["publicKey"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl WalletSigner for RecordingWallet {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature> {
        self.signed.lock().push(data.clone());
        self.inner.sign_typed_data(data).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        self.inner.send_transaction(tx).await
    }
}

/// A wallet whose user rejects every prompt.
pub struct DecliningWallet(pub Address);

#[async_trait]
impl WalletSigner for DecliningWallet {
    fn address(&self) -> Address {
        self.0
    }

    async fn sign_typed_data(&self, _data: &TypedData) -> Result<Signature> {
        Err(Error::SignerDeclined("User rejected the request.".into()))
    }

    async fn send_transaction(&self, _tx: TransactionRequest) -> Result<TxHash> {
        Err(Error::SignerDeclined("User rejected the request.".into()))
    }
}

// ============================================================================
// Environments
// ============================================================================

pub fn provisioner(probe: Arc<MockProbe>, relayer: Arc<MockRelayer>) -> SessionProvisioner {
    SessionProvisioner::new(&ClientConfig::default(), probe, relayer)
}

/// A ready local session plus a ledger hosting contracts X and Y.
pub struct LocalEnv {
    pub ledger: Arc<MemoryLedger>,
    pub session: Session,
    pub wallet: Arc<RecordingWallet>,
}

pub async fn local_env() -> LocalEnv {
    local_env_with(MockProbe::reachable()).await
}

/// A ready local session provisioned against `probe` and its node.
pub async fn local_env_with(probe: Arc<MockProbe>) -> LocalEnv {
    let ledger = MemoryLedger::new(LOCAL_CHAIN_ID, vec![contract_x(), contract_y()]);
    let session = local_session(probe).await;
    let wallet = RecordingWallet::new(ledger.clone());
    LocalEnv {
        ledger,
        session,
        wallet,
    }
}

/// Provision a fresh local session against `probe`.
pub async fn local_session(probe: Arc<MockProbe>) -> Session {
    provisioner(probe, MockRelayer::new(SdkBehavior::LoadFails))
        .provision(Arc::new(ChainRpc(LOCAL_CHAIN_ID)), &CancellationToken::new())
        .await
        .unwrap()
}
