//! Ready sessions and the slot that owns the single live one.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fhevm_crypto::Address;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::{BackendKind, EncryptionBackend};
use crate::encoder::InputEncoder;
use crate::error::{Error, Result};
use crate::provisioner::SessionProvisioner;
use crate::resolver::fetch_chain_id;
use crate::rpc::JsonRpc;
use crate::status::SessionStatus;

/// An initialized backend for one network.
///
/// Clones share liveness: invalidating one invalidates all of them.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn EncryptionBackend>,
    network_id: u64,
    live: Arc<AtomicBool>,
}

impl Session {
    pub fn new(backend: Arc<dyn EncryptionBackend>, network_id: u64) -> Self {
        Self {
            backend,
            network_id,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.live.load(Ordering::Acquire) {
            SessionStatus::Ready
        } else {
            SessionStatus::Idle
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// `InvalidSession` unless ready.
    pub fn ensure_ready(&self) -> Result<()> {
        match self.status() {
            SessionStatus::Ready => Ok(()),
            status => Err(Error::InvalidSession { status }),
        }
    }

    pub fn invalidate(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &Arc<dyn EncryptionBackend> {
        &self.backend
    }

    pub fn encoder(&self) -> InputEncoder {
        InputEncoder::new(self.clone())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("network_id", &self.network_id)
            .field("backend", &self.backend.kind())
            .field("status", &self.status())
            .finish()
    }
}

/// Identity a session was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub network_id: u64,
    pub account: Address,
}

/// Owner of the per-process session.
///
/// A new network or account invalidates the held session; the next
/// `ensure` provisions a replacement.
#[derive(Default)]
pub struct SessionSlot {
    current: Mutex<Option<(SessionKey, Session)>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The held session if it was created for `key` and is still live.
    /// A session held for any other key is invalidated and dropped.
    pub fn get(&self, key: SessionKey) -> Option<Session> {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some((held, session)) if *held == key && session.is_ready() => Some(session.clone()),
            Some((held, session)) => {
                if *held != key {
                    info!(
                        old_network = held.network_id,
                        new_network = key.network_id,
                        "network or account changed, invalidating session"
                    );
                }
                session.invalidate();
                *current = None;
                None
            }
            None => None,
        }
    }

    /// Replace the held session, invalidating the previous one.
    pub fn install(&self, key: SessionKey, session: Session) {
        let mut current = self.current.lock();
        if let Some((_, old)) = current.take() {
            old.invalidate();
        }
        *current = Some((key, session));
    }

    pub fn invalidate(&self) {
        if let Some((_, session)) = self.current.lock().take() {
            session.invalidate();
        }
    }

    pub fn current_key(&self) -> Option<SessionKey> {
        self.current.lock().as_ref().map(|(key, _)| *key)
    }

    /// Return the session for `(network, account)`, provisioning one if the
    /// held session is missing, stale, or for a different identity.
    pub async fn ensure(
        &self,
        provisioner: &SessionProvisioner,
        rpc: Arc<dyn JsonRpc>,
        account: Address,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let network_id = fetch_chain_id(rpc.as_ref()).await?;
        let key = SessionKey {
            network_id,
            account,
        };
        if let Some(session) = self.get(key) {
            return Ok(session);
        }

        let session = provisioner.provision(rpc, cancel).await?;
        let key = SessionKey {
            network_id: session.network_id(),
            account,
        };
        self.install(key, session.clone());
        Ok(session)
    }
}
