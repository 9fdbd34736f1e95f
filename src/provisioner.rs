//! Drives provisioning from `idle` to a ready session.
//!
//! ```text
//! idle -> resolving-network -> creating-session -> ready              (local)
//! idle -> resolving-network -> backend-loading -> backend-initializing
//!      -> creating-session -> ready                                   (remote)
//! any non-terminal status -> error
//! ```
//!
//! Only one attempt may run at a time; a second call while one is in
//! flight fails with `ProvisioningInProgress` and leaves the first alone.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{EncryptionBackend, LocalBackend, RelayerSdkLoader};
use crate::config::{ClientConfig, RelayerConfig};
use crate::error::{Error, Result};
use crate::resolver::{BackendProbe, NetworkResolver};
use crate::rpc::JsonRpc;
use crate::session::Session;
use crate::status::{SessionStatus, StatusCallback, StatusTracker};

pub struct SessionProvisioner {
    resolver: NetworkResolver,
    loader: Arc<dyn RelayerSdkLoader>,
    relayer: RelayerConfig,
    tracker: Mutex<StatusTracker>,
    observers: Mutex<Vec<StatusCallback>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the attempt ends, including when the
/// provisioning future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionProvisioner {
    pub fn new(
        config: &ClientConfig,
        probe: Arc<dyn BackendProbe>,
        loader: Arc<dyn RelayerSdkLoader>,
    ) -> Self {
        Self {
            resolver: NetworkResolver::new(config.local_chains.clone(), probe),
            loader,
            relayer: config.relayer.clone(),
            tracker: Mutex::new(StatusTracker::new()),
            observers: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Register an observer. Observers are informational only.
    pub fn on_status_change(&self, callback: StatusCallback) {
        self.observers.lock().push(callback);
    }

    pub fn status(&self) -> SessionStatus {
        self.tracker.lock().current()
    }

    /// Statuses of the latest attempt, starting with `idle`.
    pub fn history(&self) -> Vec<SessionStatus> {
        self.tracker.lock().history().to_vec()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one provisioning attempt against `rpc`.
    ///
    /// Step failures come back as `Error::Provisioning` naming the step;
    /// cancellation comes back as `Error::Cancelled`. Either way the
    /// status ends in `error`. Nothing is retried.
    pub async fn provision(
        &self,
        rpc: Arc<dyn JsonRpc>,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("provisioning already in flight, rejecting request");
            return Err(Error::ProvisioningInProgress);
        }
        let _guard = InFlightGuard(&self.in_flight);
        self.tracker.lock().reset();

        match self.run(rpc, cancel).await {
            Ok(session) => {
                info!(
                    network_id = session.network_id(),
                    backend = ?session.backend_kind(),
                    "session ready"
                );
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "provisioning failed");
                self.transition(SessionStatus::Error);
                Err(e)
            }
        }
    }

    async fn run(&self, rpc: Arc<dyn JsonRpc>, cancel: &CancellationToken) -> Result<Session> {
        self.checkpoint(cancel, SessionStatus::ResolvingNetwork)?;
        let resolution = step(
            SessionStatus::ResolvingNetwork,
            cancellable(cancel, self.resolver.resolve(rpc.as_ref())).await,
        )?;

        let backend: Arc<dyn EncryptionBackend> = match resolution.metadata {
            Some(metadata) if resolution.is_local_backend => {
                self.checkpoint(cancel, SessionStatus::CreatingSession)?;
                match resolution.backend_endpoint.as_deref() {
                    Some(endpoint) => {
                        debug!(network_id = resolution.network_id, endpoint, "building local backend");
                        Arc::new(LocalBackend::connected(
                            resolution.network_id,
                            metadata,
                            self.resolver.connect(endpoint),
                        ))
                    }
                    None => Arc::new(LocalBackend::new(resolution.network_id, metadata)),
                }
            }
            _ => {
                self.checkpoint(cancel, SessionStatus::BackendLoading)?;
                debug!(
                    network_id = resolution.network_id,
                    relayer = %self.relayer.relayer_url,
                    "loading relayer client"
                );
                let sdk = cancellable(cancel, self.loader.load())
                    .await
                    .map_err(|e| match e {
                        Error::Cancelled | Error::BackendLoadFailure(_) => e,
                        other => Error::BackendLoadFailure(other.to_string()),
                    });
                let sdk = step(SessionStatus::BackendLoading, sdk)?;

                self.checkpoint(cancel, SessionStatus::BackendInitializing)?;
                let init = cancellable(cancel, sdk.initialize())
                    .await
                    .map_err(|e| match e {
                        Error::Cancelled | Error::BackendInitFailure(_) => e,
                        other => Error::BackendInitFailure(other.to_string()),
                    });
                step(SessionStatus::BackendInitializing, init)?;

                self.checkpoint(cancel, SessionStatus::CreatingSession)?;
                step(
                    SessionStatus::CreatingSession,
                    cancellable(cancel, sdk.create_instance(&self.relayer, rpc.clone())).await,
                )?
            }
        };

        self.checkpoint(cancel, SessionStatus::Ready)?;
        Ok(Session::new(backend, resolution.network_id))
    }

    /// Check cancellation at a transition boundary, then move to `next`.
    fn checkpoint(&self, cancel: &CancellationToken, next: SessionStatus) -> Result<()> {
        if cancel.is_cancelled() {
            debug!(next = %next, "provisioning cancelled");
            return Err(Error::Cancelled);
        }
        self.transition(next);
        Ok(())
    }

    fn transition(&self, next: SessionStatus) {
        let applied = self.tracker.lock().advance(next);
        if !applied {
            debug!(next = %next, "ignoring out-of-order status");
            return;
        }
        debug!(status = %next, "provisioning status");
        // Clone so an observer can register another without deadlocking.
        let observers: Vec<StatusCallback> = self.observers.lock().clone();
        for observer in observers {
            observer(next);
        }
    }
}

/// Wrap a step failure with the status it happened in. Cancellation is
/// passed through unwrapped.
fn step<T>(status: SessionStatus, result: Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        Error::Cancelled => Error::Cancelled,
        source => Error::Provisioning {
            step: status,
            source: Box::new(source),
        },
    })
}

/// Resolve `fut`, or `Cancelled` as soon as `cancel` fires.
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
