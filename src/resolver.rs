//! Decides which backend variant applies to the connected network.

use std::sync::Arc;

use async_trait::async_trait;
use fhevm_discovery::{
    metadata_request_body, parse_chain_id, parse_metadata_response, LocalBackendMetadata,
    LocalChains,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::rpc::{http_client, HttpJsonRpc, JsonRpc, DEFAULT_HTTP_TIMEOUT};

/// Asks a local node endpoint for its backend metadata.
#[async_trait]
pub trait BackendProbe: Send + Sync {
    async fn fetch_metadata(&self, endpoint: &str) -> Result<LocalBackendMetadata>;

    /// JSON-RPC connection to `endpoint` for the local backend to use.
    fn connect(&self, endpoint: &str) -> Arc<dyn JsonRpc>;
}

/// Probes over HTTP with a single JSON-RPC POST.
pub struct HttpBackendProbe {
    client: reqwest::Client,
}

impl HttpBackendProbe {
    /// Probe with [`DEFAULT_HTTP_TIMEOUT`], so an endpoint that accepts but
    /// never answers falls back to the remote backend instead of hanging.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(http_client(DEFAULT_HTTP_TIMEOUT)?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendProbe for HttpBackendProbe {
    async fn fetch_metadata(&self, endpoint: &str) -> Result<LocalBackendMetadata> {
        let response = self
            .client
            .post(endpoint)
            .json(&metadata_request_body())
            .send()
            .await
            .map_err(|e| Error::NetworkUnavailable(format!("{}: {}", endpoint, e)))?;
        if !response.status().is_success() {
            return Err(Error::NetworkUnavailable(format!(
                "{} answered HTTP {}",
                endpoint,
                response.status()
            )));
        }
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(format!("{}: {}", endpoint, e)))?;
        Ok(parse_metadata_response(&envelope)?)
    }

    fn connect(&self, endpoint: &str) -> Arc<dyn JsonRpc> {
        Arc::new(HttpJsonRpc::with_client(self.client.clone(), endpoint))
    }
}

/// Outcome of network resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub network_id: u64,
    pub is_local_backend: bool,
    /// Mapped local endpoint, present whenever the network is in the
    /// local mapping, even if the probe failed.
    pub backend_endpoint: Option<String>,
    pub metadata: Option<LocalBackendMetadata>,
}

pub struct NetworkResolver {
    local_chains: LocalChains,
    probe: Arc<dyn BackendProbe>,
}

impl NetworkResolver {
    pub fn new(local_chains: LocalChains, probe: Arc<dyn BackendProbe>) -> Self {
        Self {
            local_chains,
            probe,
        }
    }

    pub fn local_chains(&self) -> &LocalChains {
        &self.local_chains
    }

    /// Connect to a local endpoint through the probe's transport.
    pub fn connect(&self, endpoint: &str) -> Arc<dyn JsonRpc> {
        self.probe.connect(endpoint)
    }

    pub async fn resolve(&self, rpc: &dyn JsonRpc) -> Result<Resolution> {
        let network_id = fetch_chain_id(rpc).await?;

        let Some(endpoint) = self.local_chains.endpoint_for(network_id) else {
            debug!(network_id, "network is not a local test network");
            return Ok(Resolution {
                network_id,
                is_local_backend: false,
                backend_endpoint: None,
                metadata: None,
            });
        };

        // Best effort: any failure means "use the remote backend".
        let metadata = match self.probe.fetch_metadata(endpoint).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                debug!(network_id, endpoint, error = %e, "local backend probe failed");
                None
            }
        };
        debug!(network_id, endpoint, local = metadata.is_some(), "resolved network");

        Ok(Resolution {
            network_id,
            is_local_backend: metadata.is_some(),
            backend_endpoint: Some(endpoint.to_string()),
            metadata,
        })
    }
}

/// `eth_chainId` on `rpc`. Any failure means the network is unavailable.
pub async fn fetch_chain_id(rpc: &dyn JsonRpc) -> Result<u64> {
    let raw = rpc
        .request("eth_chainId", json!([]))
        .await
        .map_err(|e| match e {
            Error::NetworkUnavailable(_) => e,
            other => Error::NetworkUnavailable(format!("eth_chainId failed: {}", other)),
        })?;
    parse_chain_id(&raw).map_err(|e| Error::NetworkUnavailable(e.to_string()))
}
