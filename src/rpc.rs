//! JSON-RPC connection to a ledger node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// A live JSON-RPC connection (browser provider, node endpoint, ...).
#[async_trait]
pub trait JsonRpc: Send + Sync {
    /// Issue `method` with positional `params` and return the `result`.
    ///
    /// JSON-RPC error objects surface as `Error::Rpc` (or `SignerDeclined`
    /// for code 4001); transport failures as `NetworkUnavailable`.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

/// Upper bound on any single HTTP exchange with a node or relayer.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client whose requests fail with a timeout after `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

/// Unwrap a JSON-RPC 2.0 response envelope.
pub fn unwrap_response(envelope: Value) -> Result<Value> {
    let mut obj = match envelope {
        Value::Object(obj) => obj,
        other => {
            return Err(Error::InvalidResponse(format!(
                "expected JSON-RPC object, got {}",
                other
            )))
        }
    };

    if let Some(err) = obj.remove("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        return Err(Error::from_rpc(code, message));
    }

    obj.remove("result")
        .ok_or_else(|| Error::InvalidResponse("JSON-RPC response has no result".to_string()))
}

/// JSON-RPC over HTTP POST.
pub struct HttpJsonRpc {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpJsonRpc {
    /// Connect with [`DEFAULT_HTTP_TIMEOUT`] on every request.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(http_client(DEFAULT_HTTP_TIMEOUT)?, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl JsonRpc for HttpJsonRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(url = %self.url, method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::NetworkUnavailable(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::NetworkUnavailable(format!(
                "{} answered HTTP {}",
                self.url, status
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(format!("{}: {}", self.url, e)))?;
        unwrap_response(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_result() {
        let value = unwrap_response(json!({"jsonrpc": "2.0", "id": 1, "result": "0x7a69"})).unwrap();
        assert_eq!(value, json!("0x7a69"));
    }

    #[test]
    fn null_result_is_a_value() {
        let value = unwrap_response(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn error_object_maps_to_rpc_error() {
        let err = unwrap_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Rpc { code: -32601, .. }));
    }

    #[test]
    fn user_rejection_maps_to_declined() {
        let err = unwrap_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 4001, "message": "User rejected the request."}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::SignerDeclined(_)));
    }

    #[test]
    fn rejects_non_object_and_missing_result() {
        assert!(matches!(
            unwrap_response(json!([1, 2])).unwrap_err(),
            Error::InvalidResponse(_)
        ));
        assert!(matches!(
            unwrap_response(json!({"jsonrpc": "2.0", "id": 1})).unwrap_err(),
            Error::InvalidResponse(_)
        ));
    }

    #[test]
    fn http_client_keeps_url() {
        let rpc = HttpJsonRpc::new("http://localhost:8545").unwrap();
        assert_eq!(rpc.url(), "http://localhost:8545");
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        // Accepts the connection but never replies.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let _hold = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let rpc = HttpJsonRpc::with_client(http_client(Duration::from_millis(100)).unwrap(), url);
        let started = std::time::Instant::now();
        let err = rpc.request("eth_chainId", json!([])).await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
