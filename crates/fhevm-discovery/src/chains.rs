use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DiscoveryError;
use crate::{DEFAULT_LOCAL_CHAIN_ID, DEFAULT_LOCAL_ENDPOINT};

/// Static mapping of chain id to the JSON-RPC endpoint of a local node.
///
/// Only chains listed here are ever probed for a local backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LocalChains(BTreeMap<u64, String>);

impl LocalChains {
    pub fn new(map: BTreeMap<u64, String>) -> Self {
        Self(map)
    }

    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, chain_id: u64, endpoint: impl Into<String>) {
        self.0.insert(chain_id, endpoint.into());
    }

    pub fn endpoint_for(&self, chain_id: u64) -> Option<&str> {
        self.0.get(&chain_id).map(String::as_str)
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.0.contains_key(&chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.0.iter().map(|(id, url)| (*id, url.as_str()))
    }

    /// Every endpoint must be an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        for (chain_id, endpoint) in self.iter() {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(DiscoveryError::InvalidEndpoint {
                    chain_id,
                    reason: format!("not an http(s) URL: {:?}", endpoint),
                });
            }
        }
        Ok(())
    }
}

impl Default for LocalChains {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(DEFAULT_LOCAL_CHAIN_ID, DEFAULT_LOCAL_ENDPOINT.to_string());
        Self(map)
    }
}

/// Parse an `eth_chainId` result. Nodes answer with a hex quantity, but
/// some providers return a plain number.
pub fn parse_chain_id(value: &Value) -> Result<u64, DiscoveryError> {
    match value {
        Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .ok_or_else(|| DiscoveryError::InvalidChainId(s.clone()))?;
            u64::from_str_radix(digits, 16).map_err(|_| DiscoveryError::InvalidChainId(s.clone()))
        }
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| DiscoveryError::InvalidChainId(n.to_string())),
        other => Err(DiscoveryError::InvalidChainId(other.to_string())),
    }
}
