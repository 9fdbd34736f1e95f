//! Discovery types and validation for fhEVM encryption backends.
//!
//! This crate decides whether a chain id belongs to a local test network
//! and validates the metadata document a local node returns from the
//! `fhevm_relayer_metadata` JSON-RPC method.
//!
//! HTTP is handled by the caller. This crate only builds and parses JSON.

mod chains;
mod error;
mod metadata;
mod types;

pub use chains::{parse_chain_id, LocalChains};
pub use error::DiscoveryError;
pub use metadata::{metadata_request_body, parse_metadata_response, validate_local_metadata};
pub use types::LocalBackendMetadata;

/// Chain id of the default local development node (Hardhat).
pub const DEFAULT_LOCAL_CHAIN_ID: u64 = 31337;

/// JSON-RPC endpoint of the default local development node.
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:8545";

/// JSON-RPC method a local node answers with its backend metadata.
pub const RELAYER_METADATA_METHOD: &str = "fhevm_relayer_metadata";
