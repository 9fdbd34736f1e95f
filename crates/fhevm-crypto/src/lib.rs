//! Cryptographic primitives for the fhEVM client session layer.
//!
//! - Keccak-256 and EVM address derivation
//! - EIP-712 typed-data hashing
//! - secp256k1 recoverable wallet signatures
//! - Ephemeral P-256 key pairs and ECDH-ES+A256KW JWE re-encryption
//!
//! Homomorphic-encryption math is not implemented here; ciphertexts are
//! opaque to this crate.

pub mod eip712;
pub mod ephemeral;
pub mod error;
pub mod jwe;
pub mod types;
pub mod wallet;

pub use eip712::{Eip712Domain, TypedData, TypedField};
pub use ephemeral::{seal_to_public_key, EphemeralKeypair, EPHEMERAL_PUBLIC_KEY_LENGTH};
pub use error::CryptoError;
pub use jwe::{decrypt_jwe, encrypt_jwe};
pub use types::{decode_hex, encode_hex, Address, ADDRESS_LENGTH};
pub use wallet::{
    address_from_verifying_key, generate_wallet_key, keccak256, recover_address, sign_digest,
    wallet_key_from_hex, SIGNATURE_LENGTH,
};
