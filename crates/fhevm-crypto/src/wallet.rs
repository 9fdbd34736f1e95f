//! secp256k1 wallet primitives: Keccak-256, EVM address derivation, and
//! recoverable signatures over 32-byte digests.
//!
//! Signatures use the 65-byte `r || s || v` layout wallets produce, with
//! `v` in `{27, 28}`. Recovery also accepts raw `{0, 1}` recovery ids.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::CryptoError;
use crate::types::Address;

/// Length of a recoverable wallet signature (`r || s || v`).
pub const SIGNATURE_LENGTH: usize = 65;

/// Compute Keccak-256.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive the EVM address of a secp256k1 public key.
///
/// Address = last 20 bytes of `keccak256(uncompressed_point[1..])`.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}

/// Sign a 32-byte digest, producing a 65-byte recoverable signature.
pub fn sign_digest(key: &SigningKey, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_LENGTH], CryptoError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte() + 27;
    Ok(out)
}

/// Recover the signer's address from a digest and a 65-byte signature.
pub fn recover_address(digest: &[u8; 32], signature: &[u8]) -> Result<Address, CryptoError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidLength {
            what: "signature",
            expected: SIGNATURE_LENGTH,
            got: signature.len(),
        });
    }

    let v = signature[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| CryptoError::RecoveryFailed(format!("invalid recovery id {}", v)))?;

    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::RecoveryFailed(format!("invalid signature: {}", e)))?;

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;

    Ok(address_from_verifying_key(&key))
}

/// Generate a new random wallet key.
pub fn generate_wallet_key() -> SigningKey {
    SigningKey::random(&mut k256::elliptic_curve::rand_core::OsRng)
}

/// Import a wallet key from a 32-byte hex scalar (`0x` optional).
pub fn wallet_key_from_hex(s: &str) -> Result<SigningKey, CryptoError> {
    let mut bytes = crate::types::decode_hex(s)?;
    let key = SigningKey::from_slice(&bytes)
        .map_err(|e| CryptoError::SigningFailed(format!("invalid secp256k1 scalar: {}", e)));
    zeroize::Zeroize::zeroize(&mut bytes);
    key
}
