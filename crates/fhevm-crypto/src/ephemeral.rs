//! Per-call ephemeral P-256 key pairs for decryption authorization.

use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};

use crate::error::CryptoError;
use crate::jwe::{decrypt_jwe, encrypt_jwe};
use crate::types::encode_hex;

/// SEC1 uncompressed point length (`0x04 || x || y`).
pub const EPHEMERAL_PUBLIC_KEY_LENGTH: usize = 65;

/// A key pair that lives for exactly one authorization exchange.
///
/// The private half never leaves this struct and is zeroized when the
/// value is dropped (`SecretKey` is `ZeroizeOnDrop`).
pub struct EphemeralKeypair {
    secret: SecretKey,
    public: [u8; EPHEMERAL_PUBLIC_KEY_LENGTH],
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut p256::elliptic_curve::rand_core::OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let mut public = [0u8; EPHEMERAL_PUBLIC_KEY_LENGTH];
        public.copy_from_slice(point.as_bytes());
        Self { secret, public }
    }

    /// SEC1 uncompressed public key bytes.
    pub fn public_key(&self) -> &[u8; EPHEMERAL_PUBLIC_KEY_LENGTH] {
        &self.public
    }

    pub fn public_key_hex(&self) -> String {
        encode_hex(&self.public)
    }

    /// Open a value that was re-encrypted to this key pair.
    pub fn open(&self, jwe: &str) -> Result<Vec<u8>, CryptoError> {
        decrypt_jwe(jwe, &self.secret)
    }
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Re-encrypt `plaintext` to an ephemeral public key given as SEC1 bytes.
pub fn seal_to_public_key(plaintext: &[u8], public_key: &[u8]) -> Result<String, CryptoError> {
    let recipient = PublicKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    encrypt_jwe(plaintext, &recipient)
}
