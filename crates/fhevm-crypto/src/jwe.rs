//! Compact JWE with ECDH-ES+A256KW / A256GCM over P-256.
//!
//! Used to re-encrypt decrypted values to a caller's ephemeral public key so
//! that plaintexts never cross the backend boundary in the clear.
//!
//! Key agreement uses Concat KDF (NIST SP 800-56A §5.8.1) to derive a 256-bit
//! KEK from the ECDH shared secret, then AES-KW wraps the CEK.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use aes_kw::{Kek, KekAes256};
use base64ct::{Base64UrlUnpadded, Encoding};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::CryptoError;

const ALG: &str = "ECDH-ES+A256KW";
const ENC: &str = "A256GCM";
const CEK_LENGTH: usize = 32;
/// AES-KW output for a 32-byte key: 32 + 8.
const WRAPPED_CEK_LENGTH: usize = 40;
const TAG_LENGTH: usize = 16;

fn b64(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

fn unb64(part: &str) -> Result<Vec<u8>, CryptoError> {
    Base64UrlUnpadded::decode_vec(part).map_err(|e| CryptoError::JweFormat(e.to_string()))
}

/// Encrypt `plaintext` to `recipient`, returning a compact JWE.
pub fn encrypt_jwe(plaintext: &[u8], recipient: &PublicKey) -> Result<String, CryptoError> {
    let sender_secret = EphemeralSecret::random(&mut p256::elliptic_curve::rand_core::OsRng);
    let sender_point = PublicKey::from(&sender_secret).to_encoded_point(false);
    let shared = sender_secret.diffie_hellman(recipient);

    let mut kek_bytes = concat_kdf(shared.raw_secret_bytes().as_slice(), ALG, 256);
    let kek = kek_from(&kek_bytes, CryptoError::JweEncryptionFailed)?;
    kek_bytes.zeroize();

    let mut cek = [0u8; CEK_LENGTH];
    getrandom::getrandom(&mut cek).map_err(|e| CryptoError::RngFailed(e.to_string()))?;

    let mut wrapped_cek = [0u8; WRAPPED_CEK_LENGTH];
    kek.wrap(&cek, &mut wrapped_cek)
        .map_err(|e| CryptoError::JweEncryptionFailed(format!("AES-KW wrap: {:?}", e)))?;

    let (x, y) = match (sender_point.x(), sender_point.y()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(CryptoError::JweEncryptionFailed(
                "ephemeral point is not uncompressed".to_string(),
            ))
        }
    };
    // serde_json orders object keys, so the header bytes are stable.
    let header = serde_json::json!({
        "alg": ALG,
        "enc": ENC,
        "epk": {
            "kty": "EC",
            "crv": "P-256",
            "x": b64(x.as_slice()),
            "y": b64(y.as_slice()),
        }
    });
    let header_b64 = b64(&serde_json::to_vec(&header)?);

    let mut iv = [0u8; 12];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|e| CryptoError::JweEncryptionFailed(format!("AES-GCM init: {:?}", e)))?;
    cek.zeroize();

    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            aes_gcm::aead::Payload {
                msg: plaintext,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::JweEncryptionFailed(format!("AES-GCM encrypt: {:?}", e)))?;

    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);
    Ok(format!(
        "{}.{}.{}.{}.{}",
        header_b64,
        b64(&wrapped_cek),
        b64(&iv),
        b64(ciphertext),
        b64(tag)
    ))
}

/// Decrypt a compact JWE addressed to `recipient`.
pub fn decrypt_jwe(jwe: &str, recipient: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let parts: Vec<&str> = jwe.split('.').collect();
    if parts.len() != 5 {
        return Err(CryptoError::JweFormat(format!(
            "expected 5 parts, got {}",
            parts.len()
        )));
    }
    let header_b64 = parts[0];

    let header: serde_json::Value = serde_json::from_slice(&unb64(header_b64)?)
        .map_err(|e| CryptoError::JweFormat(e.to_string()))?;
    let alg = header["alg"].as_str().unwrap_or_default();
    let enc = header["enc"].as_str().unwrap_or_default();
    if alg != ALG {
        return Err(CryptoError::JweUnsupportedAlgorithm(format!("alg: {}", alg)));
    }
    if enc != ENC {
        return Err(CryptoError::JweUnsupportedAlgorithm(format!("enc: {}", enc)));
    }

    let sender = import_epk(&header["epk"])?;
    let shared = p256::ecdh::diffie_hellman(recipient.to_nonzero_scalar(), sender.as_affine());

    let mut kek_bytes = concat_kdf(shared.raw_secret_bytes().as_slice(), ALG, 256);
    let kek = kek_from(&kek_bytes, CryptoError::JweDecryptionFailed)?;
    kek_bytes.zeroize();

    let mut cek = [0u8; CEK_LENGTH];
    kek.unwrap(&unb64(parts[1])?, &mut cek)
        .map_err(|e| CryptoError::JweDecryptionFailed(format!("AES-KW unwrap: {:?}", e)))?;

    let iv = unb64(parts[2])?;
    if iv.len() != 12 {
        return Err(CryptoError::JweFormat(format!("IV must be 12 bytes, got {}", iv.len())));
    }
    let mut sealed = unb64(parts[3])?;
    sealed.extend_from_slice(&unb64(parts[4])?);

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|e| CryptoError::JweDecryptionFailed(format!("AES-GCM init: {:?}", e)))?;
    cek.zeroize();

    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            aes_gcm::aead::Payload {
                msg: &sealed,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::JweDecryptionFailed(format!("AES-GCM decrypt: {:?}", e)))
}

fn kek_from(bytes: &[u8], err: fn(String) -> CryptoError) -> Result<KekAes256, CryptoError> {
    let arr = <[u8; 32]>::try_from(bytes).map_err(|_| err("KEK is not 32 bytes".to_string()))?;
    Ok(Kek::from(arr))
}

/// Concat KDF, single pass (key data length <= 256 bits):
/// `SHA-256(00000001 || Z || algID || partyUInfo || partyVInfo || suppPubInfo)`
/// with empty party info.
fn concat_kdf(z: &[u8], alg: &str, key_data_len_bits: u32) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(z);
    hasher.update((alg.len() as u32).to_be_bytes());
    hasher.update(alg.as_bytes());
    hasher.update(0u32.to_be_bytes());
    hasher.update(0u32.to_be_bytes());
    hasher.update(key_data_len_bits.to_be_bytes());
    hasher.finalize().to_vec()
}

fn import_epk(jwk: &serde_json::Value) -> Result<PublicKey, CryptoError> {
    let coordinate = |name: &str| -> Result<Vec<u8>, CryptoError> {
        let raw = jwk[name]
            .as_str()
            .ok_or_else(|| CryptoError::JweFormat(format!("epk missing {}", name)))?;
        let bytes = unb64(raw)?;
        if bytes.len() > 32 {
            return Err(CryptoError::JweFormat(format!("epk {} too long", name)));
        }
        // JWKs may omit leading zeros.
        let mut padded = vec![0u8; 32 - bytes.len()];
        padded.extend_from_slice(&bytes);
        Ok(padded)
    };

    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&coordinate("x")?);
    sec1.extend_from_slice(&coordinate("y")?);

    PublicKey::from_sec1_bytes(&sec1).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}
