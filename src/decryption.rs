//! Time-boxed, wallet-signed decryption of ciphertext handles.
//!
//! Each call generates a fresh ephemeral key pair, has the wallet sign a
//! statement binding that key to the referenced contracts and a validity
//! window, and exchanges the signature for values re-encrypted to the
//! ephemeral key. The key pair is dropped (and zeroized) when the call
//! returns, on every path.

use std::collections::HashMap;

use fhevm_crypto::{Address, EphemeralKeypair, TypedData};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{unix_now, user_decrypt_typed_data, UserDecryptRequest};
use crate::contract::word_to_u64;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{CiphertextHandle, HandleContractPair, Word};
use crate::wallet::WalletSigner;

/// Key material and signed statement for one decryption exchange.
pub struct AuthorizationGrant {
    keypair: EphemeralKeypair,
    pub typed_data: TypedData,
    pub validity_start: u64,
    pub validity_duration_days: u32,
    pub bound_contracts: Vec<Address>,
}

impl AuthorizationGrant {
    pub fn public_key(&self) -> &[u8] {
        self.keypair.public_key()
    }

    fn open(&self, jwe: &str) -> Result<u64> {
        let plaintext = self.keypair.open(jwe)?;
        let word = Word::try_from(plaintext.as_slice()).map_err(|_| {
            Error::InvalidResponse(format!(
                "decrypted value is {} bytes, expected 32",
                plaintext.len()
            ))
        })?;
        word_to_u64(&word)
            .ok_or_else(|| Error::InvalidResponse("decrypted value exceeds 64 bits".to_string()))
    }
}

/// Distinct contract addresses in first-seen order.
pub fn bound_contracts(handles: &[HandleContractPair]) -> Vec<Address> {
    let mut contracts: Vec<Address> = Vec::new();
    for pair in handles {
        if !contracts.contains(&pair.contract_address) {
            contracts.push(pair.contract_address);
        }
    }
    contracts
}

/// `Unauthorized` for the first requested handle missing from `values`.
pub fn require_all(
    requested: &[HandleContractPair],
    values: &HashMap<CiphertextHandle, u64>,
) -> Result<()> {
    match requested.iter().find(|pair| !values.contains_key(&pair.handle)) {
        Some(missing) => Err(Error::Unauthorized(missing.handle)),
        None => Ok(()),
    }
}

pub struct DecryptionAuthorizationManager {
    validity_days: u32,
}

impl DecryptionAuthorizationManager {
    /// `validity_days` below 1 is raised to 1.
    pub fn new(validity_days: u32) -> Self {
        Self {
            validity_days: validity_days.max(1),
        }
    }

    pub fn validity_days(&self) -> u32 {
        self.validity_days
    }

    /// Build a fresh grant for `handles`, valid from `validity_start`.
    pub fn prepare_grant(
        &self,
        session: &Session,
        handles: &[HandleContractPair],
        validity_start: u64,
    ) -> AuthorizationGrant {
        let keypair = EphemeralKeypair::generate();
        let bound_contracts = bound_contracts(handles);
        let typed_data = user_decrypt_typed_data(
            session.backend().decryption_domain(),
            keypair.public_key(),
            &bound_contracts,
            validity_start,
            self.validity_days,
        );
        AuthorizationGrant {
            keypair,
            typed_data,
            validity_start,
            validity_duration_days: self.validity_days,
            bound_contracts,
        }
    }

    /// Decrypt `handles` in one batched, singly-signed exchange.
    ///
    /// Handles the backend does not authorize, or whose sealed value cannot
    /// be opened, are absent from the result; pass the result through
    /// [`require_all`] to treat that as an error.
    pub async fn request_decryption(
        &self,
        session: &Session,
        handles: &[HandleContractPair],
        wallet: &dyn WalletSigner,
        cancel: &CancellationToken,
    ) -> Result<HashMap<CiphertextHandle, u64>> {
        session.ensure_ready()?;
        if handles.is_empty() {
            return Ok(HashMap::new());
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let grant = self.prepare_grant(session, handles, unix_now());
        let user = wallet.address();
        debug!(
            %user,
            handles = handles.len(),
            contracts = grant.bound_contracts.len(),
            days = grant.validity_duration_days,
            "requesting decryption signature"
        );
        let signature = wallet.sign_typed_data(&grant.typed_data).await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let request = UserDecryptRequest {
            handles: handles.to_vec(),
            public_key: grant.public_key().to_vec(),
            signature: signature.to_vec(),
            contract_addresses: grant.bound_contracts.clone(),
            user_address: user,
            start_timestamp: grant.validity_start,
            duration_days: grant.validity_duration_days,
        };
        let sealed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sealed = session.backend().user_decrypt(&request) => sealed?,
        };

        let mut values = HashMap::with_capacity(sealed.len());
        for (handle, jwe) in sealed {
            if !handles.iter().any(|pair| pair.handle == handle) {
                warn!(%handle, "backend returned a handle that was not requested");
                continue;
            }
            match grant.open(&jwe) {
                Ok(value) => {
                    values.insert(handle, value);
                }
                Err(e) => warn!(%handle, error = %e, "discarding undecryptable value"),
            }
        }
        info!(
            %user,
            requested = handles.len(),
            decrypted = values.len(),
            "decryption batch complete"
        );
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use fhevm_discovery::LocalBackendMetadata;
    use std::sync::Arc;

    fn session() -> Session {
        let metadata = LocalBackendMetadata {
            acl_address: Address([1; 20]),
            input_verifier_address: Address([2; 20]),
            kms_verifier_address: Address([3; 20]),
        };
        Session::new(Arc::new(LocalBackend::new(31337, metadata)), 31337)
    }

    fn pair(handle: u8, contract: u8) -> HandleContractPair {
        HandleContractPair {
            handle: CiphertextHandle([handle; 32]),
            contract_address: Address([contract; 20]),
        }
    }

    #[test]
    fn bound_contracts_are_distinct_in_order() {
        let handles = [pair(1, 0xb), pair(2, 0xa), pair(3, 0xb)];
        assert_eq!(
            bound_contracts(&handles),
            vec![Address([0xb; 20]), Address([0xa; 20])]
        );
    }

    #[test]
    fn grants_never_share_keys() {
        let manager = DecryptionAuthorizationManager::new(365);
        let s = session();
        let a = manager.prepare_grant(&s, &[pair(1, 1)], 1_700_000_000);
        let b = manager.prepare_grant(&s, &[pair(1, 1)], 1_700_000_000);
        assert_ne!(a.public_key(), b.public_key());
        assert_ne!(
            a.typed_data.signing_digest().unwrap(),
            b.typed_data.signing_digest().unwrap()
        );
    }

    #[test]
    fn grant_carries_configured_window() {
        let manager = DecryptionAuthorizationManager::new(7);
        let grant = manager.prepare_grant(&session(), &[pair(1, 1), pair(2, 2)], 1_000);
        assert_eq!(grant.validity_start, 1_000);
        assert_eq!(grant.validity_duration_days, 7);
        assert_eq!(grant.typed_data.message["durationDays"], "7");
        assert_eq!(grant.typed_data.message["startTimestamp"], "1000");
        assert_eq!(
            grant.typed_data.message["contractAddresses"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn zero_validity_is_raised() {
        assert_eq!(DecryptionAuthorizationManager::new(0).validity_days(), 1);
    }

    #[test]
    fn require_all_names_missing_handle() {
        let requested = [pair(1, 1), pair(2, 1)];
        let mut values = HashMap::new();
        values.insert(CiphertextHandle([1; 32]), 5);
        assert!(matches!(
            require_all(&requested, &values),
            Err(Error::Unauthorized(h)) if h == CiphertextHandle([2; 32])
        ));
        values.insert(CiphertextHandle([2; 32]), 6);
        assert!(require_all(&requested, &values).is_ok());
    }
}
