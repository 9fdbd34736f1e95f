//! Turns a plaintext into a submittable encrypted payload.

use fhevm_crypto::Address;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::EncryptedPayload;

/// Encodes inputs through a session's backend.
#[derive(Debug, Clone)]
pub struct InputEncoder {
    session: Session,
}

impl InputEncoder {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Encrypt `value` for `contract`, to be submitted by `submitter`.
    ///
    /// Both addresses go to the backend untouched; the resulting proof is
    /// only valid for that pair. Encryption runs on the blocking pool and
    /// the payload is committed to the backend before it is returned.
    pub async fn encode(
        &self,
        value: u64,
        contract: Address,
        submitter: Address,
    ) -> Result<EncryptedPayload> {
        self.session.ensure_ready()?;

        let backend = self.session.backend().clone();
        let payload = tokio::task::spawn_blocking(move || backend.encrypt_u64(value, contract, submitter))
            .await
            .map_err(|e| Error::Encoding(format!("encoding task failed: {}", e)))??;

        if payload.handles.is_empty() {
            return Err(Error::Encoding("backend returned no ciphertext handle".to_string()));
        }
        self.session.backend().commit_inputs(&payload).await?;
        debug!(
            %contract,
            %submitter,
            handles = payload.handles.len(),
            proof_len = payload.input_proof.len(),
            "encoded input"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::status::SessionStatus;
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

    #[tokio::test]
    async fn encodes_one_handle() {
        let payload = session()
            .encoder()
            .encode(12345, Address([0xab; 20]), Address([0x12; 20]))
            .await
            .unwrap();
        assert_eq!(payload.handles.len(), 1);
        assert!(!payload.input_proof.is_empty());
    }

    #[tokio::test]
    async fn invalidated_session_is_rejected() {
        let s = session();
        let encoder = s.encoder();
        s.invalidate();
        let err = encoder
            .encode(1, Address([0xab; 20]), Address([0x12; 20]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSession {
                status: SessionStatus::Idle
            }
        ));
    }
}
