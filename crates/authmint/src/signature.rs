//! RS256 signature verification against the published key set

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use tracing::debug;

use crate::codec::{ALGORITHM, JwtHeader};
use crate::error::VerifyError;
use crate::key_store::KeyStore;

/// Checks a token signature with the key its header names
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key_store: KeyStore,
}

impl SignatureVerifier {
    /// Create a verifier that resolves keys through `key_store`
    pub fn new(key_store: KeyStore) -> Self {
        Self { key_store }
    }

    /// The key store keys are resolved through
    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    /// Verify `signature` over `signed` with the key named by `header.kid`
    ///
    /// Any algorithm other than RS256, `none` included, is refused before a
    /// key is looked up.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::UnsupportedAlgorithm`] for a non-RS256 header
    /// - [`VerifyError::MissingKeyId`] when the header has no key id
    /// - [`VerifyError::KeyNotFound`] / [`VerifyError::KeySourceUnavailable`]
    ///   when the key cannot be resolved
    /// - [`VerifyError::InvalidSignature`] when the signature does not match
    pub async fn check(
        &self,
        header: &JwtHeader,
        signed: &[u8],
        signature: &[u8],
    ) -> Result<(), VerifyError> {
        if header.alg != ALGORITHM {
            return Err(VerifyError::UnsupportedAlgorithm {
                found: header.alg.clone(),
            });
        }
        let kid = header.key_id().ok_or(VerifyError::MissingKeyId)?;
        let key = self.key_store.get_key(kid).await?;

        let encoded = URL_SAFE_NO_PAD.encode(signature);
        match jsonwebtoken::crypto::verify(&encoded, signed, key.decoding_key(), Algorithm::RS256) {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(kid = %kid, "Signature mismatch");
                Err(VerifyError::InvalidSignature)
            }
            Err(e) => {
                debug!(kid = %kid, error = %e, "Signature could not be checked");
                Err(VerifyError::InvalidSignature)
            }
        }
    }
}
