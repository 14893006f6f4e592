//! RSA signing and verification keys
//!
//! Private keys are normalized to PKCS#1 DER through the `rsa` crate, which
//! accepts both PKCS#1 and PKCS#8 input in PEM or DER form and rejects
//! non-RSA keys with a precise error. Verification keys come from the X.509
//! certificates the identity provider publishes.

use std::fmt;

use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;

use crate::error::{CertificateError, ConfigError};

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// Private key used to sign custom tokens
///
/// Loaded once and never serialized back out.
#[derive(Clone)]
pub struct SigningKey {
    key: EncodingKey,
}

impl SigningKey {
    /// Parse a PEM (`RSA PRIVATE KEY` or `PRIVATE KEY`) or raw DER key blob
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] if the blob is empty, is not an RSA
    /// key, or is neither PKCS#1 nor PKCS#8.
    pub fn parse(blob: &[u8]) -> Result<Self, ConfigError> {
        if blob.is_empty() {
            return Err(ConfigError::InvalidKey(
                "no private key data found".to_string(),
            ));
        }
        if contains_pem_marker(blob) {
            let pem = std::str::from_utf8(blob).map_err(|_| {
                ConfigError::InvalidKey("PEM private key is not valid UTF-8".to_string())
            })?;
            Self::from_pem(pem)
        } else {
            Self::from_der(blob)
        }
    }

    /// Parse a PEM-encoded PKCS#8 or PKCS#1 RSA private key
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] if no RSA key can be read from `pem`.
    pub fn from_pem(pem: &str) -> Result<Self, ConfigError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|pkcs8_err| {
                RsaPrivateKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| (pkcs8_err, pkcs1_err))
            })
            .map_err(|(pkcs8_err, pkcs1_err)| {
                ConfigError::InvalidKey(format!(
                    "private key should be a PEM or plain PKCS1 or PKCS8 RSA key; \
                     parse error: {pkcs8_err} / {pkcs1_err}"
                ))
            })?;
        Self::from_rsa(&key)
    }

    /// Parse a DER-encoded PKCS#8 or PKCS#1 RSA private key
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] if no RSA key can be read from `der`.
    pub fn from_der(der: &[u8]) -> Result<Self, ConfigError> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
            .map_err(|e| {
                ConfigError::InvalidKey(format!(
                    "private key is not an RSA key in PKCS1 or PKCS8 DER form: {e}"
                ))
            })?;
        Self::from_rsa(&key)
    }

    fn from_rsa(key: &RsaPrivateKey) -> Result<Self, ConfigError> {
        let der = key.to_pkcs1_der().map_err(|e| {
            ConfigError::InvalidKey(format!("failed to re-encode RSA private key: {e}"))
        })?;
        Ok(Self {
            key: EncodingKey::from_rsa_der(der.as_bytes()),
        })
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

fn contains_pem_marker(blob: &[u8]) -> bool {
    blob.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER)
}

/// Public key a provider-issued token is verified against
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    key: DecodingKey,
}

impl VerificationKey {
    /// Extract the RSA public key from an X.509 certificate (or a public key) in PEM form
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::InvalidRsaKey`] naming the key id.
    pub fn from_certificate_pem(
        kid: impl Into<String>,
        pem: &str,
    ) -> Result<Self, CertificateError> {
        let kid = kid.into();
        match DecodingKey::from_rsa_pem(pem.as_bytes()) {
            Ok(key) => Ok(Self { kid, key }),
            Err(e) => Err(CertificateError::InvalidRsaKey {
                kid,
                reason: e.to_string(),
            }),
        }
    }

    /// Key id this key is published under
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}
