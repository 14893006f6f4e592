//! Compact JWT encoding and decoding
//!
//! `encode` produces `base64url(header).base64url(payload).base64url(signature)`
//! with unpadded base64url segments and an RS256 signature over the first two
//! segments. `decode` reverses the framing without trusting anything: it hands
//! back the header, the payload, the exact signed span and the raw signature
//! bytes for [`SignatureVerifier`](crate::signature::SignatureVerifier) and the
//! claim rules to judge.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::claims::UnverifiedClaims;
use crate::error::CodecError;
use crate::keys::SigningKey;

/// The only signing algorithm this crate produces or accepts
pub const ALGORITHM: &str = "RS256";

const HEADER_SEGMENT: &str = "header";
const PAYLOAD_SEGMENT: &str = "payload";
const SIGNATURE_SEGMENT: &str = "signature";

/// JOSE header of a compact JWT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm
    #[serde(default)]
    pub alg: String,

    /// Id of the key that produced the signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Media type, `JWT` for tokens minted here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

impl JwtHeader {
    /// Header for a self-signed RS256 token: no key id
    pub fn rs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            kid: None,
            typ: Some("JWT".to_string()),
        }
    }

    /// Set the key id
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// Key id, with an empty string treated as absent
    pub fn key_id(&self) -> Option<&str> {
        self.kid.as_deref().filter(|kid| !kid.is_empty())
    }
}

/// A compact JWT split into its parts, not yet trusted
#[derive(Debug, Clone)]
pub struct DecodedToken<P = UnverifiedClaims> {
    /// Decoded header
    pub header: JwtHeader,
    /// Decoded payload
    pub claims: P,
    /// The exact `segment1.segment2` span the signature covers
    pub signed: String,
    /// Raw signature bytes
    pub signature: Vec<u8>,
}

/// Serialize, frame and sign a token
///
/// # Errors
///
/// Returns [`CodecError::Json`] if either part fails to serialize and
/// [`CodecError::Signing`] if the RSA signature cannot be produced.
pub fn encode<P: Serialize>(
    header: &JwtHeader,
    payload: &P,
    key: &SigningKey,
) -> Result<String, CodecError> {
    let header_segment = encode_segment(header, HEADER_SEGMENT)?;
    let payload_segment = encode_segment(payload, PAYLOAD_SEGMENT)?;
    let signing_input = format!("{header_segment}.{payload_segment}");

    let signature = jsonwebtoken::crypto::sign(
        signing_input.as_bytes(),
        key.encoding_key(),
        Algorithm::RS256,
    )
    .map_err(|e| CodecError::Signing(e.to_string()))?;

    Ok(format!("{signing_input}.{signature}"))
}

/// Split a compact token and decode each segment
///
/// Unknown payload fields are kept by payload types that capture them (see
/// [`UnverifiedClaims`]).
///
/// # Errors
///
/// Returns [`CodecError::SegmentCount`] unless there are exactly three
/// segments, and [`CodecError::Base64`] / [`CodecError::Json`] naming the
/// first segment that fails to decode.
pub fn decode<P: DeserializeOwned>(token: &str) -> Result<DecodedToken<P>, CodecError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header_segment, payload_segment, signature_segment] = segments.as_slice() else {
        return Err(CodecError::SegmentCount {
            found: segments.len(),
        });
    };

    let header: JwtHeader = decode_segment(header_segment, HEADER_SEGMENT)?;
    let claims: P = decode_segment(payload_segment, PAYLOAD_SEGMENT)?;
    let signature = decode_base64(signature_segment, SIGNATURE_SEGMENT)?;

    let signed_len = header_segment.len() + 1 + payload_segment.len();
    Ok(DecodedToken {
        header,
        claims,
        signed: token[..signed_len].to_string(),
        signature,
    })
}

fn encode_segment<T: Serialize + ?Sized>(
    value: &T,
    segment: &'static str,
) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value).map_err(|e| CodecError::Json {
        segment,
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(
    encoded: &str,
    segment: &'static str,
) -> Result<T, CodecError> {
    let bytes = decode_base64(encoded, segment)?;
    serde_json::from_slice(&bytes).map_err(|e| CodecError::Json {
        segment,
        reason: e.to_string(),
    })
}

fn decode_base64(encoded: &str, segment: &'static str) -> Result<Vec<u8>, CodecError> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CodecError::Base64 {
            segment,
            reason: e.to_string(),
        })
}
