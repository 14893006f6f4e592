//! Error types for minting and verification
//!
//! Every failure is a value. Minting and verification each get their own enum
//! so callers can match on exactly the outcomes an operation can produce; the
//! lower-level codec, key store and transport errors convert into them.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while minting a custom token
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MintError {
    /// The client has no signer identity or signing key
    #[error("{0}")]
    Configuration(String),

    /// The uid is empty or longer than 128 characters
    #[error("uid must be non-empty, and not longer than 128 characters (got {length})")]
    InvalidUid {
        /// Character count of the rejected uid
        length: usize,
    },

    /// Developer claims use one or more reserved names
    #[error("{}", reserved_claims_message(.names))]
    ReservedClaims {
        /// Offending names, in reserved-list order
        names: Vec<String>,
    },

    /// The payload could not be serialized or signed
    #[error("failed to encode custom token: {0}")]
    Encoding(#[from] CodecError),
}

impl MintError {
    /// Whether the caller must fix its input (as opposed to its configuration)
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidUid { .. } | Self::ReservedClaims { .. })
    }
}

fn reserved_claims_message(names: &[String]) -> String {
    match names {
        [single] => format!("developer claim \"{single}\" is reserved and cannot be specified"),
        _ => format!(
            "developer claims \"{}\" are reserved and cannot be specified",
            names.join(", ")
        ),
    }
}

/// Errors produced while verifying an ID token
///
/// Verification is all-or-nothing: any of these means no [`Token`](crate::Token)
/// was produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The client has no project id configured
    #[error("{0}")]
    Configuration(String),

    /// The input string was empty
    #[error("ID token must be a non-empty string")]
    EmptyToken,

    /// The compact string or one of its JSON segments is malformed
    #[error("malformed ID token: {0}")]
    Malformed(String),

    /// The header announced an algorithm other than RS256
    #[error(
        "ID token has an incorrect algorithm. Expected \"RS256\" but got \"{found}\". Obtain a fresh ID token from the client SDK and retry."
    )]
    UnsupportedAlgorithm {
        /// Algorithm named in the header
        found: String,
    },

    /// The header carries no key id
    #[error("ID token has no \"kid\" header")]
    MissingKeyId,

    /// A custom token was presented where an ID token was expected
    #[error("expected an ID token, but was given a custom token")]
    WrongTokenType,

    /// The signature did not verify against the announced key
    #[error("failed to verify ID token signature")]
    InvalidSignature,

    /// No verification key with the announced key id exists
    #[error("no verification key found for kid \"{kid}\"")]
    KeyNotFound {
        /// Key id from the token header
        kid: String,
    },

    /// The verification keys could not be fetched and no usable cache remains
    #[error("verification keys unavailable: {0}")]
    KeySourceUnavailable(String),

    /// The `aud` claim is not this project
    #[error(
        "ID token has invalid \"aud\" (audience) claim. Expected \"{expected}\" but got \"{actual}\". Make sure the ID token comes from the same project as the credential used to authenticate this client. Obtain a fresh ID token from the client SDK and retry."
    )]
    AudienceMismatch {
        /// Project id this client verifies for
        expected: String,
        /// Audience found in the token
        actual: String,
    },

    /// The `iss` claim is not the issuer for this project
    #[error(
        "ID token has invalid \"iss\" (issuer) claim. Expected \"{expected}\" but got \"{actual}\". Make sure the ID token comes from the same project as the credential used to authenticate this client. Obtain a fresh ID token from the client SDK and retry."
    )]
    IssuerMismatch {
        /// Issuer derived from the project id
        expected: String,
        /// Issuer found in the token
        actual: String,
    },

    /// The `iat` claim lies in the future
    #[error("ID token issued at future timestamp: {issued_at} (now: {now})")]
    IssuedInFuture {
        /// Value of `iat`
        issued_at: i64,
        /// Clock reading used for the check
        now: i64,
    },

    /// The `exp` claim lies in the past
    #[error("ID token has expired. Expired at: {expired_at} (now: {now})")]
    Expired {
        /// Value of `exp`
        expired_at: i64,
        /// Clock reading used for the check
        now: i64,
    },

    /// The `sub` claim is empty
    #[error("ID token has empty \"sub\" (subject) claim. Obtain a fresh ID token from the client SDK and retry.")]
    EmptySubject,

    /// The `sub` claim is longer than 128 characters
    #[error(
        "ID token has a \"sub\" (subject) claim longer than 128 characters ({length}). Obtain a fresh ID token from the client SDK and retry."
    )]
    SubjectTooLong {
        /// Character count of the subject
        length: usize,
    },
}

impl VerifyError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeySourceUnavailable(_))
    }
}

impl From<CodecError> for VerifyError {
    fn from(err: CodecError) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<KeyStoreError> for VerifyError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::NotFound { kid } => Self::KeyNotFound { kid },
            KeyStoreError::Unavailable(reason) => Self::KeySourceUnavailable(reason),
        }
    }
}

/// Compact JWT encoding and decoding errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The string does not have exactly three `.`-separated segments
    #[error("expected 3 segments separated by '.', found {found}")]
    SegmentCount {
        /// Number of segments found
        found: usize,
    },

    /// A segment is not valid unpadded base64url
    #[error("{segment} segment is not valid base64url: {reason}")]
    Base64 {
        /// Which segment failed
        segment: &'static str,
        /// Decoder message
        reason: String,
    },

    /// A segment is not the expected JSON document
    #[error("{segment} segment is not valid JSON: {reason}")]
    Json {
        /// Which segment failed
        segment: &'static str,
        /// Parser message
        reason: String,
    },

    /// Signing the header and payload failed
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Verification key lookup errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyStoreError {
    /// The key set is current but holds no key with this id
    #[error("no verification key found for kid \"{kid}\"")]
    NotFound {
        /// Requested key id
        kid: String,
    },

    /// Fetching failed and no unexpired key set is cached
    #[error("{0}")]
    Unavailable(String),
}

/// Published certificate parsing errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CertificateError {
    /// The PEM is not an X.509 certificate or RSA public key
    #[error("certificate for kid \"{kid}\" is not a usable RSA key: {reason}")]
    InvalidRsaKey {
        /// Key id the certificate was published under
        kid: String,
        /// Parser message
        reason: String,
    },
}

impl From<CertificateError> for KeyStoreError {
    fn from(err: CertificateError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors from a [`KeyFetchTransport`](crate::KeyFetchTransport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status
    #[error("key endpoint returned HTTP {status}")]
    Status {
        /// Status code returned
        status: u16,
    },

    /// The response body exceeded the configured limit
    #[error("response too large: {size} bytes (maximum: {max} bytes)")]
    ResponseTooLarge {
        /// Observed or announced size
        size: u64,
        /// Configured maximum
        max: u64,
    },
}

/// Errors raised while loading configuration or credentials
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config or credentials file not found
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// The service-account document is not valid JSON of the expected shape
    #[error("invalid service account credentials: {0}")]
    InvalidCredentials(String),

    /// The private key could not be parsed as an RSA key
    #[error("{0}")]
    InvalidKey(String),

    /// The HTTP client for the default transport could not be built
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
