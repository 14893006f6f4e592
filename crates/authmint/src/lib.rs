//! # authmint - Custom Tokens and ID Token Verification
//!
//! Mints short-lived custom tokens for client sign-in and verifies the ID
//! tokens the identity provider issues in return.
//!
//! ## Key Features
//!
//! - **Custom tokens** - RS256-signed JWTs asserting a uid plus developer claims,
//!   with reserved claim names rejected up front
//! - **ID token verification** - algorithm pinning, signature check against the
//!   provider's rotating certificates, then an ordered set of claim rules
//! - **Key caching** - lock-free snapshots, single-flight refresh, lifetimes
//!   taken from `Cache-Control`
//! - **Injectable time** - every time-dependent check reads a [`Clock`]
//!
//! ## Architecture
//!
//! - [`clock`] - Time source ([`SystemClock`], [`MockClock`])
//! - [`keys`] - RSA signing and verification keys
//! - [`key_store`] - Certificate fetching and caching
//! - [`codec`] - Compact JWT encoding and decoding
//! - [`signature`] - RS256 signature verification
//! - [`claims`] - ID token claim rules and the verified [`Token`]
//! - [`client`] - [`AuthClient`], the entry point
//! - [`config`] - Configuration and service-account credentials
//! - [`error`] - Error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use authmint::{AuthClient, ServiceAccount};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let account = ServiceAccount::from_file("service-account.json")?;
//! let client = AuthClient::builder()
//!     .project_id("my-project")
//!     .service_account(&account)?
//!     .build()?;
//!
//! // Issue a custom token for a client SDK to exchange
//! let claims = json!({"premium": true});
//! let custom_token = client.mint("alice", claims.as_object())?;
//!
//! // Verify the ID token the client sends back
//! let token = client.verify(&custom_token).await;
//! assert!(token.is_err()); // a custom token is not an ID token
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod key_store;
pub mod keys;
pub mod signature;

#[doc(inline)]
pub use claims::{ClaimValidator, Token, UnverifiedClaims};
#[doc(inline)]
pub use client::{AuthClient, AuthClientBuilder, CustomTokenPayload};
#[doc(inline)]
pub use clock::{Clock, MockClock, SystemClock};
#[doc(inline)]
pub use config::{AuthConfig, KeyStoreConfig, ServiceAccount};
#[doc(inline)]
pub use error::{
    CertificateError, CodecError, ConfigError, KeyStoreError, MintError, TransportError,
    VerifyError,
};
#[doc(inline)]
pub use key_store::{FetchedKeys, HttpKeyTransport, KeyFetchTransport, KeyStore};
#[doc(inline)]
pub use keys::{SigningKey, VerificationKey};
