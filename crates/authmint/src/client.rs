//! Custom token minting and ID token verification
//!
//! [`AuthClient`] ties the pieces together:
//!
//! ```text
//! mint:   uid, claims ─► checks ─► CustomTokenPayload ─► codec::encode ─► compact JWT
//! verify: compact JWT ─► codec::decode ─► SignatureVerifier ─► ClaimValidator ─► Token
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::claims::{self, CUSTOM_TOKEN_AUDIENCE, ClaimValidator, MAX_UID_LENGTH, Token};
use crate::clock::{Clock, SystemClock};
use crate::codec::{self, DecodedToken, JwtHeader};
use crate::config::{AuthConfig, DEFAULT_CERT_URL, KeyStoreConfig, ServiceAccount};
use crate::error::{ConfigError, MintError, VerifyError};
use crate::key_store::{HttpKeyTransport, KeyFetchTransport, KeyStore};
use crate::keys::SigningKey;
use crate::signature::SignatureVerifier;

/// Lifetime of a custom token
pub const CUSTOM_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Claim names developers may not set on a custom token
pub const RESERVED_CLAIMS: [&str; 16] = [
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase", "iat",
    "iss", "jti", "nbf", "nonce", "sub",
];

/// Payload of a custom token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTokenPayload {
    /// Signer email
    pub iss: String,
    /// Signer email
    pub sub: String,
    /// Always [`CUSTOM_TOKEN_AUDIENCE`]
    pub aud: String,
    /// User the token is minted for
    pub uid: String,
    /// Issue time, seconds since the Unix epoch
    pub iat: i64,
    /// `iat` plus one hour
    pub exp: i64,
    /// Developer claims, omitted when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
}

/// Mints custom tokens and verifies ID tokens
///
/// ```rust,no_run
/// use authmint::{AuthClient, AuthConfig};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = AuthClient::new(&AuthConfig::from_file("authmint.toml")?)?;
///
/// let custom = client.custom_token("alice")?;
/// let token = client.verify("eyJhbGciOiJSUzI1NiIsImtpZCI6Ii4uLiJ9...").await?;
/// println!("{custom} / {}", token.uid());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthClient {
    signer_email: Option<String>,
    signing_key: Option<SigningKey>,
    clock: Arc<dyn Clock>,
    verifier: SignatureVerifier,
    validator: Option<ClaimValidator>,
}

impl AuthClient {
    /// Build a client from loaded configuration
    ///
    /// The project id falls back to the service account's own project when
    /// the configuration does not set one. Without a service account the
    /// client can still verify; without a project id it can still mint.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be read or the private key
    /// cannot be parsed.
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        let account = config.resolve_service_account()?;
        let project_id = config
            .project_id
            .clone()
            .or_else(|| account.as_ref().and_then(|a| a.project_id.clone()));

        let mut builder = Self::builder()
            .cert_url(config.cert_url.clone())
            .key_store_config(config.key_store.clone());
        if let Some(project_id) = project_id {
            builder = builder.project_id(project_id);
        }
        if let Some(account) = &account {
            builder = builder.service_account(account)?;
        }
        builder.build()
    }

    /// Start building a client
    pub fn builder() -> AuthClientBuilder {
        AuthClientBuilder::default()
    }

    /// Project id ID tokens are verified for
    pub fn project_id(&self) -> Option<&str> {
        self.validator.as_ref().map(ClaimValidator::project_id)
    }

    /// Signer email custom tokens are issued under
    pub fn signer_email(&self) -> Option<&str> {
        self.signer_email.as_deref()
    }

    /// The verification key cache
    pub fn key_store(&self) -> &KeyStore {
        self.verifier.key_store()
    }

    /// Mint a custom token for `uid` with no developer claims
    ///
    /// # Errors
    ///
    /// See [`AuthClient::mint`].
    pub fn custom_token(&self, uid: &str) -> Result<String, MintError> {
        self.mint(uid, None)
    }

    /// Mint a custom token for `uid` carrying developer `claims`
    ///
    /// # Errors
    ///
    /// - [`MintError::Configuration`] without a signer email or private key
    /// - [`MintError::InvalidUid`] for an empty uid or one over 128 characters
    /// - [`MintError::ReservedClaims`] naming every reserved claim present
    pub fn mint(&self, uid: &str, claims: Option<&Map<String, Value>>) -> Result<String, MintError> {
        let email = self.signer_email.as_deref().ok_or_else(|| {
            MintError::Configuration("service account email not available".to_string())
        })?;
        let key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| MintError::Configuration("private key not available".to_string()))?;

        let length = uid.chars().count();
        if length == 0 || length > MAX_UID_LENGTH {
            return Err(MintError::InvalidUid { length });
        }

        if let Some(claims) = claims {
            let names: Vec<String> = RESERVED_CLAIMS
                .iter()
                .filter(|name| claims.contains_key(**name))
                .map(|name| (*name).to_string())
                .collect();
            if !names.is_empty() {
                return Err(MintError::ReservedClaims { names });
            }
        }

        let issued_at = self.clock.unix_now();
        let payload = CustomTokenPayload {
            iss: email.to_string(),
            sub: email.to_string(),
            aud: CUSTOM_TOKEN_AUDIENCE.to_string(),
            uid: uid.to_string(),
            iat: issued_at,
            exp: issued_at + CUSTOM_TOKEN_LIFETIME_SECS,
            claims: claims.filter(|c| !c.is_empty()).cloned(),
        };

        let token = codec::encode(&JwtHeader::rs256(), &payload, key)?;
        debug!(uid = %uid, "Minted custom token");
        Ok(token)
    }

    /// Verify an ID token and return its trusted contents
    ///
    /// Decoding, signature verification and claim validation run in that
    /// order; the first failure is returned and no [`Token`] is produced.
    ///
    /// # Errors
    ///
    /// Any [`VerifyError`]; only [`VerifyError::KeySourceUnavailable`] is
    /// worth retrying.
    pub async fn verify(&self, token: &str) -> Result<Token, VerifyError> {
        let validator = self
            .validator
            .as_ref()
            .ok_or_else(|| VerifyError::Configuration("project id not available".to_string()))?;
        if token.is_empty() {
            return Err(VerifyError::EmptyToken);
        }

        let result = self.verify_with(validator, token).await;
        if let Err(error) = &result {
            debug!(error = %error, "ID token verification failed");
        }
        result
    }

    async fn verify_with(&self, validator: &ClaimValidator, token: &str) -> Result<Token, VerifyError> {
        let decoded: DecodedToken = codec::decode(token)?;
        claims::check_key_id(&decoded.header, &decoded.claims)?;
        self.verifier
            .check(&decoded.header, decoded.signed.as_bytes(), &decoded.signature)
            .await?;
        validator.validate(&decoded.header, decoded.claims)
    }
}

/// Builder for [`AuthClient`]
pub struct AuthClientBuilder {
    project_id: Option<String>,
    signer_email: Option<String>,
    signing_key: Option<SigningKey>,
    transport: Option<Arc<dyn KeyFetchTransport>>,
    clock: Option<Arc<dyn Clock>>,
    key_store_config: KeyStoreConfig,
    cert_url: String,
}

impl Default for AuthClientBuilder {
    fn default() -> Self {
        Self {
            project_id: None,
            signer_email: None,
            signing_key: None,
            transport: None,
            clock: None,
            key_store_config: KeyStoreConfig::default(),
            cert_url: DEFAULT_CERT_URL.to_string(),
        }
    }
}

impl AuthClientBuilder {
    /// Project id ID tokens must be issued for
    #[must_use]
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Signer identity and key for minting
    #[must_use]
    pub fn signer(mut self, email: impl Into<String>, key: SigningKey) -> Self {
        self.signer_email = Some(email.into());
        self.signing_key = Some(key);
        self
    }

    /// Take the signer identity and key from service-account credentials
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] if the account's private key cannot be parsed.
    pub fn service_account(mut self, account: &ServiceAccount) -> Result<Self, ConfigError> {
        self.signing_key = account.signing_key()?;
        self.signer_email = Some(account.client_email.clone());
        Ok(self)
    }

    /// Transport used to fetch certificates (default: [`HttpKeyTransport`])
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn KeyFetchTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Time source (default: [`SystemClock`])
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Key cache settings
    #[must_use]
    pub fn key_store_config(mut self, config: KeyStoreConfig) -> Self {
        self.key_store_config = config;
        self
    }

    /// Certificate set URL
    #[must_use]
    pub fn cert_url(mut self, url: impl Into<String>) -> Self {
        self.cert_url = url.into();
        self
    }

    /// Build the client
    ///
    /// Empty project ids and signer emails count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if no transport was given and the
    /// default HTTP transport cannot be created.
    pub fn build(self) -> Result<AuthClient, ConfigError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpKeyTransport::new(&self.key_store_config)?),
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let key_store = KeyStore::new(
            self.cert_url,
            transport,
            Arc::clone(&clock),
            self.key_store_config,
        );
        let validator = self
            .project_id
            .filter(|p| !p.is_empty())
            .map(|p| ClaimValidator::new(p, Arc::clone(&clock)));

        Ok(AuthClient {
            signer_email: self.signer_email.filter(|e| !e.is_empty()),
            signing_key: self.signing_key,
            clock,
            verifier: SignatureVerifier::new(key_store),
            validator,
        })
    }
}
