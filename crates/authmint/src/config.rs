//! Client configuration and service-account credentials

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::keys::SigningKey;

/// Where the identity provider publishes its ID token signing certificates
pub const DEFAULT_CERT_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

/// Environment variable prefix read by [`AuthConfig::from_file`]
pub const DEFAULT_ENV_PREFIX: &str = "AUTHMINT";

/// Client configuration
///
/// Every field has a default, so a file only needs the values it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Project that ID tokens must be issued for
    pub project_id: Option<String>,
    /// Inline service-account credentials
    pub service_account: Option<ServiceAccount>,
    /// Path to a service-account JSON document, used when no inline account is set
    pub credentials_file: Option<PathBuf>,
    /// Certificate set URL
    pub cert_url: String,
    /// Key cache settings
    pub key_store: KeyStoreConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            service_account: None,
            credentials_file: None,
            cert_url: DEFAULT_CERT_URL.to_string(),
            key_store: KeyStoreConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is auto-detected from the file extension:
    /// - `.toml` → TOML format
    /// - `.yaml` or `.yml` → YAML format
    /// - `.json` → JSON format
    ///
    /// Environment variables with the `AUTHMINT_` prefix override file
    /// settings, with `__` separating nested keys, e.g.
    /// `AUTHMINT_KEY_STORE__FETCH_TIMEOUT_SECS=5`.
    ///
    /// ```rust,no_run
    /// use authmint::AuthConfig;
    ///
    /// let config = AuthConfig::from_file("authmint.toml").expect("Failed to load config");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`AuthConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };
        let path_str = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;

        let config = Config::builder()
            .add_source(File::new(path_str, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Service account from the inline value or, failing that, the credentials file
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file cannot be read or parsed.
    pub fn resolve_service_account(&self) -> Result<Option<ServiceAccount>, ConfigError> {
        if let Some(account) = &self.service_account {
            return Ok(Some(account.clone()));
        }
        self.credentials_file
            .as_deref()
            .map(ServiceAccount::from_file)
            .transpose()
    }
}

/// Key cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// Cache lifetime when the response carries no `max-age` (default: 1 hour)
    pub default_cache_ttl_secs: u64,
    /// Upper bound on any cache lifetime (default: 24 hours)
    pub max_cache_ttl_secs: u64,
    /// Timeout for one certificate fetch (default: 10 seconds)
    pub fetch_timeout_secs: u64,
    /// Minimum age of the cached set before an unknown key id triggers a refresh (default: 5 seconds)
    pub min_refresh_interval_secs: u64,
    /// Largest accepted certificate response (default: 64 KiB)
    pub max_response_bytes: usize,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            default_cache_ttl_secs: 3600,
            max_cache_ttl_secs: 86_400,
            fetch_timeout_secs: 10,
            min_refresh_interval_secs: 5,
            max_response_bytes: 64 * 1024,
        }
    }
}

impl KeyStoreConfig {
    /// Default cache lifetime
    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.default_cache_ttl_secs)
    }

    /// Maximum cache lifetime
    pub fn max_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.max_cache_ttl_secs)
    }

    /// Fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Service-account credentials: the signer identity and its private key
///
/// Matches the JSON documents issued for service accounts; unknown fields are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    /// Signer email, used as `iss` and `sub` of custom tokens
    #[serde(default)]
    pub client_email: String,
    /// PEM-encoded RSA private key
    #[serde(default)]
    pub private_key: Option<SecretString>,
    /// Project the account belongs to
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccount {
    /// Parse a service-account JSON document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCredentials`] if the document is not JSON
    /// of the expected shape.
    pub fn from_json(json: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(json).map_err(|e| ConfigError::InvalidCredentials(e.to_string()))
    }

    /// Read and parse a service-account JSON file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if the file is missing, or any
    /// error of [`ServiceAccount::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Self::from_json(&std::fs::read(path)?)
    }

    /// Parse the private key, if one is present
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] if the key is present but not a
    /// usable RSA key.
    pub fn signing_key(&self) -> Result<Option<SigningKey>, ConfigError> {
        match &self.private_key {
            Some(key) if !key.expose_secret().is_empty() => {
                SigningKey::parse(key.expose_secret().as_bytes()).map(Some)
            }
            _ => Ok(None),
        }
    }
}
