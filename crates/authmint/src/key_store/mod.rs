//! Verification key fetching and caching
//!
//! The identity provider publishes its current signing certificates as a JSON
//! object of key id to PEM certificate, and rotates them regularly.
//! [`KeyStore`] keeps the latest set in memory:
//!
//! - **Atomic snapshots**: the cache is an `ArcSwap`, so readers never lock and
//!   never see a half-replaced set
//! - **Single flight**: concurrent callers that need a refresh all await one
//!   shared fetch
//! - **Server-driven lifetime**: `Cache-Control: max-age` sets the expiry, with
//!   a configured default when the server gives none
//! - **Stale tolerance**: a failed refresh keeps serving a cache that has not
//!   yet expired
//! - **Rotation**: an unknown key id triggers at most one refresh, and only when
//!   the cached set is older than the minimum refresh interval

mod transport;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

pub use transport::{FetchedKeys, HttpKeyTransport, KeyFetchTransport, parse_max_age};

use crate::clock::Clock;
use crate::config::KeyStoreConfig;
use crate::error::KeyStoreError;
use crate::keys::VerificationKey;

type RefreshResult = Result<Arc<KeyCache>, KeyStoreError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// One fetched key set and its lifetime
#[derive(Debug)]
struct KeyCache {
    keys: HashMap<String, VerificationKey>,
    fetched_at: i64,
    valid_until: i64,
}

impl KeyCache {
    fn is_fresh(&self, now: i64) -> bool {
        now < self.valid_until
    }

    fn age(&self, now: i64) -> i64 {
        now.saturating_sub(self.fetched_at)
    }
}

/// Cache of the identity provider's verification keys
///
/// Cheap to clone; clones share the cache and any in-flight refresh.
#[derive(Clone)]
pub struct KeyStore {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    transport: Arc<dyn KeyFetchTransport>,
    clock: Arc<dyn Clock>,
    config: KeyStoreConfig,
    cache: ArcSwapOption<KeyCache>,
    inflight: Mutex<Option<SharedRefresh>>,
}

impl KeyStore {
    /// Create an empty key store for the certificate set at `url`
    ///
    /// Nothing is fetched until the first lookup.
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn KeyFetchTransport>,
        clock: Arc<dyn Clock>,
        config: KeyStoreConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                transport,
                clock,
                config,
                cache: ArcSwapOption::empty(),
                inflight: Mutex::new(None),
            }),
        }
    }

    /// Certificate set URL
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Resolve the verification key published under `kid`
    ///
    /// Served from cache while the cached set is fresh. An expired or empty
    /// cache is refreshed first; callers arriving during a refresh wait for it
    /// instead of fetching again.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`] if a current key set has no such key
    /// - [`KeyStoreError::Unavailable`] if refreshing failed and no unexpired
    ///   set is cached
    pub async fn get_key(&self, kid: &str) -> Result<VerificationKey, KeyStoreError> {
        let now = self.inner.clock.unix_now();
        let seen = self.inner.cache.load_full();
        if let Some(cache) = &seen
            && cache.is_fresh(now)
        {
            if let Some(key) = cache.keys.get(kid) {
                debug!(kid = %kid, "Using cached verification key");
                return Ok(key.clone());
            }
            if cache.age(now) < self.min_refresh_interval_secs() {
                debug!(kid = %kid, "Key id not in current key set");
                return Err(not_found(kid));
            }
            debug!(kid = %kid, "Key id not cached, refreshing for rotation");
        }

        match self.refresh(seen).await {
            Ok(cache) => cache.keys.get(kid).cloned().ok_or_else(|| not_found(kid)),
            Err(err) => {
                let now = self.inner.clock.unix_now();
                match self.inner.cache.load_full() {
                    Some(cache) if cache.is_fresh(now) => {
                        warn!(
                            url = %self.inner.url,
                            error = %err,
                            "Key refresh failed, using cached keys"
                        );
                        cache.keys.get(kid).cloned().ok_or_else(|| not_found(kid))
                    }
                    _ => {
                        error!(
                            url = %self.inner.url,
                            error = %err,
                            "Key refresh failed and no usable keys are cached"
                        );
                        Err(err)
                    }
                }
            }
        }
    }

    /// Key ids in the current snapshot, sorted
    pub fn cached_key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .cache
            .load_full()
            .map(|cache| cache.keys.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop the cached key set so the next lookup fetches
    pub fn invalidate(&self) {
        self.inner.cache.store(None);
        debug!(url = %self.inner.url, "Verification key cache cleared");
    }

    /// Join the in-flight refresh, or start one
    ///
    /// `seen` is the snapshot the caller judged insufficient. If a refresh
    /// finished after that check and left a fresh set behind, the set is
    /// returned without fetching again.
    async fn refresh(&self, seen: Option<Arc<KeyCache>>) -> RefreshResult {
        let refresh = {
            let mut inflight = self.inner.inflight.lock();
            match inflight.as_ref() {
                Some(refresh) => refresh.clone(),
                None => {
                    let now = self.inner.clock.unix_now();
                    if let Some(current) = self.inner.cache.load_full()
                        && current.is_fresh(now)
                        && !seen.as_ref().is_some_and(|seen| Arc::ptr_eq(seen, &current))
                    {
                        debug!(url = %self.inner.url, "Key set already refreshed by a concurrent lookup");
                        return Ok(current);
                    }

                    let inner = Arc::clone(&self.inner);
                    let refresh = async move {
                        let result = inner.fetch_keys().await;
                        if let Ok(cache) = &result {
                            inner.cache.store(Some(Arc::clone(cache)));
                        }
                        *inner.inflight.lock() = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *inflight = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    fn min_refresh_interval_secs(&self) -> i64 {
        secs_i64(self.inner.config.min_refresh_interval_secs)
    }
}

impl Inner {
    async fn fetch_keys(&self) -> RefreshResult {
        info!(url = %self.url, "Fetching verification keys");

        let timeout = self.config.fetch_timeout();
        let fetched = tokio::time::timeout(timeout, self.transport.fetch(&self.url))
            .await
            .map_err(|_| {
                KeyStoreError::Unavailable(format!(
                    "timed out after {}s fetching verification keys",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                KeyStoreError::Unavailable(format!("failed to fetch verification keys: {e}"))
            })?;

        let keys = parse_certificates(&fetched.body)?;
        let ttl = fetched
            .max_age
            .unwrap_or_else(|| self.config.default_cache_ttl())
            .min(self.config.max_cache_ttl());
        let now = self.clock.unix_now();

        info!(
            url = %self.url,
            key_count = keys.len(),
            ttl_secs = ttl.as_secs(),
            "Fetched verification keys"
        );

        Ok(Arc::new(KeyCache {
            keys,
            fetched_at: now,
            valid_until: now.saturating_add(secs_i64(ttl.as_secs())),
        }))
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("url", &self.inner.url)
            .field("cached_key_ids", &self.cached_key_ids())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Parse a `{kid: pem}` document; one bad entry or an empty set rejects the whole set
fn parse_certificates(body: &[u8]) -> Result<HashMap<String, VerificationKey>, KeyStoreError> {
    let certificates: HashMap<String, String> = serde_json::from_slice(body)
        .map_err(|e| KeyStoreError::Unavailable(format!("invalid certificate set: {e}")))?;

    if certificates.is_empty() {
        return Err(KeyStoreError::Unavailable(
            "certificate set contains no keys".to_string(),
        ));
    }

    certificates
        .into_iter()
        .map(|(kid, pem)| {
            VerificationKey::from_certificate_pem(kid.clone(), &pem)
                .map(|key| (kid, key))
                .map_err(KeyStoreError::from)
        })
        .collect()
}

fn not_found(kid: &str) -> KeyStoreError {
    KeyStoreError::NotFound {
        kid: kid.to_string(),
    }
}

fn secs_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
