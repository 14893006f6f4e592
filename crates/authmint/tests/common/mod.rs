//! Common test utilities for integration tests
//!
//! Fixture keys, a certificate transport that counts its fetches, and helpers
//! for signing ID tokens the way the identity provider would.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use authmint::codec::{self, JwtHeader};
use authmint::{
    AuthClient, FetchedKeys, KeyFetchTransport, KeyStore, KeyStoreConfig, MockClock, SigningKey,
    TransportError,
};
use serde_json::{Value, json};

pub const PROJECT_ID: &str = "mock-project-id";
pub const SIGNER_EMAIL: &str = "mock-email@mock-project.iam.gserviceaccount.com";
pub const ISSUER: &str = "https://securetoken.google.com/mock-project-id";
pub const NOW: i64 = 1_700_000_000;
pub const CERT_URL: &str = "https://keys.example.com/certs";

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key_pkcs8.pem");
pub const SIGNING_KEY_PKCS1_PEM: &str = include_str!("../fixtures/signing_key_pkcs1.pem");
pub const SIGNING_KEY_PKCS1_DER: &[u8] = include_bytes!("../fixtures/signing_key_pkcs1.der");
pub const SIGNING_KEY_PKCS8_DER: &[u8] = include_bytes!("../fixtures/signing_key_pkcs8.der");
pub const SIGNING_CERT_PEM: &str = include_str!("../fixtures/signing_cert.pem");
pub const SIGNING_PUBLIC_PEM: &str = include_str!("../fixtures/signing_public.pem");
pub const OTHER_KEY_PEM: &str = include_str!("../fixtures/other_key.pem");
pub const OTHER_CERT_PEM: &str = include_str!("../fixtures/other_cert.pem");
pub const SERVICE_ACCOUNT_JSON: &str = include_str!("../fixtures/service_account.json");

/// Serialize a `{kid: pem}` certificate set
pub fn cert_set(entries: &[(&str, &str)]) -> Vec<u8> {
    let map: serde_json::Map<String, Value> = entries
        .iter()
        .map(|(kid, pem)| ((*kid).to_string(), json!(pem)))
        .collect();
    serde_json::to_vec(&map).expect("certificate set serializes")
}

/// Certificate transport with a swappable response, optional latency and a fetch counter
pub struct CountingTransport {
    response: Mutex<Result<FetchedKeys, u16>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl CountingTransport {
    /// Serve `body` with the given `max-age`
    pub fn serving(body: Vec<u8>, max_age: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(FetchedKeys { body, max_age })),
            delay: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Serve the fixture signing certificate under `kid`
    pub fn with_signing_cert(kid: &str) -> Arc<Self> {
        Self::serving(cert_set(&[(kid, SIGNING_CERT_PEM)]), None)
    }

    /// Fail every fetch with an HTTP status
    pub fn failing(status: u16) -> Arc<Self> {
        let transport = Self::serving(Vec::new(), None);
        transport.fail_with(status);
        transport
    }

    pub fn set_response(&self, body: Vec<u8>, max_age: Option<Duration>) {
        *self.response.lock().expect("lock") = Ok(FetchedKeys { body, max_age });
    }

    pub fn fail_with(&self, status: u16) {
        *self.response.lock().expect("lock") = Err(status);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("lock") = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyFetchTransport for CountingTransport {
    async fn fetch(&self, _url: &str) -> Result<FetchedKeys, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.response
            .lock()
            .expect("lock")
            .clone()
            .map_err(|status| TransportError::Status { status })
    }
}

pub fn key_store(transport: Arc<CountingTransport>, clock: &MockClock) -> KeyStore {
    key_store_with_config(transport, clock, KeyStoreConfig::default())
}

pub fn key_store_with_config(
    transport: Arc<CountingTransport>,
    clock: &MockClock,
    config: KeyStoreConfig,
) -> KeyStore {
    KeyStore::new(CERT_URL, transport, Arc::new(clock.clone()), config)
}

/// Client for `PROJECT_ID` that can both mint and verify
pub fn client(transport: Arc<CountingTransport>, clock: &MockClock) -> AuthClient {
    AuthClient::builder()
        .project_id(PROJECT_ID)
        .signer(SIGNER_EMAIL, signing_key())
        .transport(transport)
        .clock(Arc::new(clock.clone()))
        .cert_url(CERT_URL)
        .build()
        .expect("client builds")
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_pem(SIGNING_KEY_PEM).expect("fixture key parses")
}

/// A valid ID token payload for `PROJECT_ID` at `NOW`, with `overrides` applied
pub fn id_token_claims(overrides: Value) -> Value {
    let mut claims = json!({
        "iss": ISSUER,
        "aud": PROJECT_ID,
        "iat": NOW - 60,
        "exp": NOW + 3540,
        "sub": "alice",
        "auth_time": NOW - 60,
        "firebase": {"sign_in_provider": "custom", "identities": {}},
    });
    if let (Some(base), Some(extra)) = (claims.as_object_mut(), overrides.as_object()) {
        for (name, value) in extra {
            base.insert(name.clone(), value.clone());
        }
    }
    claims
}

/// Sign `claims` with `key_pem` under header `kid`
pub fn sign_token(kid: Option<&str>, claims: &Value, key_pem: &str) -> String {
    let mut header = JwtHeader::rs256();
    if let Some(kid) = kid {
        header = header.with_kid(kid);
    }
    sign_with_header(&header, claims, key_pem)
}

pub fn sign_with_header(header: &JwtHeader, claims: &Value, key_pem: &str) -> String {
    let key = SigningKey::from_pem(key_pem).expect("key parses");
    codec::encode(header, claims, &key).expect("token encodes")
}

/// A valid ID token signed with the fixture key under `kid`
pub fn id_token(kid: &str, overrides: Value) -> String {
    sign_token(Some(kid), &id_token_claims(overrides), SIGNING_KEY_PEM)
}
