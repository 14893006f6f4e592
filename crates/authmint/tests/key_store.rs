//! Key cache robustness tests
//!
//! Tests cover:
//! - Single-flight refresh under concurrent cache misses
//! - Expiry driven by the fetched cache lifetime and the default lifetime
//! - Falling back to unexpired keys when a refresh fails
//! - Key rotation and wholesale replacement of the key set
//! - Fetch timeouts

mod common;

use std::time::Duration;

use authmint::{KeyStoreConfig, KeyStoreError, MockClock};
use common::*;

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_share_one_fetch() {
    // GIVEN: a slow endpoint and an empty cache
    let transport = CountingTransport::with_signing_cert("k1");
    transport.set_delay(Duration::from_millis(200));
    let store = key_store(transport.clone(), &MockClock::at_unix(NOW));

    // WHEN: several lookups miss at the same time
    let (a, b, c) = tokio::join!(store.get_key("k1"), store.get_key("k1"), store.get_key("k1"));

    // THEN: all succeed from a single fetch
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(transport.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_cache_and_inflight_refresh() {
    let transport = CountingTransport::with_signing_cert("k1");
    transport.set_delay(Duration::from_millis(50));
    let store = key_store(transport.clone(), &MockClock::at_unix(NOW));
    let other = store.clone();

    let handle = tokio::spawn(async move { other.get_key("k1").await });
    let local = store.get_key("k1").await;
    let remote = handle.await.unwrap();

    assert!(local.is_ok() && remote.is_ok());
    assert_eq!(transport.fetches(), 1);
}

#[tokio::test]
async fn test_short_lifetime_forces_refetch() {
    let transport = CountingTransport::serving(
        cert_set(&[("k1", SIGNING_CERT_PEM)]),
        Some(Duration::from_secs(60)),
    );
    let clock = MockClock::at_unix(NOW);
    let store = key_store(transport.clone(), &clock);

    store.get_key("k1").await.unwrap();
    clock.advance_secs(59);
    store.get_key("k1").await.unwrap();
    assert_eq!(transport.fetches(), 1);

    clock.advance_secs(1);
    store.get_key("k1").await.unwrap();
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test]
async fn test_missing_lifetime_uses_default() {
    let transport = CountingTransport::with_signing_cert("k1");
    let clock = MockClock::at_unix(NOW);
    let config = KeyStoreConfig {
        default_cache_ttl_secs: 300,
        ..KeyStoreConfig::default()
    };
    let store = key_store_with_config(transport.clone(), &clock, config);

    store.get_key("k1").await.unwrap();
    clock.advance_secs(299);
    store.get_key("k1").await.unwrap();
    assert_eq!(transport.fetches(), 1);

    clock.advance_secs(1);
    store.get_key("k1").await.unwrap();
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test]
async fn test_lifetime_capped_by_config() {
    let transport = CountingTransport::serving(
        cert_set(&[("k1", SIGNING_CERT_PEM)]),
        Some(Duration::from_secs(1_000_000)),
    );
    let clock = MockClock::at_unix(NOW);
    let config = KeyStoreConfig {
        max_cache_ttl_secs: 120,
        ..KeyStoreConfig::default()
    };
    let store = key_store_with_config(transport.clone(), &clock, config);

    store.get_key("k1").await.unwrap();
    clock.advance_secs(120);
    store.get_key("k1").await.unwrap();
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test]
async fn test_failed_refresh_keeps_unexpired_keys() {
    // GIVEN: a cached set that is still valid but old enough to refresh for rotation
    let transport = CountingTransport::with_signing_cert("k1");
    let clock = MockClock::at_unix(NOW);
    let store = key_store(transport.clone(), &clock);
    store.get_key("k1").await.unwrap();
    clock.advance_secs(30);

    // WHEN: the endpoint starts failing and an unknown kid forces a refresh
    transport.fail_with(503);
    let err = store.get_key("k2").await.unwrap_err();

    // THEN: the failure is absorbed and the prior keys keep serving
    assert_eq!(err, KeyStoreError::NotFound { kid: "k2".to_string() });
    assert_eq!(transport.fetches(), 2);
    assert!(store.get_key("k1").await.is_ok());
    assert_eq!(store.cached_key_ids(), vec!["k1".to_string()]);
}

#[tokio::test]
async fn test_failed_refresh_after_expiry_is_unavailable() {
    let transport = CountingTransport::serving(
        cert_set(&[("k1", SIGNING_CERT_PEM)]),
        Some(Duration::from_secs(60)),
    );
    let clock = MockClock::at_unix(NOW);
    let store = key_store(transport.clone(), &clock);
    store.get_key("k1").await.unwrap();

    transport.fail_with(500);
    clock.advance_secs(61);
    let err = store.get_key("k1").await.unwrap_err();
    assert!(matches!(err, KeyStoreError::Unavailable(msg) if msg.contains("500")));
}

#[tokio::test]
async fn test_unknown_kid_in_young_set_does_not_refetch() {
    let transport = CountingTransport::with_signing_cert("k1");
    let clock = MockClock::at_unix(NOW);
    let store = key_store(transport.clone(), &clock);
    store.get_key("k1").await.unwrap();

    clock.advance_secs(1);
    for _ in 0..3 {
        let err = store.get_key("unknown").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }
    assert_eq!(transport.fetches(), 1);
}

#[tokio::test]
async fn test_rotation_replaces_set_wholesale() {
    let transport = CountingTransport::with_signing_cert("k1");
    let clock = MockClock::at_unix(NOW);
    let store = key_store(transport.clone(), &clock);
    store.get_key("k1").await.unwrap();

    // provider rotates: k1 retired, k2 published
    transport.set_response(cert_set(&[("k2", OTHER_CERT_PEM)]), None);
    clock.advance_secs(10);

    let key = store.get_key("k2").await.unwrap();
    assert_eq!(key.kid(), "k2");
    assert_eq!(store.cached_key_ids(), vec!["k2".to_string()]);
    assert_eq!(transport.fetches(), 2);

    // k1 is gone, and the fresh set is not refetched for it
    let err = store.get_key("k1").await.unwrap_err();
    assert_eq!(err, KeyStoreError::NotFound { kid: "k1".to_string() });
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test]
async fn test_bad_certificate_rejects_whole_set() {
    let transport = CountingTransport::serving(
        cert_set(&[("k1", SIGNING_CERT_PEM), ("k2", "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n")]),
        None,
    );
    let store = key_store(transport.clone(), &MockClock::at_unix(NOW));

    let err = store.get_key("k1").await.unwrap_err();
    assert!(matches!(err, KeyStoreError::Unavailable(_)));
    assert!(store.cached_key_ids().is_empty());
}

#[tokio::test]
async fn test_empty_set_is_unavailable() {
    let transport = CountingTransport::serving(cert_set(&[]), None);
    let store = key_store(transport, &MockClock::at_unix(NOW));

    let err = store.get_key("k1").await.unwrap_err();
    assert!(matches!(err, KeyStoreError::Unavailable(msg) if msg.contains("no keys")));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_leaves_cache_untouched() {
    let transport = CountingTransport::with_signing_cert("k1");
    transport.set_delay(Duration::from_secs(60));
    let config = KeyStoreConfig {
        fetch_timeout_secs: 2,
        ..KeyStoreConfig::default()
    };
    let store = key_store_with_config(transport.clone(), &MockClock::at_unix(NOW), config);

    let err = store.get_key("k1").await.unwrap_err();
    assert!(matches!(err, KeyStoreError::Unavailable(msg) if msg.contains("timed out")));
    assert!(store.cached_key_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_keeps_previous_keys() {
    // GIVEN: k1 cached and old enough that an unknown kid triggers a refresh
    let transport = CountingTransport::with_signing_cert("k1");
    let clock = MockClock::at_unix(NOW);
    let config = KeyStoreConfig {
        fetch_timeout_secs: 2,
        ..KeyStoreConfig::default()
    };
    let store = key_store_with_config(transport.clone(), &clock, config);
    store.get_key("k1").await.unwrap();
    clock.advance_secs(30);

    // WHEN: the rotation refresh hangs past the fetch timeout
    transport.set_response(cert_set(&[("k2", OTHER_CERT_PEM)]), None);
    transport.set_delay(Duration::from_secs(60));
    let err = store.get_key("k2").await.unwrap_err();

    // THEN: the old set is untouched and keeps serving
    assert_eq!(err, KeyStoreError::NotFound { kid: "k2".to_string() });
    assert_eq!(transport.fetches(), 2);
    assert_eq!(store.cached_key_ids(), vec!["k1".to_string()]);
    assert_eq!(store.get_key("k1").await.unwrap().kid(), "k1");
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let transport = CountingTransport::with_signing_cert("k1");
    let store = key_store(transport.clone(), &MockClock::at_unix(NOW));

    store.get_key("k1").await.unwrap();
    store.invalidate();
    store.get_key("k1").await.unwrap();
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test]
async fn test_failed_refresh_is_not_cached() {
    let transport = CountingTransport::failing(503);
    let store = key_store(transport.clone(), &MockClock::at_unix(NOW));

    assert!(store.get_key("k1").await.is_err());
    transport.set_response(cert_set(&[("k1", SIGNING_CERT_PEM)]), None);
    assert!(store.get_key("k1").await.is_ok());
    assert_eq!(transport.fetches(), 2);
}
