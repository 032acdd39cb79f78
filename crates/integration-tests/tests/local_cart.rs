//! Integration tests for the guest cart: file persistence, catalog pricing,
//! and building an engine from configuration.

use std::path::Path;

use serde_json::json;

use cartsync::config::{CartConfig, Credentials, RemoteConfig};
use cartsync::local::{JsonFilePersistence, LocalCartStore};
use cartsync::notify::RecordingNotifier;
use cartsync::{CartEngine, CartSource};
use cartsync_core::{Price, ProductId};
use cartsync_integration_tests::{MockCartServer, cart_body};

fn config(dir: &Path) -> CartConfig {
    CartConfig {
        remote: None,
        credentials: None,
        cart_file: dir.join("cart.json"),
        catalog_file: None,
        sentry_dsn: None,
    }
}

fn write_catalog(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("catalog.json");
    let catalog = json!([
        { "id": "P1", "name": "Pineapple", "price": "4.50", "images": ["p1.jpg"] },
        { "id": "P2", "name": "Mango", "price": 2 }
    ]);
    std::fs::write(&path, catalog.to_string()).expect("write catalog");
    path
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_guest_cart_survives_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = config(dir.path());

    {
        let engine = CartEngine::from_config(&config, RecordingNotifier::new()).expect("engine");
        let dispatcher = engine.dispatcher();
        assert!(dispatcher.add(&ProductId::new("P1"), 2));
        assert!(dispatcher.add(&ProductId::new("P2"), 1));
        assert!(dispatcher.add(&ProductId::new("P1"), 1));
    }

    let engine = CartEngine::from_config(&config, RecordingNotifier::new()).expect("engine");
    let cart = engine.display_cart().await;

    assert_eq!(cart.source, CartSource::Local);
    assert_eq!(cart.distinct_count, 2);
    assert_eq!(cart.find(&ProductId::new("P1")).map(|i| i.quantity.get()), Some(3));
    assert_eq!(cart.find(&ProductId::new("P2")).map(|i| i.quantity.get()), Some(1));
}

#[test]
fn test_clear_is_persisted() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("nested").join("cart.json");

    let store = LocalCartStore::open(JsonFilePersistence::new(&path));
    store.add_item(&ProductId::new("P1"), 4);
    assert!(path.exists());
    assert!(store.clear());

    let reopened = LocalCartStore::open(JsonFilePersistence::new(&path));
    assert!(reopened.state().is_empty());
}

#[test]
fn test_corrupt_cart_file_starts_empty() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("cart.json");
    std::fs::write(&path, "{ not json").expect("write");

    let store = LocalCartStore::open(JsonFilePersistence::new(&path));
    assert!(store.state().is_empty());

    assert!(store.add_item(&ProductId::new("P1"), 1));
    let reopened = LocalCartStore::open(JsonFilePersistence::new(&path));
    assert_eq!(reopened.state().get(&ProductId::new("P1")).map(|q| q.get()), Some(1));
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_local_cart_is_priced_from_catalog_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = config(dir.path());
    config.catalog_file = Some(write_catalog(dir.path()));

    let engine = CartEngine::from_config(&config, RecordingNotifier::new()).expect("engine");
    engine.dispatcher().add(&ProductId::new("P1"), 2);
    engine.dispatcher().add(&ProductId::new("P2"), 3);
    engine.dispatcher().add(&ProductId::new("P3"), 1);

    let cart = engine.display_cart().await;

    assert_eq!(cart.distinct_count, 3);
    assert_eq!(cart.total, Price::from_units(15));
    let p1 = cart.find(&ProductId::new("P1")).expect("P1 in cart");
    assert_eq!(p1.name.as_deref(), Some("Pineapple"));
    assert_eq!(p1.images, vec!["p1.jpg".to_string()]);
    let p3 = cart.find(&ProductId::new("P3")).expect("P3 in cart");
    assert!(p3.price.is_none());

    let view = cart.view();
    assert_eq!(view.subtotal, "$15.00");
    assert_eq!(view.item_count, 3);
}

#[test]
fn test_missing_catalog_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = config(dir.path());
    config.catalog_file = Some(dir.path().join("missing.json"));

    let err = CartEngine::from_config(&config, RecordingNotifier::new())
        .expect_err("missing catalog");
    assert!(matches!(err, cartsync::CartError::Catalog(_)));
}

// =============================================================================
// Configured sign-in
// =============================================================================

#[tokio::test]
async fn test_configured_credentials_use_remote_cart() {
    let server = MockCartServer::start(cart_body(
        json!([{ "product": "P1", "quantity": 3, "price": 500, "_id": "abc" }]),
        json!(1500),
    ))
    .await
    .expect("mock server starts");

    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = config(dir.path());
    config.remote = Some(RemoteConfig::new(server.base_url().expect("url")));
    config.credentials = Some(Credentials {
        user: "u1".to_string(),
        token: "token-1".into(),
    });

    let engine = CartEngine::from_config(&config, RecordingNotifier::new()).expect("engine");
    engine.dispatcher().add(&ProductId::new("P2"), 1);

    let cart = engine.display_cart().await;

    assert_eq!(cart.source, CartSource::Remote);
    assert_eq!(cart.total, Price::from_units(1500));
    assert!(cart.find(&ProductId::new("P2")).is_none());
    assert_eq!(
        server.requests().first().and_then(|r| r.authorization.clone()),
        Some("Bearer token-1".to_string())
    );

    // Local cart is untouched and comes back on sign-out
    engine.sign_out();
    let cart = engine.display_cart().await;
    assert_eq!(cart.source, CartSource::Local);
    assert_eq!(cart.find(&ProductId::new("P2")).map(|i| i.quantity.get()), Some(1));
}
