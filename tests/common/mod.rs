//! Shared test infrastructure for integration tests.
//!
//! Provides application state builders over both store implementations,
//! request constructors, and body helpers used across all integration
//! test modules.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Method, Request};
use site_api::{AppState, BoxBody, Config, MemoryStore, SqliteStore};

/// A synthetic client address used in all test invocations.
const TEST_CLIENT_ADDR: &str = "192.168.1.100:54321";

/// The canonical hostname every test config uses.
pub const TEST_HOSTNAME: &str = "example.dev";

/// Initializes a tracing subscriber for test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

pub fn test_addr() -> SocketAddr {
    TEST_CLIENT_ADDR.parse().unwrap()
}

fn test_config() -> Config {
    Config {
        site_hostname: Some(TEST_HOSTNAME.into()),
        ip_salt: Some("integration-test-salt".into()),
        ..Default::default()
    }
}

/// Builds application state over the in-memory store.
pub fn memory_state() -> Arc<AppState> {
    let config = test_config()
        .into_runtime()
        .expect("test config must be valid");
    let store = Arc::new(MemoryStore::new());
    Arc::new(AppState::new(Arc::new(config), store.clone(), store))
}

/// Builds application state over a throwaway SQLite database. The
/// returned guard keeps the database directory alive.
pub fn sqlite_state() -> (Arc<AppState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = test_config()
        .into_runtime()
        .expect("test config must be valid");
    let store = SqliteStore::open(&dir.path().join("test.db")).expect("failed to open store");
    let kv = Arc::new(store.clone());
    let entries = Arc::new(store);
    (
        Arc::new(AppState::new(Arc::new(config), kv, entries)),
        dir,
    )
}

/// Builds a bodyless request for the given method and path.
pub fn empty_request(method: Method, path: &str) -> Request<Empty<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Empty::new())
        .expect("test request must build")
}

/// Builds a bodyless request carrying an `Origin` header for the site.
pub fn site_request(method: Method, path: &str) -> Request<Empty<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("origin", format!("https://{TEST_HOSTNAME}"))
        .body(Empty::new())
        .expect("test request must build")
}

/// Builds a JSON POST to the given path.
pub fn post_json(path: &str, value: &serde_json::Value) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(value.to_string())))
        .expect("test request must build")
}

/// A guestbook submission payload with the given name and message.
pub fn submission(name: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "name": name, "message": message })
}

/// Collects a [`BoxBody`] into [`Bytes`], mapping any body error to a
/// descriptive panic so test assertions remain concise.
pub async fn collect_body(body: BoxBody) -> Bytes {
    body.collect()
        .await
        .expect("failed to collect response body")
        .to_bytes()
}

/// Collects a response body and parses it as JSON.
pub async fn body_json(body: BoxBody) -> serde_json::Value {
    let bytes = collect_body(body).await;
    serde_json::from_slice(&bytes).expect("response body must be JSON")
}
