//! Integration test support for cartsync.
//!
//! Provides [`MockCartServer`], an `axum` implementation of the cart REST
//! API bound to an ephemeral local port. It records every request and can be
//! told to fail mutations, so tests drive the real `reqwest` client end to
//! end.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{delete, get, patch},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use cartsync::config::RemoteConfig;
use cartsync::remote::{RemoteCartClient, RemoteSyncError};

// =============================================================================
// Recorded traffic
// =============================================================================

/// A request the mock server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    /// Raw (still percent-encoded) request path.
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

/// How mutation endpoints should fail.
#[derive(Debug, Clone)]
pub struct Failure {
    pub status: u16,
    pub body: Option<Value>,
    pub retry_after: Option<u64>,
}

impl Failure {
    /// Fail with `status` and an empty body.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self {
            status,
            body: None,
            retry_after: None,
        }
    }

    /// Fail with `status` and `{ "message": message }`.
    #[must_use]
    pub fn with_message(status: u16, message: &str) -> Self {
        Self {
            status,
            body: Some(json!({ "success": false, "message": message })),
            retry_after: None,
        }
    }

    /// Fail with 429 and a `Retry-After` header.
    #[must_use]
    pub const fn rate_limited(retry_after: u64) -> Self {
        Self {
            status: 429,
            body: None,
            retry_after: Some(retry_after),
        }
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = match self.body {
            Some(body) => (status, Json(body)).into_response(),
            None => status.into_response(),
        };
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// =============================================================================
// Server
// =============================================================================

#[derive(Default)]
struct MockState {
    cart: Mutex<Value>,
    requests: Mutex<Vec<RecordedRequest>>,
    failure: Mutex<Option<Failure>>,
}

impl MockState {
    fn record(&self, method: &'static str, uri: &Uri, headers: &HeaderMap, body: Option<Value>) {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        lock(&self.requests).push(RecordedRequest {
            method,
            path: uri.path().to_string(),
            authorization,
            body,
        });
    }

    fn failure(&self) -> Option<Response> {
        lock(&self.failure).clone().map(Failure::into_response)
    }

    /// Apply `f` to the `data.items` array, then recompute the subtotal.
    fn edit_items(&self, f: impl FnOnce(&mut Vec<Value>)) {
        let mut cart = lock(&self.cart);
        let Some(data) = cart.get_mut("data").and_then(Value::as_object_mut) else {
            return;
        };
        if let Some(items) = data.get_mut("items").and_then(Value::as_array_mut) {
            f(items);
        }

        let subtotal: f64 = data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        let price = item.get("price").and_then(Value::as_f64).unwrap_or(0.0);
                        let quantity = item.get("quantity").and_then(Value::as_f64).unwrap_or(0.0);
                        price * quantity
                    })
                    .sum()
            })
            .unwrap_or(0.0);
        data.insert("subtotal".to_string(), json!(subtotal));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn success() -> Response {
    Json(json!({ "success": true })).into_response()
}

async fn get_cart(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    state.record("GET", &uri, &headers, None);
    Json(lock(&state.cart).clone()).into_response()
}

async fn update_item(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("PATCH", &uri, &headers, Some(body.clone()));
    if let Some(failure) = state.failure() {
        return failure;
    }

    let item_id = body.get("itemId").and_then(Value::as_str).unwrap_or_default();
    let quantity = body.get("quantity").cloned().unwrap_or(Value::Null);
    state.edit_items(|items| {
        for item in items.iter_mut() {
            if item.get("_id").and_then(Value::as_str) == Some(item_id)
                && let Some(obj) = item.as_object_mut()
            {
                obj.insert("quantity".to_string(), quantity.clone());
            }
        }
    });
    success()
}

async fn remove_item(
    State(state): State<Arc<MockState>>,
    Path(item_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record("DELETE", &uri, &headers, None);
    if let Some(failure) = state.failure() {
        return failure;
    }

    state.edit_items(|items| {
        items.retain(|item| item.get("_id").and_then(Value::as_str) != Some(item_id.as_str()));
    });
    success()
}

async fn clear_cart(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    state.record("DELETE", &uri, &headers, None);
    if let Some(failure) = state.failure() {
        return failure;
    }

    state.edit_items(Vec::clear);
    success()
}

/// Mock cart REST API.
///
/// The server task is aborted when the value is dropped.
pub struct MockCartServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockCartServer {
    /// Start serving `cart` (a full `GET /cart` body) on `127.0.0.1:0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(cart: Value) -> std::io::Result<Self> {
        let state = Arc::new(MockState {
            cart: Mutex::new(cart),
            ..Default::default()
        });

        let app = Router::new()
            .route("/cart", get(get_cart))
            .route("/cart/update", patch(update_item))
            .route("/cart/remove/{item_id}", delete(remove_item))
            .route("/cart/clear", delete(clear_cart))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log_server_exit(&e);
            }
        });

        Ok(Self { addr, state, task })
    }

    /// Base URL of the mock API.
    ///
    /// # Errors
    ///
    /// Never fails for a bound socket address; the `Result` mirrors `Url::parse`.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}/", self.addr))
    }

    /// A client pointed at this server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn client(&self) -> Result<RemoteCartClient, RemoteSyncError> {
        let base_url = self
            .base_url()
            .map_err(|e| RemoteSyncError::InvalidUrl(e.to_string()))?;
        RemoteCartClient::new(&RemoteConfig::new(base_url))
    }

    /// Everything received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }

    /// Received requests excluding cart fetches.
    #[must_use]
    pub fn mutations(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method != "GET")
            .collect()
    }

    /// Number of `GET /cart` requests received.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.requests().iter().filter(|r| r.method == "GET").count()
    }

    /// Make every mutation fail with `failure` (or succeed again with `None`).
    pub fn set_failure(&self, failure: Option<Failure>) {
        *lock(&self.state.failure) = failure;
    }

    /// Current server-side cart body.
    #[must_use]
    pub fn cart(&self) -> Value {
        lock(&self.state.cart).clone()
    }
}

impl Drop for MockCartServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[allow(clippy::print_stderr)]
fn log_server_exit(error: &std::io::Error) {
    eprintln!("mock cart server stopped: {error}");
}

/// A `GET /cart` body with the given items.
#[must_use]
pub fn cart_body(items: Value, subtotal: Value) -> Value {
    json!({ "data": { "items": items, "subtotal": subtotal } })
}
