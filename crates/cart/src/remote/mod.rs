//! Remote cart REST client.
//!
//! Uses `reqwest` 0.13 against the cart API and caches `GET /cart` results
//! per session with `moka`. Mutations are never cached and invalidate the
//! session's cached cart when they succeed.

mod types;

use std::sync::Arc;

use moka::future::Cache;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use cartsync_core::{CartItemId, Quantity};

use crate::auth::AuthSession;
use crate::config::{RemoteConfig, bearer};

pub use types::{RemoteCart, RemoteCartItem};
use types::{CartEnvelope, UpdateQuantityRequest, WireErrorBody};

/// Maximum number of sessions with a cached cart.
const CACHE_CAPACITY: u64 = 1_000;

// =============================================================================
// Errors
// =============================================================================

/// Errors from the remote cart API.
#[derive(Debug, Error)]
pub enum RemoteSyncError {
    /// Transport failure (connection refused, timeout, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("API error: {status} - {}", .message.as_deref().unwrap_or("no message"))]
    Api {
        status: u16,
        /// Message from the response body, if the server sent one.
        message: Option<String>,
    },

    /// The server asked us to back off.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// A success response whose body is not a cart.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured base URL cannot be extended with a path.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl RemoteSyncError {
    /// The server-provided message suitable for showing to the user.
    ///
    /// Only API errors carry one; everything else should fall back to a
    /// generic message chosen by the caller.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Api {
                message: Some(message),
                ..
            } => Some(message),
            _ => None,
        }
    }

    /// HTTP status, if the server answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }
}

// =============================================================================
// RemoteCartClient
// =============================================================================

/// Client for the remote cart API.
///
/// Cheap to clone; clones share the HTTP connection pool and the cache.
#[derive(Clone)]
pub struct RemoteCartClient {
    inner: Arc<RemoteCartClientInner>,
}

struct RemoteCartClientInner {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<String, RemoteCart>,
}

impl std::fmt::Debug for RemoteCartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCartClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("cached_sessions", &self.inner.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl RemoteCartClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. the TLS
    /// backend fails to initialize).
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteSyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(config.cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(RemoteCartClientInner {
                client,
                base_url: config.base_url.clone(),
                cache,
            }),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteSyncError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteSyncError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send an authenticated request and return the body of a 2xx response.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        session: &AuthSession,
    ) -> Result<String, RemoteSyncError> {
        let response = request
            .header(AUTHORIZATION, bearer(&session.token))
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteSyncError::RateLimited(retry_after));
        }

        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Cart API returned non-success status"
            );
            let message = serde_json::from_str::<WireErrorBody>(&response_text)
                .ok()
                .and_then(WireErrorBody::into_message);
            return Err(RemoteSyncError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response_text)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Fetch the signed-in user's cart.
    ///
    /// Returns `Ok(None)` without touching the network when there is no
    /// session. Results are cached per session until a mutation succeeds or
    /// the cache TTL expires.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a body
    /// that is not a cart.
    #[instrument(skip(self, session), fields(authenticated = session.is_some()))]
    pub async fn fetch_cart(
        &self,
        session: Option<&AuthSession>,
    ) -> Result<Option<RemoteCart>, RemoteSyncError> {
        let Some(session) = session else {
            return Ok(None);
        };

        let cache_key = session.cache_key();
        if let Some(cart) = self.inner.cache.get(&cache_key).await {
            debug!("Remote cart cache hit");
            return Ok(Some(cart));
        }

        let url = self.endpoint(&["cart"])?;
        let body = self.execute(self.inner.client.get(url), session).await?;

        let envelope: CartEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %body.chars().take(500).collect::<String>(),
                    "Failed to parse cart response"
                );
                return Err(RemoteSyncError::Parse(e));
            }
        };

        let cart = envelope.data.into_remote_cart();
        debug!(items = cart.items.len(), "Fetched remote cart");

        self.inner.cache.insert(cache_key, cart.clone()).await;
        Ok(Some(cart))
    }

    // =========================================================================
    // Mutations (not cached)
    // =========================================================================

    /// Set the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    #[instrument(skip(self, session), fields(item_id = %item_id, quantity = quantity.get()))]
    pub async fn update_item_quantity(
        &self,
        session: &AuthSession,
        item_id: &CartItemId,
        quantity: Quantity,
    ) -> Result<(), RemoteSyncError> {
        let url = self.endpoint(&["cart", "update"])?;
        let request = self.inner.client.patch(url).json(&UpdateQuantityRequest {
            item_id: item_id.as_str(),
            quantity: quantity.get(),
        });

        self.execute(request, session).await?;
        self.invalidate(session).await;
        Ok(())
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    #[instrument(skip(self, session), fields(item_id = %item_id))]
    pub async fn remove_item(
        &self,
        session: &AuthSession,
        item_id: &CartItemId,
    ) -> Result<(), RemoteSyncError> {
        let url = self.endpoint(&["cart", "remove", item_id.as_str()])?;

        self.execute(self.inner.client.delete(url), session).await?;
        self.invalidate(session).await;
        Ok(())
    }

    /// Remove every line from the cart.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    #[instrument(skip(self, session))]
    pub async fn clear_cart(&self, session: &AuthSession) -> Result<(), RemoteSyncError> {
        let url = self.endpoint(&["cart", "clear"])?;

        self.execute(self.inner.client.delete(url), session).await?;
        self.invalidate(session).await;
        Ok(())
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// Drop the cached cart for `session`.
    pub async fn invalidate(&self, session: &AuthSession) {
        self.inner.cache.invalidate(&session.cache_key()).await;
    }

    /// Drop every cached cart (used on sign-out).
    pub fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
    }
}
