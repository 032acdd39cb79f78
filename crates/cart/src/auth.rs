//! Auth collaborator.
//!
//! Authentication itself happens elsewhere; the cart only needs to know
//! whether a `{ user, token }` pair is present, because that alone decides
//! whether the remote cart is enabled.

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;

use cartsync_core::UserId;

/// A signed-in session as seen by the cart.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct AuthSession {
    /// Signed-in user.
    pub user: UserId,
    /// Bearer token for the remote cart API.
    pub token: SecretString,
}

impl AuthSession {
    /// Create a new session.
    #[must_use]
    pub fn new(user: impl Into<UserId>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: SecretString::from(token.into()),
        }
    }

    /// Stable, non-reversible key identifying this session in caches.
    ///
    /// Two sessions share a key only if both user and token match, so a
    /// re-issued token never reads a cart cached under the old one.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("cart:{}:{:016x}", self.user, token_fingerprint(self.token.expose_secret()))
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Fingerprint a token so raw tokens never appear in cache keys.
fn token_fingerprint(token: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}

/// Shared handle to the current auth state.
///
/// Cheaply cloneable; every clone observes the same session.
#[derive(Clone)]
pub struct AuthHandle {
    tx: watch::Sender<Option<AuthSession>>,
}

impl AuthHandle {
    /// Create a handle, optionally already signed in.
    #[must_use]
    pub fn new(session: Option<AuthSession>) -> Self {
        let (tx, _rx) = watch::channel(session);
        Self { tx }
    }

    /// Create a signed-out handle.
    #[must_use]
    pub fn guest() -> Self {
        Self::new(None)
    }

    /// Current session, if signed in.
    #[must_use]
    pub fn current(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    /// Whether a token is present (remote cart enabled).
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Replace the current session.
    pub fn sign_in(&self, session: AuthSession) {
        tracing::info!(user = %session.user, "Signed in");
        self.tx.send_replace(Some(session));
    }

    /// Drop the current session.
    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
    }

    /// Observe session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }
}

impl Default for AuthHandle {
    fn default() -> Self {
        Self::guest()
    }
}

impl std::fmt::Debug for AuthHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHandle")
            .field("session", &*self.tx.borrow())
            .finish()
    }
}
