//! Engine façade.
//!
//! `CartEngine` owns every collaborator and is what front ends hold on to:
//! the cart page and badge read through [`CartEngine::display_cart`] and
//! [`CartEngine::watch_local`], and mutate through the dispatcher.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::auth::{AuthHandle, AuthSession};
use crate::catalog::{Catalog, EmptyCatalog, InMemoryCatalog};
use crate::config::CartConfig;
use crate::dispatch::MutationDispatcher;
use crate::error::{CartError, clear_sentry_user, set_sentry_user};
use crate::local::{JsonFilePersistence, LocalCartState, LocalCartStore};
use crate::notify::{Notifier, TracingNotifier};
use crate::reconcile::{ReconciledCart, reconcile};
use crate::remote::RemoteCartClient;

/// The cart synchronization engine.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct CartEngine {
    inner: Arc<CartEngineInner>,
}

struct CartEngineInner {
    store: LocalCartStore,
    auth: AuthHandle,
    remote: Option<RemoteCartClient>,
    catalog: Arc<dyn Catalog>,
    dispatcher: MutationDispatcher,
    /// Cache key of the session whose first remote fetch has completed.
    fetched_for: Mutex<Option<String>>,
}

impl std::fmt::Debug for CartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartEngine")
            .field("store", &self.inner.store)
            .field("authenticated", &self.inner.auth.is_authenticated())
            .field("remote", &self.inner.remote)
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CartEngine`].
pub struct CartEngineBuilder {
    store: LocalCartStore,
    auth: AuthHandle,
    remote: Option<RemoteCartClient>,
    catalog: Arc<dyn Catalog>,
    notifier: Arc<dyn Notifier>,
}

impl CartEngineBuilder {
    /// Use an existing auth handle (default: signed out).
    #[must_use]
    pub fn auth(mut self, auth: AuthHandle) -> Self {
        self.auth = auth;
        self
    }

    /// Enable remote sync through `client`.
    #[must_use]
    pub fn remote(mut self, client: RemoteCartClient) -> Self {
        self.remote = Some(client);
        self
    }

    /// Price local items from `catalog` (default: no prices).
    #[must_use]
    pub fn catalog(mut self, catalog: impl Catalog + 'static) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Deliver user notifications to `notifier` (default: [`TracingNotifier`]).
    #[must_use]
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Build the engine.
    ///
    /// Must be called from within a Tokio runtime when remote sync is enabled.
    #[must_use]
    pub fn build(self) -> CartEngine {
        let dispatcher = MutationDispatcher::new(
            self.store.clone(),
            self.auth.clone(),
            self.remote.clone(),
            self.notifier,
        );

        CartEngine {
            inner: Arc::new(CartEngineInner {
                store: self.store,
                auth: self.auth,
                remote: self.remote,
                catalog: self.catalog,
                dispatcher,
                fetched_for: Mutex::new(None),
            }),
        }
    }
}

impl CartEngine {
    /// Start building an engine around `store`.
    #[must_use]
    pub fn builder(store: LocalCartStore) -> CartEngineBuilder {
        CartEngineBuilder {
            store,
            auth: AuthHandle::guest(),
            remote: None,
            catalog: Arc::new(EmptyCatalog),
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Build an engine from configuration.
    ///
    /// Opens the persisted local cart, loads the catalog if one is
    /// configured, and signs in with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the catalog
    /// file cannot be loaded.
    pub fn from_config(
        config: &CartConfig,
        notifier: impl Notifier + 'static,
    ) -> Result<Self, CartError> {
        let store = LocalCartStore::open(JsonFilePersistence::new(&config.cart_file));

        let mut builder = Self::builder(store).notifier(notifier);

        if let Some(remote) = &config.remote {
            builder = builder.remote(RemoteCartClient::new(remote)?);
        }
        if let Some(path) = &config.catalog_file {
            let catalog = InMemoryCatalog::from_json_file(path)?;
            debug!(products = catalog.len(), "Loaded catalog");
            builder = builder.catalog(catalog);
        }

        let engine = builder.build();
        if let Some(credentials) = &config.credentials {
            engine.sign_in(AuthSession {
                user: credentials.user.as_str().into(),
                token: credentials.token.clone(),
            });
        }
        Ok(engine)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The local cart store.
    #[must_use]
    pub fn store(&self) -> &LocalCartStore {
        &self.inner.store
    }

    /// The auth handle.
    #[must_use]
    pub fn auth(&self) -> &AuthHandle {
        &self.inner.auth
    }

    /// The mutation dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &MutationDispatcher {
        &self.inner.dispatcher
    }

    /// The remote client, if remote sync is configured.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteCartClient> {
        self.inner.remote.as_ref()
    }

    /// Observe local cart changes (badge, cart page).
    #[must_use]
    pub fn watch_local(&self) -> watch::Receiver<LocalCartState> {
        self.inner.store.subscribe()
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// Whether the remote cart is the source of truth right now.
    #[must_use]
    pub fn remote_enabled(&self) -> bool {
        self.inner.remote.is_some() && self.inner.auth.is_authenticated()
    }

    /// Whether the first remote fetch for the current session is outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        if self.inner.remote.is_none() {
            return false;
        }
        let Some(session) = self.inner.auth.current() else {
            return false;
        };
        self.fetched_for().as_deref() != Some(session.cache_key().as_str())
    }

    /// The cart to display.
    ///
    /// When signed in, fetches the remote cart (served from cache when
    /// fresh). A failed fetch is logged and the local cart is shown instead.
    #[instrument(skip(self))]
    pub async fn display_cart(&self) -> ReconciledCart {
        let session = self.inner.auth.current();

        let remote = match (&self.inner.remote, &session) {
            (Some(client), Some(session)) => {
                let result = client.fetch_cart(Some(session)).await;
                *self.lock_fetched_for() = Some(session.cache_key());
                match result {
                    Ok(cart) => cart,
                    Err(e) => {
                        warn!(error = %e, "Failed to fetch remote cart, showing local cart");
                        None
                    }
                }
            }
            _ => None,
        };

        let local = self.inner.store.state();
        reconcile(
            &local,
            self.remote_enabled(),
            remote.as_ref(),
            self.inner.catalog.as_ref(),
        )
    }

    /// Like [`display_cart`](Self::display_cart), bypassing the fetch cache.
    pub async fn refresh(&self) -> ReconciledCart {
        if let (Some(client), Some(session)) = (&self.inner.remote, self.inner.auth.current()) {
            client.invalidate(&session).await;
        }
        self.display_cart().await
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Sign in. The next display fetches the remote cart.
    pub fn sign_in(&self, session: AuthSession) {
        set_sentry_user(&session.user);
        self.inner.auth.sign_in(session);
    }

    /// Sign out, dropping every cached remote cart.
    pub fn sign_out(&self) {
        self.inner.auth.sign_out();
        if let Some(client) = &self.inner.remote {
            client.invalidate_all();
        }
        *self.lock_fetched_for() = None;
        clear_sentry_user();
    }

    /// Wait for queued remote mutations to finish.
    pub async fn flush(&self) {
        self.inner.dispatcher.flush().await;
    }

    fn fetched_for(&self) -> Option<String> {
        self.lock_fetched_for().clone()
    }

    fn lock_fetched_for(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.inner
            .fetched_for
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
