//! Local (guest) cart store.
//!
//! # Architecture
//!
//! - One store instance per session, injected wherever it is needed
//! - State lives in a `tokio::sync::watch` channel: `state()` snapshots it,
//!   `subscribe()` observes every committed change, `dispatch()` mutates it
//! - Every change is written through a [`CartPersistence`] backend
//!
//! Operations never fail. Invalid quantities are validation errors that
//! leave the state untouched, and persistence failures are logged while the
//! in-memory cart stays authoritative.

mod persistence;

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use cartsync_core::{Price, ProductId, Quantity};

use crate::catalog::Catalog;

pub use persistence::{CartPersistence, JsonFilePersistence, MemoryPersistence, PersistError};

/// A product and its quantity in the local cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCartItem {
    /// Product identifier (`id` in the persisted shape).
    pub id: ProductId,
    pub quantity: Quantity,
}

/// Snapshot of the local cart.
///
/// Items keep insertion order; ids are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCartState {
    items: Vec<LocalCartItem>,
}

impl LocalCartState {
    /// Build a state from items, keeping the first entry for a repeated id.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = LocalCartItem>) -> Self {
        let mut state = Self::default();
        for item in items {
            if state.get(&item.id).is_none() {
                state.items.push(item);
            }
        }
        state
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LocalCartItem] {
        &self.items
    }

    /// Quantity stored for a product.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<Quantity> {
        self.items
            .iter()
            .find(|item| &item.id == id)
            .map(|item| item.quantity)
    }

    /// Number of distinct products.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Sum of `price × quantity`, with prices from the catalog.
    ///
    /// Products the catalog does not know contribute nothing.
    #[must_use]
    pub fn total_price(&self, catalog: &dyn Catalog) -> Price {
        self.items
            .iter()
            .filter_map(|item| {
                let entry = catalog.lookup(&item.id);
                if entry.is_none() {
                    debug!(product_id = %item.id, "No catalog price for cart item");
                }
                entry.map(|e| e.price.times(item.quantity))
            })
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply an action, returning whether anything changed.
    fn apply(&mut self, action: &LocalCartAction) -> bool {
        match action {
            LocalCartAction::Add {
                product_id,
                quantity,
            } => {
                if let Some(item) = self.items.iter_mut().find(|i| &i.id == product_id) {
                    // Overflow is rejected like any other out-of-range quantity
                    let Some(updated) = item.quantity.checked_add(*quantity) else {
                        return false;
                    };
                    item.quantity = updated;
                    true
                } else {
                    self.items.push(LocalCartItem {
                        id: product_id.clone(),
                        quantity: *quantity,
                    });
                    true
                }
            }
            LocalCartAction::SetQuantity {
                product_id,
                quantity,
            } => match self.items.iter_mut().find(|i| &i.id == product_id) {
                Some(item) if item.quantity != *quantity => {
                    item.quantity = *quantity;
                    true
                }
                _ => false,
            },
            LocalCartAction::Remove { product_id } => {
                let before = self.items.len();
                self.items.retain(|i| &i.id != product_id);
                self.items.len() != before
            }
            LocalCartAction::Clear => {
                let changed = !self.items.is_empty();
                self.items.clear();
                changed
            }
        }
    }
}

/// A state transition of the local cart.
///
/// Quantities are already validated, so every action is applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCartAction {
    /// Add `quantity` to a product, inserting it if absent.
    Add {
        product_id: ProductId,
        quantity: Quantity,
    },
    /// Set the quantity of a product already in the cart.
    SetQuantity {
        product_id: ProductId,
        quantity: Quantity,
    },
    /// Remove a product regardless of quantity.
    Remove { product_id: ProductId },
    /// Empty the cart.
    Clear,
}

/// The local cart store.
///
/// Cheaply cloneable; clones share state, subscribers and persistence.
#[derive(Clone)]
pub struct LocalCartStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: watch::Sender<LocalCartState>,
    // Held across snapshot + save so the newest state is always the last one written
    persistence: Mutex<Box<dyn CartPersistence>>,
}

impl LocalCartStore {
    /// Open a store, loading whatever the backend has saved.
    ///
    /// A backend that fails to load yields an empty cart.
    #[must_use]
    pub fn open(persistence: impl CartPersistence + 'static) -> Self {
        let items = persistence.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load persisted cart, starting empty");
            Vec::new()
        });
        debug!(items = items.len(), "Opened local cart");

        let (state, _rx) = watch::channel(LocalCartState::from_items(items));
        Self {
            inner: Arc::new(StoreInner {
                state,
                persistence: Mutex::new(Box::new(persistence)),
            }),
        }
    }

    /// Open a store that is never written anywhere.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(MemoryPersistence::new())
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> LocalCartState {
        self.inner.state.borrow().clone()
    }

    /// Observe committed state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LocalCartState> {
        self.inner.state.subscribe()
    }

    /// Apply an action. Returns whether the state changed.
    ///
    /// Subscribers are only woken, and the backend only written, on change.
    pub fn dispatch(&self, action: LocalCartAction) -> bool {
        let changed = self.inner.state.send_if_modified(|state| state.apply(&action));
        if changed {
            debug!(?action, "Local cart updated");
            self.persist();
        }
        changed
    }

    fn persist(&self) {
        let persistence = self
            .inner
            .persistence
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.state();
        if let Err(e) = persistence.save(snapshot.items()) {
            warn!(error = %e, "Failed to persist local cart, keeping in-memory state");
        }
    }

    // =========================================================================
    // Named operations (validate raw input, then dispatch)
    // =========================================================================

    /// Add `quantity` of a product. A quantity below 1 is a no-op.
    pub fn add_item(&self, product_id: &ProductId, quantity: i64) -> bool {
        match Quantity::new(quantity) {
            Ok(quantity) => self.dispatch(LocalCartAction::Add {
                product_id: product_id.clone(),
                quantity,
            }),
            Err(e) => {
                debug!(product_id = %product_id, error = %e, "Ignoring add");
                false
            }
        }
    }

    /// Set a product's quantity. A quantity below 1, or an absent product,
    /// leaves the cart unchanged.
    pub fn update_quantity(&self, product_id: &ProductId, quantity: i64) -> bool {
        match Quantity::new(quantity) {
            Ok(quantity) => self.dispatch(LocalCartAction::SetQuantity {
                product_id: product_id.clone(),
                quantity,
            }),
            Err(e) => {
                debug!(product_id = %product_id, error = %e, "Ignoring quantity update");
                false
            }
        }
    }

    /// Remove a product regardless of quantity.
    pub fn remove_item(&self, product_id: &ProductId) -> bool {
        self.dispatch(LocalCartAction::Remove {
            product_id: product_id.clone(),
        })
    }

    /// Empty the cart.
    pub fn clear(&self) -> bool {
        self.dispatch(LocalCartAction::Clear)
    }

    /// Number of distinct products.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.inner.state.borrow().total_items()
    }

    /// Sum of `price × quantity`, with prices from the catalog.
    #[must_use]
    pub fn total_price(&self, catalog: &dyn Catalog) -> Price {
        self.inner.state.borrow().total_price(catalog)
    }
}

impl std::fmt::Debug for LocalCartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCartStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;

    fn pid(id: &str) -> ProductId {
        ProductId::new(id)
    }

    #[test]
    fn test_add_inserts_then_increases() {
        let store = LocalCartStore::in_memory();
        assert!(store.add_item(&pid("P1"), 2));
        assert!(store.add_item(&pid("P1"), 3));
        assert!(store.add_item(&pid("P2"), 1));

        let state = store.state();
        assert_eq!(state.get(&pid("P1")).map(Quantity::get), Some(5));
        assert_eq!(state.total_items(), 2);
        assert_eq!(state.items()[0].id, pid("P1"));
    }

    #[test]
    fn test_add_below_one_is_noop() {
        let store = LocalCartStore::in_memory();
        assert!(!store.add_item(&pid("P1"), 0));
        assert!(!store.add_item(&pid("P1"), -2));
        assert!(store.state().is_empty());
    }

    #[test]
    fn test_update_quantity_below_one_never_changes_state() {
        let store = LocalCartStore::in_memory();
        store.add_item(&pid("P1"), 2);
        let before = store.state();

        assert!(!store.update_quantity(&pid("P1"), 0));
        assert!(!store.update_quantity(&pid("P1"), -1));
        assert_eq!(store.state(), before);
    }

    #[test]
    fn test_update_quantity_sets_value() {
        let store = LocalCartStore::in_memory();
        store.add_item(&pid("P1"), 2);
        assert!(store.update_quantity(&pid("P1"), 5));
        assert_eq!(store.state().get(&pid("P1")).map(Quantity::get), Some(5));
        // Same value again is not a change
        assert!(!store.update_quantity(&pid("P1"), 5));
    }

    #[test]
    fn test_large_quantities_are_stored_not_clamped() {
        let store = LocalCartStore::in_memory();
        store.add_item(&pid("P1"), 2);

        assert!(store.update_quantity(&pid("P1"), 10_000));
        assert_eq!(store.state().get(&pid("P1")).map(Quantity::get), Some(10_000));

        assert!(store.update_quantity(&pid("P1"), i64::from(u32::MAX)));
        let before = store.state();
        assert!(!store.add_item(&pid("P1"), 1));
        assert!(!store.update_quantity(&pid("P1"), i64::from(u32::MAX) + 1));
        assert_eq!(store.state(), before);
    }

    #[test]
    fn test_update_quantity_does_not_insert() {
        let store = LocalCartStore::in_memory();
        assert!(!store.update_quantity(&pid("P9"), 3));
        assert_eq!(store.total_items(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = LocalCartStore::in_memory();
        store.add_item(&pid("P1"), 7);
        store.add_item(&pid("P2"), 1);

        assert!(store.remove_item(&pid("P1")));
        assert!(!store.remove_item(&pid("P1")));
        assert_eq!(store.total_items(), 1);

        assert!(store.clear());
        assert!(!store.clear());
        assert_eq!(store.total_items(), 0);
    }

    #[test]
    fn test_total_items_counts_distinct_products() {
        let store = LocalCartStore::in_memory();
        let ops: [(&str, i64); 8] = [
            ("A", 1),
            ("B", 3),
            ("A", 2),
            ("C", 0),
            ("D", -1),
            ("B", 1),
            ("E", 4),
            ("C", 1),
        ];
        for (id, qty) in ops {
            store.add_item(&pid(id), qty);
        }
        store.update_quantity(&pid("E"), 0);
        store.remove_item(&pid("B"));

        let state = store.state();
        let distinct: std::collections::HashSet<_> =
            state.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(state.total_items(), distinct.len());
        assert_eq!(state.total_items(), 3);
        assert!(state.items().iter().all(|i| i.quantity.get() >= 1));
    }

    #[test]
    fn test_total_price_excludes_removed_item() {
        let catalog = InMemoryCatalog::new()
            .with_product("P1", "Pineapple", Price::from_units(4))
            .with_product("P2", "Mango", Price::from_cents(250));
        let store = LocalCartStore::in_memory();
        store.add_item(&pid("P1"), 2);
        store.add_item(&pid("P2"), 2);
        store.add_item(&pid("UNKNOWN"), 1);
        assert_eq!(store.total_price(&catalog), Price::from_units(13));

        store.remove_item(&pid("P1"));
        assert_eq!(store.total_price(&catalog), Price::from_units(5));
    }

    #[test]
    fn test_subscribers_see_changes_only() {
        let store = LocalCartStore::in_memory();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.update_quantity(&pid("P1"), 0);
        assert!(!rx.has_changed().unwrap());

        store.add_item(&pid("P1"), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().total_items(), 1);
    }

    #[test]
    fn test_state_survives_reopen() {
        let persistence = MemoryPersistence::new();
        let store = LocalCartStore::open(persistence.clone());
        assert!(persistence.saved().is_none(), "nothing written before first mutation");

        store.add_item(&pid("P1"), 2);
        store.add_item(&pid("P2"), 1);

        let reopened = LocalCartStore::open(persistence);
        assert_eq!(reopened.state(), store.state());
    }

    #[test]
    fn test_file_backed_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");

        let store = LocalCartStore::open(JsonFilePersistence::new(&path));
        assert!(!path.exists());
        store.add_item(&pid("P1"), 3);
        assert!(path.exists());

        let reopened = LocalCartStore::open(JsonFilePersistence::new(&path));
        assert_eq!(reopened.state(), store.state());
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = LocalCartStore::open(JsonFilePersistence::new(&path));
        assert_eq!(store.total_items(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let store = LocalCartStore::in_memory();
        let other = store.clone();
        other.add_item(&pid("P1"), 1);
        assert_eq!(store.total_items(), 1);
    }
}
