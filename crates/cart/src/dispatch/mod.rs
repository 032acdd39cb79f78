//! Mutation dispatcher.
//!
//! Every user action follows the same flow:
//! 1. Apply the change to the local cart (optimistic, synchronous)
//! 2. If signed in and the line has a server id, queue the remote call
//! 3. Return immediately; the remote outcome arrives later
//! 4. On remote failure, notify the user. The local change is not rolled back.

mod command;
mod queue;

use std::sync::Arc;

use tracing::{debug, instrument};

use cartsync_core::{ProductId, Quantity};

use crate::auth::AuthHandle;
use crate::error::add_breadcrumb;
use crate::local::LocalCartStore;
use crate::notify::Notifier;
use crate::reconcile::DisplayCartItem;
use crate::remote::RemoteCartClient;

pub use command::{CartCommand, RemoteKey, RemoteOp};
use queue::RemoteQueue;

/// Turns user intents into cart commands and runs them.
///
/// Cheap to clone; clones share the remote queue.
#[derive(Clone)]
pub struct MutationDispatcher {
    store: LocalCartStore,
    auth: AuthHandle,
    queue: Option<Arc<RemoteQueue>>,
}

impl std::fmt::Debug for MutationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationDispatcher")
            .field("remote", &self.queue.is_some())
            .field("pending_remote", &self.pending_remote())
            .finish_non_exhaustive()
    }
}

impl MutationDispatcher {
    /// Create a dispatcher.
    ///
    /// With a remote client this starts the remote worker, so it must be
    /// called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        store: LocalCartStore,
        auth: AuthHandle,
        remote: Option<RemoteCartClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let queue = remote.map(|client| Arc::new(RemoteQueue::spawn(client, notifier)));
        Self { store, auth, queue }
    }

    /// Run a command: local step now, remote step queued.
    ///
    /// Returns whether the command did anything, locally or remotely.
    #[instrument(skip(self), fields(command = command.kind()))]
    pub fn execute(&self, command: CartCommand) -> bool {
        add_breadcrumb("cart", command.kind(), None);

        let changed_locally = command.apply_local(&self.store);

        let remote = match (&self.queue, self.auth.current(), command.remote_op()) {
            (Some(queue), Some(session), Some(op)) => Some((queue, session, op)),
            _ => None,
        };
        let Some((queue, session, op)) = remote else {
            return changed_locally;
        };

        let job_id = queue.enqueue(command, op, session);
        debug!(job_id = %job_id, changed_locally, "Dispatched cart mutation");
        true
    }

    // =========================================================================
    // User intents
    // =========================================================================

    /// Add to the local cart. Quantities below 1 are ignored.
    pub fn add(&self, product_id: &ProductId, quantity: i64) -> bool {
        let Ok(quantity) = Quantity::new(quantity) else {
            debug!(product_id = %product_id, quantity, "Ignoring add with invalid quantity");
            return false;
        };
        self.execute(CartCommand::Add {
            product_id: product_id.clone(),
            quantity,
        })
    }

    /// Increase a line's quantity by one.
    pub fn increment(&self, item: &DisplayCartItem) -> bool {
        item.quantity
            .increment()
            .is_some_and(|quantity| self.set(item, quantity))
    }

    /// Decrease a line's quantity by one. Does nothing at quantity 1.
    pub fn decrement(&self, item: &DisplayCartItem) -> bool {
        item.quantity
            .decrement()
            .is_some_and(|quantity| self.set(item, quantity))
    }

    /// Whether the decrement control should be enabled for `item`.
    #[must_use]
    pub const fn can_decrement(item: &DisplayCartItem) -> bool {
        item.quantity.get() > 1
    }

    /// Set a line's quantity. Quantities below 1 are ignored.
    pub fn set_quantity(&self, item: &DisplayCartItem, quantity: i64) -> bool {
        match Quantity::new(quantity) {
            Ok(quantity) => self.set(item, quantity),
            Err(e) => {
                debug!(product_id = %item.id, error = %e, "Ignoring quantity change");
                false
            }
        }
    }

    /// Set a line's quantity from free-form text.
    ///
    /// Input that is not a positive integer is dropped without feedback.
    pub fn set_quantity_input(&self, item: &DisplayCartItem, input: &str) -> bool {
        match Quantity::parse(input) {
            Ok(quantity) => self.set(item, quantity),
            Err(e) => {
                debug!(product_id = %item.id, input, error = %e, "Ignoring quantity input");
                false
            }
        }
    }

    /// Remove a line.
    pub fn remove(&self, item: &DisplayCartItem) -> bool {
        self.execute(CartCommand::Remove {
            product_id: item.id.clone(),
            cart_item_id: item.cart_item_id.clone(),
        })
    }

    /// Empty the cart.
    pub fn clear(&self) -> bool {
        self.execute(CartCommand::Clear)
    }

    fn set(&self, item: &DisplayCartItem, quantity: Quantity) -> bool {
        if quantity == item.quantity {
            return false;
        }
        self.execute(CartCommand::SetQuantity {
            product_id: item.id.clone(),
            cart_item_id: item.cart_item_id.clone(),
            quantity,
        })
    }

    // =========================================================================
    // Remote queue
    // =========================================================================

    /// Wait for every queued remote call to finish.
    pub async fn flush(&self) {
        if let Some(queue) = &self.queue {
            queue.flush().await;
        }
    }

    /// Number of lines (or the whole cart) with a remote call outstanding.
    #[must_use]
    pub fn pending_remote(&self) -> usize {
        self.queue.as_ref().map_or(0, |queue| queue.pending())
    }
}
