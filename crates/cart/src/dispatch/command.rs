//! Cart commands.
//!
//! Every user mutation becomes a [`CartCommand`]: an optimistic local step,
//! an optional remote call, and a rule for reporting the remote outcome.

use serde::Serialize;

use cartsync_core::{CartItemId, ProductId, Quantity};

use crate::auth::AuthSession;
use crate::local::{LocalCartAction, LocalCartStore};
use crate::notify::{Notification, Notifier};
use crate::remote::{RemoteCartClient, RemoteSyncError};

/// A user-initiated cart mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartCommand {
    /// Add to the local cart. Never calls the remote API.
    Add {
        product_id: ProductId,
        quantity: Quantity,
    },
    SetQuantity {
        product_id: ProductId,
        cart_item_id: Option<CartItemId>,
        quantity: Quantity,
    },
    Remove {
        product_id: ProductId,
        cart_item_id: Option<CartItemId>,
    },
    Clear,
}

/// Remote call a command issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    UpdateQuantity {
        cart_item_id: CartItemId,
        quantity: Quantity,
    },
    RemoveItem {
        cart_item_id: CartItemId,
    },
    ClearCart,
}

/// What a remote call targets. Calls with the same key may coalesce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteKey {
    Item(CartItemId),
    WholeCart,
}

impl CartCommand {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::SetQuantity { .. } => "set_quantity",
            Self::Remove { .. } => "remove",
            Self::Clear => "clear",
        }
    }

    /// Apply the optimistic local update. Returns whether the local cart changed.
    ///
    /// A signed-in user's lines usually aren't in the local cart, so a no-op
    /// here does not mean the command is void.
    pub fn apply_local(&self, store: &LocalCartStore) -> bool {
        let action = match self {
            Self::Add {
                product_id,
                quantity,
            } => LocalCartAction::Add {
                product_id: product_id.clone(),
                quantity: *quantity,
            },
            Self::SetQuantity {
                product_id,
                quantity,
                ..
            } => LocalCartAction::SetQuantity {
                product_id: product_id.clone(),
                quantity: *quantity,
            },
            Self::Remove { product_id, .. } => LocalCartAction::Remove {
                product_id: product_id.clone(),
            },
            Self::Clear => LocalCartAction::Clear,
        };
        store.dispatch(action)
    }

    /// The remote call to issue, if any.
    ///
    /// Line operations need the server's line id; without one there is
    /// nothing to call. Clearing always targets the whole cart.
    #[must_use]
    pub fn remote_op(&self) -> Option<RemoteOp> {
        match self {
            Self::Add { .. } => None,
            Self::SetQuantity {
                cart_item_id,
                quantity,
                ..
            } => cart_item_id.clone().map(|cart_item_id| RemoteOp::UpdateQuantity {
                cart_item_id,
                quantity: *quantity,
            }),
            Self::Remove { cart_item_id, .. } => cart_item_id
                .clone()
                .map(|cart_item_id| RemoteOp::RemoveItem { cart_item_id }),
            Self::Clear => Some(RemoteOp::ClearCart),
        }
    }

    /// Message shown when the remote call fails without a server message.
    #[must_use]
    pub const fn failure_message(&self) -> &'static str {
        match self {
            Self::Add { .. } | Self::SetQuantity { .. } => "Failed to update cart",
            Self::Remove { .. } => "Failed to remove item",
            Self::Clear => "Failed to clear cart",
        }
    }

    /// Report the remote outcome. Failures notify the user; the optimistic
    /// local change is left as is.
    pub fn reconcile_remote(&self, result: &Result<(), RemoteSyncError>, notifier: &dyn Notifier) {
        let Err(e) = result else {
            return;
        };

        let message = e.user_message().unwrap_or_else(|| self.failure_message());
        tracing::error!(command = self.kind(), error = %e, "Remote cart mutation failed");
        notifier.notify(Notification::error(message));
    }
}

impl RemoteOp {
    /// Coalescing key.
    #[must_use]
    pub fn key(&self) -> RemoteKey {
        match self {
            Self::UpdateQuantity { cart_item_id, .. } | Self::RemoveItem { cart_item_id } => {
                RemoteKey::Item(cart_item_id.clone())
            }
            Self::ClearCart => RemoteKey::WholeCart,
        }
    }

    /// Perform the call.
    ///
    /// # Errors
    ///
    /// Returns whatever the client returns.
    pub async fn execute(
        &self,
        client: &RemoteCartClient,
        session: &AuthSession,
    ) -> Result<(), RemoteSyncError> {
        match self {
            Self::UpdateQuantity {
                cart_item_id,
                quantity,
            } => client.update_item_quantity(session, cart_item_id, *quantity).await,
            Self::RemoveItem { cart_item_id } => client.remove_item(session, cart_item_id).await,
            Self::ClearCart => client.clear_cart(session).await,
        }
    }
}
