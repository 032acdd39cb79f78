//! Cart reconciliation.
//!
//! Decides which cart is shown. Once a remote cart is available it *replaces*
//! the local one wholesale; the two are never merged. No I/O happens here.

use serde::Serialize;
use tracing::warn;

use cartsync_core::{CartItemId, Price, ProductId, Quantity};

use crate::catalog::Catalog;
use crate::local::LocalCartState;
use crate::remote::RemoteCart;

/// Where the displayed cart came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CartSource {
    Local,
    Remote,
}

/// One line of the displayed cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayCartItem {
    /// Product identifier.
    pub id: ProductId,
    /// Server line id. Only remote lines have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_item_id: Option<CartItemId>,
    pub name: Option<String>,
    /// Unit price, when known.
    pub price: Option<Price>,
    pub images: Vec<String>,
    pub quantity: Quantity,
}

impl DisplayCartItem {
    /// `price × quantity`, or zero when the price is unknown.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.unwrap_or(Price::ZERO).times(self.quantity)
    }
}

/// The cart as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledCart {
    pub source: CartSource,
    pub items: Vec<DisplayCartItem>,
    pub total: Price,
    /// Number of distinct lines (not the sum of quantities).
    pub distinct_count: usize,
}

impl ReconciledCart {
    /// An empty cart from `source`.
    #[must_use]
    pub const fn empty(source: CartSource) -> Self {
        Self {
            source,
            items: Vec::new(),
            total: Price::ZERO,
            distinct_count: 0,
        }
    }

    /// Whether there is nothing to show.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of quantities across lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity.get())).sum()
    }

    /// Find the line for a product.
    #[must_use]
    pub fn find(&self, product_id: &ProductId) -> Option<&DisplayCartItem> {
        self.items.iter().find(|i| &i.id == product_id)
    }
}

/// Produce the cart to display.
///
/// - `remote_enabled` and a fetched remote cart: the remote cart, with the
///   local cart ignored entirely. The total is the server subtotal, or the
///   computed sum when the subtotal is missing or zero.
/// - otherwise (signed out, or the fetch has not returned): the local cart,
///   priced from the catalog.
#[must_use]
pub fn reconcile(
    local: &LocalCartState,
    remote_enabled: bool,
    remote: Option<&RemoteCart>,
    catalog: &dyn Catalog,
) -> ReconciledCart {
    match remote {
        Some(remote) if remote_enabled => from_remote(remote),
        _ => from_local(local, catalog),
    }
}

fn from_remote(remote: &RemoteCart) -> ReconciledCart {
    let items: Vec<DisplayCartItem> = remote
        .items
        .iter()
        .filter_map(|item| {
            let Some(id) = item.product_id.clone() else {
                warn!(cart_item_id = %item.cart_item_id, "Skipping remote cart item without product");
                return None;
            };
            Some(DisplayCartItem {
                id,
                cart_item_id: Some(item.cart_item_id.clone()),
                name: item.name.clone(),
                price: Some(item.price),
                images: item.images.clone(),
                quantity: item.quantity,
            })
        })
        .collect();

    let total = match remote.subtotal {
        Some(subtotal) if !subtotal.is_zero() => subtotal,
        _ => items.iter().map(DisplayCartItem::line_total).sum(),
    };

    ReconciledCart {
        source: CartSource::Remote,
        distinct_count: items.len(),
        items,
        total,
    }
}

fn from_local(local: &LocalCartState, catalog: &dyn Catalog) -> ReconciledCart {
    let items: Vec<DisplayCartItem> = local
        .items()
        .iter()
        .map(|item| {
            let entry = catalog.lookup(&item.id);
            DisplayCartItem {
                id: item.id.clone(),
                cart_item_id: None,
                name: entry.as_ref().map(|e| e.name.clone()),
                price: entry.as_ref().map(|e| e.price),
                images: entry.map(|e| e.images).unwrap_or_default(),
                quantity: item.quantity,
            }
        })
        .collect();

    ReconciledCart {
        source: CartSource::Local,
        distinct_count: items.len(),
        total: items.iter().map(DisplayCartItem::line_total).sum(),
        items,
    }
}
