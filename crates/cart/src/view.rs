//! Display-ready view of a reconciled cart.
//!
//! Everything here is already formatted; renderers only lay it out.

use serde::Serialize;

use cartsync_core::Price;

use crate::dispatch::MutationDispatcher;
use crate::reconcile::{CartSource, DisplayCartItem, ReconciledCart};

/// Cart item display data.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    /// Product id.
    pub id: String,
    /// Remote line id, for signed-in carts.
    pub line_id: Option<String>,
    pub title: String,
    pub quantity: u32,
    /// Unit price, or `None` if unknown.
    pub price: Option<String>,
    pub line_price: String,
    pub image: Option<String>,
    /// Whether the decrement control should be enabled.
    pub can_decrement: bool,
}

/// Cart display data.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub source: CartSource,
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    /// Number of distinct lines.
    pub item_count: usize,
}

impl CartView {
    /// Create an empty cart.
    #[must_use]
    pub fn empty(source: CartSource) -> Self {
        Self {
            source,
            items: Vec::new(),
            subtotal: format_price(Price::ZERO),
            item_count: 0,
        }
    }
}

// =============================================================================
// Type Conversions
// =============================================================================

fn format_price(price: Price) -> String {
    price.display()
}

impl ReconciledCart {
    /// Display-formatted view of this cart.
    #[must_use]
    pub fn view(&self) -> CartView {
        CartView::from(self)
    }
}

impl From<&ReconciledCart> for CartView {
    fn from(cart: &ReconciledCart) -> Self {
        Self {
            source: cart.source,
            items: cart.items.iter().map(CartItemView::from).collect(),
            subtotal: format_price(cart.total),
            item_count: cart.distinct_count,
        }
    }
}

impl From<&DisplayCartItem> for CartItemView {
    fn from(item: &DisplayCartItem) -> Self {
        Self {
            id: item.id.to_string(),
            line_id: item.cart_item_id.as_ref().map(ToString::to_string),
            title: item.name.clone().unwrap_or_else(|| item.id.to_string()),
            quantity: item.quantity.get(),
            price: item.price.map(format_price),
            line_price: format_price(item.line_total()),
            image: item.images.first().cloned(),
            can_decrement: MutationDispatcher::can_decrement(item),
        }
    }
}
