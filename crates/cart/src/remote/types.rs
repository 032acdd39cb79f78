//! Remote cart types.
//!
//! The `Wire*` types mirror the REST payload exactly; [`RemoteCart`] is the
//! cleaned-up domain view handed to the reconciler.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use cartsync_core::{CartItemId, Price, ProductId, Quantity};

// =============================================================================
// Domain Types
// =============================================================================

/// A line of the server-side cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCartItem {
    /// Server line id (`_id` on the wire).
    pub cart_item_id: CartItemId,
    /// Product this line refers to; `None` is a dangling reference.
    pub product_id: Option<ProductId>,
    pub name: Option<String>,
    /// Unit price.
    pub price: Price,
    pub images: Vec<String>,
    pub quantity: Quantity,
}

/// The server-side cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteCart {
    pub items: Vec<RemoteCartItem>,
    /// Server-computed subtotal, if the server sent one.
    pub subtotal: Option<Price>,
}

// =============================================================================
// Wire Types
// =============================================================================

/// `GET /cart` response body.
#[derive(Debug, Deserialize)]
pub(crate) struct CartEnvelope {
    pub data: WireCart,
}

/// Items stay untyped until conversion so one malformed line cannot fail
/// the whole cart.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireCart {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub subtotal: Option<Price>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCartItem {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub product: Option<WireProductRef>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub images: Option<Vec<WireImage>>,
    #[serde(default)]
    pub image: Option<WireImage>,
    pub quantity: i64,
}

/// The `product` field is either a bare id or a populated product document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireProductRef {
    Id(String),
    Populated(WireProduct),
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProduct {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub images: Option<Vec<WireImage>>,
}

/// Images arrive either as URL strings or as `{ url }` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireImage {
    Url(String),
    Object { url: String },
}

impl WireImage {
    fn into_url(self) -> String {
        match self {
            Self::Url(url) | Self::Object { url } => url,
        }
    }
}

/// `PATCH /cart/update` request body.
#[derive(Debug, Serialize)]
pub(crate) struct UpdateQuantityRequest<'a> {
    #[serde(rename = "itemId")]
    pub item_id: &'a str,
    pub quantity: u32,
}

/// Error body some endpoints return alongside a non-2xx status.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl WireCartItem {
    /// Decode one raw item, or `None` if it does not have the item shape.
    fn decode(raw: serde_json::Value) -> Option<Self> {
        let id = raw.get("_id").and_then(serde_json::Value::as_str).map(String::from);
        match serde_json::from_value(raw) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(cart_item_id = ?id, error = %e, "Dropping malformed remote cart item");
                None
            }
        }
    }

    /// Resolve the wire item, or `None` if its quantity is unusable.
    fn into_item(self) -> Option<RemoteCartItem> {
        let Ok(quantity) = Quantity::new(self.quantity) else {
            warn!(cart_item_id = %self.id, quantity = self.quantity, "Remote cart item has invalid quantity");
            return None;
        };

        let (product_id, product) = match self.product {
            Some(WireProductRef::Id(id)) if !id.trim().is_empty() => (Some(ProductId::new(id)), None),
            Some(WireProductRef::Populated(p)) => {
                let id = p.id.clone().filter(|id| !id.trim().is_empty()).map(ProductId::new);
                (id, Some(p))
            }
            _ => (None, None),
        };

        let name = self
            .name
            .or_else(|| product.as_ref().and_then(|p| p.name.clone()));
        let price = self
            .price
            .or_else(|| product.as_ref().and_then(|p| p.price))
            .unwrap_or(Price::ZERO);

        let mut images: Vec<String> = self
            .images
            .or_else(|| product.and_then(|p| p.images))
            .unwrap_or_default()
            .into_iter()
            .map(WireImage::into_url)
            .collect();
        if images.is_empty()
            && let Some(image) = self.image
        {
            images.push(image.into_url());
        }

        Some(RemoteCartItem {
            cart_item_id: CartItemId::new(self.id),
            product_id,
            name,
            price,
            images,
            quantity,
        })
    }
}

impl WireCart {
    /// Convert to the domain cart, dropping items the reconciler cannot use.
    ///
    /// Malformed items, items without a resolvable product id, with an
    /// invalid quantity, or repeating an earlier `_id` are excluded and logged as data-integrity
    /// warnings. They are never surfaced to the user.
    pub fn into_remote_cart(self) -> RemoteCart {
        let mut seen = HashSet::new();
        let items = self
            .items
            .into_iter()
            .filter_map(WireCartItem::decode)
            .filter_map(WireCartItem::into_item)
            .filter(|item| {
                if item.product_id.is_none() {
                    warn!(
                        cart_item_id = %item.cart_item_id,
                        "Dropping remote cart item with missing product reference"
                    );
                    return false;
                }
                if !seen.insert(item.cart_item_id.clone()) {
                    warn!(cart_item_id = %item.cart_item_id, "Dropping duplicate remote cart item");
                    return false;
                }
                true
            })
            .collect();

        RemoteCart {
            items,
            subtotal: self.subtotal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: serde_json::Value) -> RemoteCart {
        serde_json::from_value::<CartEnvelope>(value)
            .unwrap()
            .data
            .into_remote_cart()
    }

    #[test]
    fn test_parses_documented_shape() {
        let cart = parse(json!({
            "data": {
                "items": [{
                    "product": "P1",
                    "name": "Pineapple",
                    "price": 500,
                    "images": ["a.png"],
                    "image": "b.png",
                    "quantity": 3,
                    "_id": "abc"
                }],
                "subtotal": 1500
            }
        }));

        assert_eq!(cart.subtotal, Some(Price::from_units(1500)));
        assert_eq!(cart.items.len(), 1);
        let item = &cart.items[0];
        assert_eq!(item.cart_item_id, CartItemId::new("abc"));
        assert_eq!(item.product_id, Some(ProductId::new("P1")));
        assert_eq!(item.name.as_deref(), Some("Pineapple"));
        assert_eq!(item.price, Price::from_units(500));
        assert_eq!(item.images, vec!["a.png".to_string()]);
        assert_eq!(item.quantity.get(), 3);
    }

    #[test]
    fn test_drops_null_and_missing_products() {
        let cart = parse(json!({
            "data": {
                "items": [
                    { "product": null, "price": 1, "quantity": 1, "_id": "a" },
                    { "price": 1, "quantity": 1, "_id": "b" },
                    { "product": "", "price": 1, "quantity": 1, "_id": "c" },
                    { "product": "P4", "price": 1, "quantity": 1, "_id": "d" }
                ],
                "subtotal": 4
            }
        }));

        let ids: Vec<_> = cart.items.iter().map(|i| i.cart_item_id.as_str()).collect();
        assert_eq!(ids, vec!["d"]);
    }

    #[test]
    fn test_populated_product_supplies_missing_fields() {
        let cart = parse(json!({
            "data": {
                "items": [{
                    "product": { "_id": "P1", "name": "Pineapple", "price": 4.25, "images": [{ "url": "p.png" }] },
                    "quantity": 2,
                    "_id": "abc"
                }]
            }
        }));

        let item = &cart.items[0];
        assert_eq!(item.product_id, Some(ProductId::new("P1")));
        assert_eq!(item.name.as_deref(), Some("Pineapple"));
        assert_eq!(item.price, Price::from_cents(425));
        assert_eq!(item.images, vec!["p.png".to_string()]);
        assert_eq!(cart.subtotal, None);
    }

    #[test]
    fn test_populated_product_without_id_is_dangling() {
        let cart = parse(json!({
            "data": { "items": [{ "product": { "name": "Ghost" }, "quantity": 1, "_id": "x" }] }
        }));
        assert!(cart.items.is_empty());
    }

    #[test]
    fn test_single_image_used_when_images_empty() {
        let cart = parse(json!({
            "data": { "items": [{ "product": "P1", "images": [], "image": "only.png", "quantity": 1, "_id": "x" }] }
        }));
        assert_eq!(cart.items[0].images, vec!["only.png".to_string()]);
    }

    #[test]
    fn test_drops_invalid_quantity_and_duplicates() {
        let cart = parse(json!({
            "data": {
                "items": [
                    { "product": "P1", "quantity": 0, "_id": "a" },
                    { "product": "P2", "quantity": 1, "_id": "b" },
                    { "product": "P3", "quantity": 5, "_id": "b" }
                ]
            }
        }));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].product_id, Some(ProductId::new("P2")));
    }

    #[test]
    fn test_malformed_item_is_dropped_alone() {
        let cart = parse(json!({
            "data": {
                "items": [
                    { "product": "P1", "price": 5, "quantity": 1, "_id": "good" },
                    { "product": 42, "price": 5, "quantity": 1, "_id": "bad" },
                    { "product": "P3", "price": 5, "quantity": "two", "_id": "worse" },
                    "not an object"
                ],
                "subtotal": 5
            }
        }));

        let ids: Vec<_> = cart.items.iter().map(|i| i.cart_item_id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
        assert_eq!(cart.subtotal, Some(Price::from_units(5)));
    }

    #[test]
    fn test_large_quantity_is_kept() {
        let cart = parse(json!({
            "data": { "items": [{ "product": "P1", "price": 1, "quantity": 10000, "_id": "abc" }] }
        }));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity.get(), 10_000);
    }

    #[test]
    fn test_update_request_wire_shape() {
        let body = serde_json::to_value(UpdateQuantityRequest {
            item_id: "abc",
            quantity: 5,
        })
        .unwrap();
        assert_eq!(body, json!({ "itemId": "abc", "quantity": 5 }));
    }

    #[test]
    fn test_error_body_message() {
        let body: WireErrorBody = serde_json::from_value(json!({ "message": " Out of stock " })).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Out of stock"));

        let body: WireErrorBody = serde_json::from_value(json!({ "error": "Nope" })).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Nope"));

        assert_eq!(WireErrorBody::default().into_message(), None);
    }
}
