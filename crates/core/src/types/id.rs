//! Newtype IDs for type-safe cart references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing a product id with a remote cart line id.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use cartsync_core::define_id;
/// define_id!(SkuId);
/// define_id!(WarehouseId);
///
/// let sku = SkuId::new("SKU-1");
/// let warehouse = WarehouseId::new("SKU-1");
///
/// // These are different types, so this won't compile:
/// // let _: SkuId = warehouse;
/// assert_eq!(sku.as_str(), warehouse.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Catalog product identifier; the key of the local cart.
define_id!(ProductId);
// Server-assigned identifier of a line in the remote cart (`_id` on the wire).
define_id!(CartItemId);
// Authenticated user identifier.
define_id!(UserId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_conversions() {
        let id = ProductId::new("P1");
        assert_eq!(id.to_string(), "P1");
        assert_eq!(id.as_str(), "P1");
        assert_eq!(ProductId::from("P1"), id);
        assert_eq!(String::from(id), "P1");
    }

    #[test]
    fn test_id_serde_is_transparent() {
        let id = CartItemId::new("abc");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"abc\"");

        let parsed: CartItemId = serde_json::from_str("\"abc\"").expect("deserialize");
        assert_eq!(parsed, id);
    }
}
