//! Product catalog collaborator.
//!
//! Guest carts only store ids and quantities; names, prices and images for
//! them come from the catalog.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use cartsync_core::{Price, ProductId};

/// Catalog data for a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Image URLs.
    #[serde(default)]
    pub images: Vec<String>,
}

/// Read-only product lookup.
pub trait Catalog: Send + Sync {
    /// Look up a product by id.
    fn lookup(&self, id: &ProductId) -> Option<CatalogEntry>;
}

/// Catalog that knows nothing; every local item renders without price.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl Catalog for EmptyCatalog {
    fn lookup(&self, _id: &ProductId) -> Option<CatalogEntry> {
        None
    }
}

/// Catalog backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: HashMap<ProductId, CatalogEntry>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product (builder style).
    #[must_use]
    pub fn with_product(
        mut self,
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Price,
    ) -> Self {
        self.insert(CatalogEntry {
            id: id.into(),
            name: name.into(),
            price,
            images: Vec::new(),
        });
        self
    }

    /// Insert or replace a product.
    pub fn insert(&mut self, entry: CatalogEntry) {
        self.products.insert(entry.id.clone(), entry);
    }

    /// Load a catalog from a JSON array of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON array of
    /// `{ id, name, price, images? }` objects.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)?;
        Ok(entries.into_iter().collect())
    }

    /// Number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl FromIterator<CatalogEntry> for InMemoryCatalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for entry in iter {
            catalog.insert(entry);
        }
        catalog
    }
}

impl Catalog for InMemoryCatalog {
    fn lookup(&self, id: &ProductId) -> Option<CatalogEntry> {
        self.products.get(id).cloned()
    }
}

/// Errors loading a catalog file.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Reading the file failed.
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid catalog.
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_lookup() {
        let catalog = InMemoryCatalog::new().with_product("P1", "Pineapple", Price::from_units(500));

        let entry = catalog.lookup(&ProductId::new("P1")).unwrap();
        assert_eq!(entry.name, "Pineapple");
        assert_eq!(entry.price, Price::from_units(500));
        assert!(catalog.lookup(&ProductId::new("P2")).is_none());
        assert!(EmptyCatalog.lookup(&ProductId::new("P1")).is_none());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"P1","name":"Pineapple","price":4.5,"images":["a.png"]}},{{"id":"P2","name":"Mango","price":"3"}}]"#
        )
        .unwrap();

        let catalog = InMemoryCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        let p1 = catalog.lookup(&ProductId::new("P1")).unwrap();
        assert_eq!(p1.price, Price::from_cents(450));
        assert_eq!(p1.images, vec!["a.png".to_string()]);
    }

    #[test]
    fn test_from_json_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            InMemoryCatalog::from_json_file(file.path()),
            Err(CatalogError::Parse(_))
        ));
    }
}
