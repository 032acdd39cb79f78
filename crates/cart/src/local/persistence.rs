//! Persistence backends for the local cart.
//!
//! The persisted shape is `{ "cart": [{ "id": productId, "quantity": n }] }`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use cartsync_core::{ProductId, Quantity};

use super::LocalCartItem;

/// Errors raised by a persistence backend.
///
/// These never escape the store: a failed load starts an empty cart and a
/// failed save keeps the in-memory state authoritative.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Reading or writing the backing file failed.
    #[error("cart file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not a valid persisted cart.
    #[error("cart file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage for the local cart's items.
pub trait CartPersistence: Send + Sync {
    /// Load previously saved items. A cart that was never saved loads empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage exists but cannot be read.
    fn load(&self) -> Result<Vec<LocalCartItem>, PersistError>;

    /// Replace the saved items.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, items: &[LocalCartItem]) -> Result<(), PersistError>;
}

/// On-disk representation. Quantities are read as raw integers so a single
/// bad entry can be dropped without discarding the whole cart.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCart<C> {
    cart: C,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    quantity: i64,
}

/// Keep valid, unique entries from a raw persisted cart.
fn sanitize(raw: Vec<RawItem>) -> Vec<LocalCartItem> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|item| {
            let Ok(quantity) = Quantity::new(item.quantity) else {
                warn!(product_id = %item.id, quantity = item.quantity, "Dropping persisted cart entry with invalid quantity");
                return None;
            };
            if !seen.insert(item.id.clone()) {
                warn!(product_id = %item.id, "Dropping duplicate persisted cart entry");
                return None;
            }
            Some(LocalCartItem {
                id: ProductId::new(item.id),
                quantity,
            })
        })
        .collect()
}

/// Persists the cart as a JSON file.
///
/// The file is only created by the first save, and every save goes through
/// a temporary file and a rename so a crash never leaves half a cart behind.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    /// Create a backend for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CartPersistence for JsonFilePersistence {
    fn load(&self) -> Result<Vec<LocalCartItem>, PersistError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted cart yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let persisted: PersistedCart<Vec<RawItem>> = serde_json::from_str(&raw)?;
        Ok(sanitize(persisted.cart))
    }

    fn save(&self, items: &[LocalCartItem]) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_vec_pretty(&PersistedCart { cart: items })?;
        let temp = self.temp_path();
        std::fs::write(&temp, body)?;
        std::fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), items = items.len(), "Persisted cart");
        Ok(())
    }
}

/// Keeps the "persisted" cart in memory.
///
/// Clones share storage, so a second store opened on a clone sees what the
/// first one saved, like a page reload would.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    saved: Arc<Mutex<Option<Vec<LocalCartItem>>>>,
}

impl MemoryPersistence {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What was last saved, or `None` if nothing was ever saved.
    #[must_use]
    pub fn saved(&self) -> Option<Vec<LocalCartItem>> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CartPersistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<LocalCartItem>, PersistError> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, items: &[LocalCartItem]) -> Result<(), PersistError> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(items.to_vec());
        Ok(())
    }
}
