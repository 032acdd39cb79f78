//! Unified error handling with Sentry integration.
//!
//! Most engine operations never fail outward: remote failures become user
//! notifications and local failures are logged. `CartError` covers what is
//! left, which is building an engine from configuration.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::remote::RemoteSyncError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum CartError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote cart API failure.
    #[error("Remote cart error: {0}")]
    Remote(#[from] RemoteSyncError),

    /// Product catalog could not be loaded.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Set the Sentry user context.
///
/// Call this after sign-in to associate errors with the user.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a cart action.
///
/// Breadcrumbs show up in Sentry reports as the trail of actions leading up
/// to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_error_display() {
        let err = CartError::from(ConfigError::MissingEnvVar("CARTSYNC_API_BASE_URL".to_string()));
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing environment variable: CARTSYNC_API_BASE_URL"
        );

        let err = CartError::from(RemoteSyncError::RateLimited(2));
        assert_eq!(
            err.to_string(),
            "Remote cart error: Rate limited, retry after 2 seconds"
        );
    }
}
