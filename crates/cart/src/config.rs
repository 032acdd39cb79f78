//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional. Without `CARTSYNC_API_BASE_URL` the engine
//! runs as a guest-only cart and never touches the network.
//!
//! - `CARTSYNC_API_BASE_URL` - REST backend serving `/cart` (enables remote sync)
//! - `CARTSYNC_AUTH_TOKEN` - Bearer token of the signed-in user
//! - `CARTSYNC_USER` - User id paired with the token (default: me)
//! - `CARTSYNC_CART_FILE` - Persisted local cart (default: cart.json)
//! - `CARTSYNC_CATALOG_FILE` - JSON product catalog used to price guest carts
//! - `CARTSYNC_REQUEST_TIMEOUT_SECS` - HTTP timeout (default: 10)
//! - `CARTSYNC_CART_CACHE_TTL_SECS` - Remote cart fetch cache TTL (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_CART_FILE: &str = "cart.json";
const DEFAULT_USER: &str = "me";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CART_CACHE_TTL_SECS: u64 = 30;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace-me",
    "placeholder",
    "insert-",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Remote cart API configuration; `None` disables remote sync entirely
    pub remote: Option<RemoteConfig>,
    /// Credentials to sign in with at startup
    pub credentials: Option<Credentials>,
    /// Where the local cart is persisted
    pub cart_file: PathBuf,
    /// Optional catalog file used to price local-only items
    pub catalog_file: Option<PathBuf>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Remote cart REST API configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the REST backend (e.g., <https://api.example.com/v1/>)
    pub base_url: Url,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// How long a fetched cart is served from cache
    pub cache_ttl: Duration,
}

impl RemoteConfig {
    /// Create a remote configuration with default timeout and cache TTL.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        ensure_trailing_slash(&mut base_url);
        Self {
            base_url,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CART_CACHE_TTL_SECS),
        }
    }
}

/// Sign-in credentials supplied through the environment.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct Credentials {
    /// User the token belongs to
    pub user: String,
    /// Bearer token
    pub token: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, if the
    /// auth token fails validation (blank or placeholder), or if a token is
    /// set without `CARTSYNC_API_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let remote = RemoteConfig::from_env()?;
        let credentials = match get_optional_env("CARTSYNC_AUTH_TOKEN") {
            Some(token) => {
                validate_token(&token, "CARTSYNC_AUTH_TOKEN")?;
                Some(Credentials {
                    user: get_env_or_default("CARTSYNC_USER", DEFAULT_USER),
                    token: SecretString::from(token),
                })
            }
            None => None,
        };
        require_remote_for_credentials(remote.as_ref(), credentials.as_ref())?;

        Ok(Self {
            remote,
            credentials,
            cart_file: PathBuf::from(get_env_or_default("CARTSYNC_CART_FILE", DEFAULT_CART_FILE)),
            catalog_file: get_optional_env("CARTSYNC_CATALOG_FILE").map(PathBuf::from),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }

    /// Whether remote sync can ever be enabled with this configuration.
    #[must_use]
    pub const fn remote_configured(&self) -> bool {
        self.remote.is_some()
    }
}

impl RemoteConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(raw) = get_optional_env("CARTSYNC_API_BASE_URL") else {
            return Ok(None);
        };
        let base_url = parse_base_url(&raw, "CARTSYNC_API_BASE_URL")?;

        Ok(Some(Self {
            base_url,
            request_timeout: get_secs(
                "CARTSYNC_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            cache_ttl: get_secs("CARTSYNC_CART_CACHE_TTL_SECS", DEFAULT_CART_CACHE_TTL_SECS)?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Get a duration in whole seconds.
fn get_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    get_optional_env(key).map_or(Ok(Duration::from_secs(default)), |raw| {
        raw.trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse a base URL and make sure relative joins land under it.
fn parse_base_url(raw: &str, var_name: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    ensure_trailing_slash(&mut url);
    Ok(url)
}

/// `Url::join` replaces the last segment unless the path ends with '/'.
fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
}

/// A token is only usable against a remote API.
fn require_remote_for_credentials(
    remote: Option<&RemoteConfig>,
    credentials: Option<&Credentials>,
) -> Result<(), ConfigError> {
    if credentials.is_some() && remote.is_none() {
        return Err(ConfigError::MissingEnvVar("CARTSYNC_API_BASE_URL".to_string()));
    }
    Ok(())
}

/// Validate that a token is not blank and not an obvious placeholder.
fn validate_token(token: &str, var_name: &str) -> Result<(), ConfigError> {
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "must not contain whitespace".to_string(),
        ));
    }

    let lower = token.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Expose a credential token for request headers.
pub(crate) fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
