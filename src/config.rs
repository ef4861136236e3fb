//! Environment-driven configuration for the identity subsystem.
//! Everything has a usable default so tests and local runs need no setup.

use std::path::PathBuf;
use tracing::info;

/// Settings consumed by the login flows and the credential cache.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Product brand, used as the prefix of generated patient usernames
    /// ("<brand>@<mobile>").
    pub brand: String,
    /// Directory holding the durable per-device credential cache.
    pub cache_dir: PathBuf,
}

impl AuthConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let brand = std::env::var("CLINAUTH_BRAND").unwrap_or_else(|_| "clinauth".to_string());
        let cache_dir = std::env::var("CLINAUTH_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".clinauth"));
        let cfg = Self { brand, cache_dir };
        info!(target: "clinauth::config", "config: brand='{}' cache_dir='{}'", cfg.brand, cfg.cache_dir.display());
        cfg
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { brand: "clinauth".to_string(), cache_dir: PathBuf::from(".clinauth") }
    }
}
