//! # standin-config
//!
//! Layered configuration loading for Standin using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`STANDIN_*` prefix, `__` as separator)
//! 2. Project-level `.standin/config.toml`
//! 3. User-level `~/.config/standin/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `STANDIN_AUTHORITY__BASE_URL` -> `authority.base_url`,
//! `STANDIN_IDENTITY__INIT_TIMEOUT_SECS` -> `identity.init_timeout_secs`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use standin_config::StandinConfig;
//!
//! let config = StandinConfig::load_with_dotenv().expect("config");
//! if config.authority.is_configured() {
//!     println!("authority: {}", config.authority.base_url);
//! }
//! ```

mod authority;
mod error;
mod identity;
mod session;

pub use authority::AuthorityConfig;
pub use error::ConfigError;
pub use identity::IdentityConfig;
pub use session::SessionConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StandinConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl StandinConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if any source fails to parse, or
    /// `ConfigError::InvalidValue` if the result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer extra providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".standin/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment.merge(Env::prefixed("STANDIN_").split("__"))
    }

    /// Reject values that would break the identity bootstrap.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero init timeout or an empty
    /// storage key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.init_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "identity.init_timeout_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        if self.session.storage_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.storage_key".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Fail unless the remote authority section is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotConfigured` naming the `authority` section.
    pub fn require_authority(&self) -> Result<&AuthorityConfig, ConfigError> {
        if self.authority.is_configured() {
            Ok(&self.authority)
        } else {
            Err(ConfigError::NotConfigured {
                section: "authority".into(),
            })
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("standin").join("config.toml"))
    }

    /// Load `.env` from the workspace root.
    ///
    /// Walks up from `CARGO_MANIFEST_DIR` (if available), then falls back to
    /// the current directory. Silently does nothing if no `.env` is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}
