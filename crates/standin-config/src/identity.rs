//! Identity provider and credential recovery configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_init_timeout_secs() -> u64 {
    10
}

fn default_keyring_service() -> String {
    "standin".into()
}

fn default_credential_prefix() -> String {
    "sb-".into()
}

fn default_credential_suffix() -> String {
    "-auth-token".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Upper bound on how long startup waits for the provider before the
    /// loading flag is cleared anyway.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,

    /// Identity provider base URL.
    #[serde(default)]
    pub provider_url: String,

    /// Public API key sent alongside provider requests.
    #[serde(default)]
    pub api_key: String,

    /// Keyring service holding the provider's persisted session token.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,

    /// Key prefix of provider-owned entries in per-origin storage.
    #[serde(default = "default_credential_prefix")]
    pub credential_prefix: String,

    /// Key suffix of provider-owned entries in per-origin storage.
    #[serde(default = "default_credential_suffix")]
    pub credential_suffix: String,

    /// Directory backing per-origin storage. Empty = `<data dir>/standin/origin`.
    #[serde(default)]
    pub origin_storage_dir: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: default_init_timeout_secs(),
            provider_url: String::new(),
            api_key: String::new(),
            keyring_service: default_keyring_service(),
            credential_prefix: default_credential_prefix(),
            credential_suffix: default_credential_suffix(),
            origin_storage_dir: String::new(),
        }
    }
}

impl IdentityConfig {
    #[must_use]
    pub const fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Check if the provider endpoint is set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.provider_url.is_empty() && !self.api_key.is_empty()
    }
}
