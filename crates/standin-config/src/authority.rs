//! Remote impersonation authority configuration.

use serde::{Deserialize, Serialize};

fn default_start_rpc() -> String {
    "start_impersonation".into()
}

fn default_end_rpc() -> String {
    "end_impersonation".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthorityConfig {
    /// Base URL of the data API exposing the RPCs.
    #[serde(default)]
    pub base_url: String,

    /// API key sent as the `apikey` header.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_start_rpc")]
    pub start_rpc: String,

    #[serde(default = "default_end_rpc")]
    pub end_rpc: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            start_rpc: default_start_rpc(),
            end_rpc: default_end_rpc(),
        }
    }
}

impl AuthorityConfig {
    /// Check if the authority has the minimum required fields.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }
}
