//! Session-scoped storage configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_storage_key() -> String {
    "impersonation_session".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Root of session-scoped storage. Empty = system temp dir.
    #[serde(default)]
    pub storage_dir: String,

    /// Key (file stem) of the impersonation record.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Identifier of the browsing context (tab). Records never cross tabs.
    #[serde(default)]
    pub tab_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_dir: String::new(),
            storage_key: default_storage_key(),
            tab_id: String::new(),
        }
    }
}

impl SessionConfig {
    /// Directory that holds this tab's records.
    #[must_use]
    pub fn tab_dir(&self) -> PathBuf {
        let root = if self.storage_dir.is_empty() {
            std::env::temp_dir().join("standin-session")
        } else {
            PathBuf::from(&self.storage_dir)
        };
        let tab = if self.tab_id.is_empty() {
            "default"
        } else {
            self.tab_id.as_str()
        };
        root.join(tab)
    }
}
