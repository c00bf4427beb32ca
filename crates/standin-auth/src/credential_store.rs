//! Read-only recovery of the provider's access token from durable storage.
//!
//! The identity-provider client owns these entries; this module never writes
//! them. It exists for the case where the client has torn down its own
//! in-flight request and a caller still needs a bearer token.
//!
//! Tier order: keyring → `STANDIN_AUTH__TOKEN` env → per-origin storage scan.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use standin_config::IdentityConfig;

use crate::error::AuthError;

const KEYRING_USER: &str = "session";
const TOKEN_ENV_VAR: &str = "STANDIN_AUTH__TOKEN";

/// Directory-backed per-origin key/value storage. One file per key.
#[derive(Debug, Clone)]
pub struct OriginStorage {
    root: PathBuf,
}

impl OriginStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<data dir>/standin/origin`.
    #[must_use]
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("standin").join("origin"))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All keys, sorted. A missing root means no keys.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CredentialStore` if the root exists but cannot be read.
    pub fn keys(&self) -> Result<Vec<String>, AuthError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| {
            AuthError::CredentialStore(format!("read {}: {e}", self.root.display()))
        })?;
        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        keys.sort();
        Ok(keys)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.root.join(key))
            .ok()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Naming convention of provider-owned keys (`sb-<project>-auth-token`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialConvention {
    pub prefix: String,
    pub suffix: String,
}

impl Default for CredentialConvention {
    fn default() -> Self {
        Self {
            prefix: "sb-".into(),
            suffix: "-auth-token".into(),
        }
    }
}

impl CredentialConvention {
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        key.len() > self.prefix.len() + self.suffix.len()
            && key.starts_with(&self.prefix)
            && key.ends_with(&self.suffix)
    }
}

/// Scan every key matching `convention` and return the first live token.
///
/// Malformed or expired entries are skipped, not reported.
#[must_use]
pub fn recover_access_token(
    storage: &OriginStorage,
    convention: &CredentialConvention,
) -> Option<String> {
    let keys = match storage.keys() {
        Ok(keys) => keys,
        Err(error) => {
            tracing::debug!(%error, "origin storage unreadable");
            return None;
        }
    };
    keys.iter()
        .filter(|key| convention.matches(key))
        .find_map(|key| {
            let raw = storage.get(key)?;
            let token = extract_live_token(&raw);
            if token.is_none() {
                tracing::debug!(key, "skipping unusable credential entry");
            }
            token
        })
}

/// Pull `access_token` out of a stored session value.
///
/// Accepts the session at the top level or nested under `currentSession`.
/// `expires_at` (unix seconds) wins over the token's own `exp` claim.
fn extract_live_token(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let session = if value.get("access_token").is_some() {
        &value
    } else {
        value.get("currentSession")?
    };
    let token = session["access_token"].as_str().filter(|t| !t.is_empty())?;

    let expires_at = session["expires_at"]
        .as_i64()
        .or_else(|| crate::claims::decode_expiry(token).ok().map(|dt| dt.timestamp()));
    if let Some(exp) = expires_at
        && exp <= Utc::now().timestamp()
    {
        return None;
    }
    Some(token.to_string())
}

/// Tiered, read-only credential accessor.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    keyring_service: String,
    origin: OriginStorage,
    convention: CredentialConvention,
}

impl CredentialStore {
    #[must_use]
    pub fn new(
        keyring_service: impl Into<String>,
        origin: OriginStorage,
        convention: CredentialConvention,
    ) -> Self {
        Self {
            keyring_service: keyring_service.into(),
            origin,
            convention,
        }
    }

    /// Build from the `identity` config section.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CredentialStore` if no storage directory is
    /// configured and the platform has no data directory.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, AuthError> {
        let root = if config.origin_storage_dir.is_empty() {
            OriginStorage::default_root().ok_or_else(|| {
                AuthError::CredentialStore("data directory not found; set origin_storage_dir".into())
            })?
        } else {
            PathBuf::from(&config.origin_storage_dir)
        };
        Ok(Self::new(
            config.keyring_service.clone(),
            OriginStorage::new(root),
            CredentialConvention {
                prefix: config.credential_prefix.clone(),
                suffix: config.credential_suffix.clone(),
            },
        ))
    }

    /// Load a token. Priority: keyring → env → origin storage.
    #[must_use]
    pub fn load(&self) -> Option<String> {
        if let Some(token) = self.load_keyring() {
            return Some(token);
        }

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR)
            && !token.is_empty()
        {
            return Some(token);
        }

        recover_access_token(&self.origin, &self.convention)
    }

    /// Keyring values may be a raw token or a serialized session.
    fn load_keyring(&self) -> Option<String> {
        let entry = match keyring::Entry::new(&self.keyring_service, KEYRING_USER) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!(%error, "keyring unavailable");
                return None;
            }
        };
        let stored = entry.get_password().ok().filter(|t| !t.trim().is_empty())?;
        if stored.trim_start().starts_with('{') {
            extract_live_token(&stored)
        } else {
            Some(stored)
        }
    }
}
