//! Session-scoped storage of the impersonation record.
//!
//! One record, one key. It survives reloads of the same tab and is never
//! shared across tabs. `start` writes it as a checkpoint before switching
//! tenants; `restore` reads it back as input to reconciliation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use standin_config::SessionConfig;
use standin_core::session::ImpersonationSession;

use crate::error::SessionError;

pub trait SessionStorage: Send + Sync {
    /// The persisted record, if any.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the record exists but is unreadable
    /// or fails validation.
    fn load(&self) -> Result<Option<ImpersonationSession>, SessionError>;

    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the record cannot be written.
    fn save(&self, session: &ImpersonationSession) -> Result<(), SessionError>;

    /// Remove the record. Removing an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the record exists but cannot be removed.
    fn clear(&self) -> Result<(), SessionError>;
}

fn decode(raw: &str) -> Result<ImpersonationSession, SessionError> {
    let session: ImpersonationSession = serde_json::from_str(raw)
        .map_err(|e| SessionError::Storage(format!("corrupt session record: {e}")))?;
    session
        .validate()
        .map_err(|e| SessionError::Storage(format!("invalid session record: {e}")))?;
    Ok(session)
}

fn encode(session: &ImpersonationSession) -> Result<String, SessionError> {
    serde_json::to_string(session)
        .map_err(|e| SessionError::Storage(format!("serialize session record: {e}")))
}

/// JSON file in the tab's directory (`<storage_dir>/<tab_id>/<key>.json`).
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    #[must_use]
    pub fn new(tab_dir: &Path, key: &str) -> Self {
        Self {
            path: tab_dir.join(format!("{key}.json")),
        }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.tab_dir(), &config.storage_key)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<ImpersonationSession>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| SessionError::Storage(format!("read {}: {e}", self.path.display())))?;
        decode(&raw).map(Some)
    }

    fn save(&self, session: &ImpersonationSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SessionError::Storage(format!("mkdir {}: {e}", parent.display())))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!("failed to chmod 0700 {}: {e}", parent.display());
                }
            }
        }

        // Write-then-rename: a crash leaves either the old record or the new one.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encode(session)?)
            .map_err(|e| SessionError::Storage(format!("write {}: {e}", tmp.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|e| SessionError::Storage(format!("chmod {}: {e}", tmp.display())))?;
        }
        fs::rename(&tmp, &self.path)
            .map_err(|e| SessionError::Storage(format!("rename {}: {e}", self.path.display())))
    }

    fn clear(&self) -> Result<(), SessionError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                SessionError::Storage(format!("failed to delete {}: {e}", self.path.display()))
            })?;
        }
        Ok(())
    }
}

/// Process-lifetime storage. Holds the serialized record so reads go through
/// the same decode path as the file store.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    record: Mutex<Option<String>>,
}

impl MemorySessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw contents, bypassing validation.
    pub fn put_raw(&self, raw: &str) {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.to_string());
    }

    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<ImpersonationSession>, SessionError> {
        self.raw().as_deref().map(decode).transpose()
    }

    fn save(&self, session: &ImpersonationSession) -> Result<(), SessionError> {
        let raw = encode(session)?;
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use standin_core::session::ImpersonationTarget;

    fn session() -> ImpersonationSession {
        ImpersonationSession::from_grant(
            &ImpersonationTarget {
                target_user_id: "U".into(),
                target_user_name: "Una".into(),
                target_user_email: "una@orgx.io".into(),
                target_org_id: "OrgX".into(),
                target_org_name: "Org X".into(),
            },
            "s1".into(),
            "member".into(),
            Some("OrgAdmin".into()),
            None,
        )
    }

    #[test]
    fn file_store_load_clear_cycle() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let storage = FileSessionStorage::new(&tmp.path().join("tab-1"), "impersonation_session");

        assert!(storage.load().expect("load").is_none());
        storage.save(&session()).expect("save");
        assert_eq!(storage.load().expect("load"), Some(session()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(storage.path())
                .expect("metadata")
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600, "session record should be 0600");
        }

        storage.clear().expect("clear");
        assert!(!storage.path().exists());
        storage.clear().expect("clearing twice is fine");
    }

    #[test]
    fn tabs_do_not_share_records() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let tab_a = FileSessionStorage::new(&tmp.path().join("tab-a"), "impersonation_session");
        let tab_b = FileSessionStorage::new(&tmp.path().join("tab-b"), "impersonation_session");

        tab_a.save(&session()).expect("save");
        assert!(tab_b.load().expect("load").is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let storage = FileSessionStorage::new(tmp.path(), "impersonation_session");
        fs::write(storage.path(), "{not json").expect("write");
        let err = storage.load().expect_err("corrupt");
        assert!(err.to_string().contains("corrupt session record"));
    }

    #[test]
    fn memory_store_rejects_blank_session_id() {
        let storage = MemorySessionStorage::new();
        let mut record = session();
        record.session_id = String::new();
        storage.put_raw(&serde_json::to_string(&record).expect("json"));
        assert!(storage.load().is_err());
    }

    #[test]
    fn from_config_places_record_in_tab_dir() {
        let config = SessionConfig {
            storage_dir: "/tmp/standin".into(),
            tab_id: "tab-9".into(),
            ..Default::default()
        };
        let storage = FileSessionStorage::from_config(&config);
        assert_eq!(
            storage.path(),
            Path::new("/tmp/standin/tab-9/impersonation_session.json")
        );
    }
}
