//! In-memory tenant directory for tests in this and dependent crates.
//!
//! Enabled with the `test-support` feature.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::tenant::{Membership, Organization, TenantContextStore, TenantError};

/// One observable interaction with the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantCall {
    Fetch(String),
    Switch(String),
    Clear,
}

#[derive(Default)]
struct State {
    /// Server-side memberships: user ID -> organizations.
    directory: HashMap<String, Vec<Organization>>,
    cached: Vec<Organization>,
    current: Option<String>,
    calls: Vec<TenantCall>,
    fail_fetch: bool,
    fail_switch: bool,
}

/// Tenant store backed by a mutable in-memory directory.
///
/// `fetch_user_organizations` copies the directory entry into the cache and
/// falls back to the first organization when the active one disappeared.
#[derive(Default)]
pub struct InMemoryTenantStore {
    state: Mutex<State>,
}

impl InMemoryTenantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grant `user_id` a membership in `org_id` on the "server".
    pub fn add_org(&self, user_id: &str, org_id: &str, name: &str) {
        let mut state = self.lock();
        let orgs = state.directory.entry(user_id.to_string()).or_default();
        orgs.retain(|o| o.id != org_id);
        orgs.push(Organization {
            id: org_id.to_string(),
            name: name.to_string(),
            membership: Membership {
                user_id: user_id.to_string(),
                role: None,
            },
        });
    }

    /// Revoke a membership on the "server". The cache is untouched.
    pub fn remove_org(&self, user_id: &str, org_id: &str) {
        let mut state = self.lock();
        if let Some(orgs) = state.directory.get_mut(user_id) {
            orgs.retain(|o| o.id != org_id);
        }
    }

    /// Populate the cache for `user_id` without recording a call.
    pub fn prime(&self, user_id: &str) {
        let mut state = self.lock();
        state.cached = state.directory.get(user_id).cloned().unwrap_or_default();
    }

    /// Force the active organization without recording a call.
    pub fn select(&self, org_id: &str) {
        self.lock().current = Some(org_id.to_string());
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    pub fn set_fail_switch(&self, fail: bool) {
        self.lock().fail_switch = fail;
    }

    #[must_use]
    pub fn current_id(&self) -> Option<String> {
        self.lock().current.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<TenantCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| **c == TenantCall::Clear)
            .count()
    }
}

#[async_trait]
impl TenantContextStore for InMemoryTenantStore {
    fn organizations(&self) -> Vec<Organization> {
        self.lock().cached.clone()
    }

    fn current_organization(&self) -> Option<Organization> {
        let state = self.lock();
        let current = state.current.as_deref()?;
        state.cached.iter().find(|o| o.id == current).cloned()
    }

    fn current_membership(&self) -> Option<Membership> {
        self.current_organization().map(|o| o.membership)
    }

    async fn fetch_user_organizations(&self, user_id: &str) -> Result<(), TenantError> {
        let mut state = self.lock();
        state.calls.push(TenantCall::Fetch(user_id.to_string()));
        if state.fail_fetch {
            return Err(TenantError::Request("directory unavailable".into()));
        }
        state.cached = state.directory.get(user_id).cloned().unwrap_or_default();
        let still_present = state
            .current
            .as_deref()
            .is_some_and(|id| state.cached.iter().any(|o| o.id == id));
        if !still_present {
            state.current = state.cached.first().map(|o| o.id.clone());
        }
        Ok(())
    }

    async fn set_current_organization(&self, org_id: &str) -> Result<(), TenantError> {
        let mut state = self.lock();
        state.calls.push(TenantCall::Switch(org_id.to_string()));
        if state.fail_switch {
            return Err(TenantError::Request("switch failed".into()));
        }
        if !state.cached.iter().any(|o| o.id == org_id) {
            return Err(TenantError::NotAvailable(org_id.to_string()));
        }
        state.current = Some(org_id.to_string());
        Ok(())
    }

    fn clear_cache(&self) {
        let mut state = self.lock();
        state.calls.push(TenantCall::Clear);
        state.cached.clear();
        state.current = None;
    }
}
