//! Fakes shared by the session integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use standin_core::identity::{AuthIdentity, UserProfile};
use standin_core::session::ImpersonationTarget;
use standin_core::test_support::InMemoryTenantStore;
use standin_session::authority::{GrantResponse, RemoteAuthority, RevokeResponse};
use standin_session::manager::ImpersonationManager;
use standin_session::profile::{ProfileSource, TemplateStore};
use standin_session::storage::MemorySessionStorage;
use standin_session::SessionError;
use tokio::sync::{Notify, watch};

pub const OPERATOR: &str = "op";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STANDIN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn identity(user_id: &str) -> AuthIdentity {
    AuthIdentity {
        user_id: user_id.into(),
        email: format!("{user_id}@acme.io"),
        display_name: None,
        role: Some("admin".into()),
        org_hint: None,
    }
}

pub fn target(user_id: &str, org_id: &str) -> ImpersonationTarget {
    ImpersonationTarget {
        target_user_id: user_id.into(),
        target_user_name: format!("User {user_id}"),
        target_user_email: format!("{}@{}.io", user_id.to_lowercase(), org_id.to_lowercase()),
        target_org_id: org_id.into(),
        target_org_name: format!("Org {org_id}"),
    }
}

/// Operator `op` with a home tenant `OrgAdmin` that is currently active.
pub fn tenant_with_home() -> Arc<InMemoryTenantStore> {
    let tenant = Arc::new(InMemoryTenantStore::new());
    tenant.add_org(OPERATOR, "OrgAdmin", "Admin HQ");
    tenant.add_org(OPERATOR, "OrgOther", "Other");
    tenant.prime(OPERATOR);
    tenant.select("OrgAdmin");
    tenant
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    Start { user_id: String, org_id: String },
    End(String),
}

#[derive(Default)]
struct AuthorityState {
    calls: Vec<AuthorityCall>,
    next_id: usize,
    reject: bool,
    unreachable_start: bool,
    unreachable_end: bool,
    /// session ID -> target org of the temporary membership.
    grants: HashMap<String, String>,
}

/// Authority that grants the operator a temporary membership in the tenant
/// store's directory and revokes it on end.
pub struct FakeAuthority {
    tenant: Arc<InMemoryTenantStore>,
    operator: String,
    state: Mutex<AuthorityState>,
    hold_grant: Option<Arc<Notify>>,
}

impl FakeAuthority {
    pub fn new(tenant: Arc<InMemoryTenantStore>) -> Self {
        Self {
            tenant,
            operator: OPERATOR.into(),
            state: Mutex::new(AuthorityState::default()),
            hold_grant: None,
        }
    }

    /// Suspend every grant until `gate` is notified.
    pub fn held_by(mut self, gate: Arc<Notify>) -> Self {
        self.hold_grant = Some(gate);
        self
    }

    fn lock(&self) -> MutexGuard<'_, AuthorityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reject(&self) {
        self.lock().reject = true;
    }

    pub fn unreachable_start(&self) {
        self.lock().unreachable_start = true;
    }

    pub fn unreachable_end(&self) {
        self.lock().unreachable_end = true;
    }

    pub fn calls(&self) -> Vec<AuthorityCall> {
        self.lock().calls.clone()
    }

    pub fn start_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, AuthorityCall::Start { .. }))
            .count()
    }
}

#[async_trait]
impl RemoteAuthority for FakeAuthority {
    async fn start_impersonation(
        &self,
        target_user_id: &str,
        target_org_id: &str,
    ) -> Result<GrantResponse, SessionError> {
        {
            let mut state = self.lock();
            state.calls.push(AuthorityCall::Start {
                user_id: target_user_id.into(),
                org_id: target_org_id.into(),
            });
        }
        if let Some(gate) = &self.hold_grant {
            gate.notified().await;
        }

        let mut state = self.lock();
        if state.unreachable_start {
            return Err(SessionError::Authority("connection refused".into()));
        }
        if state.reject {
            return Ok(GrantResponse {
                success: false,
                error: Some("target is a platform admin".into()),
                ..Default::default()
            });
        }
        state.next_id += 1;
        let session_id = format!("s{}", state.next_id);
        state.grants.insert(session_id.clone(), target_org_id.into());
        drop(state);

        self.tenant
            .add_org(&self.operator, target_org_id, &format!("Org {target_org_id}"));
        Ok(GrantResponse {
            success: true,
            session_id: Some(session_id),
            target_role: Some("member".into()),
            target_org_id: Some(target_org_id.into()),
            error: None,
        })
    }

    async fn end_impersonation(&self, session_id: &str) -> Result<RevokeResponse, SessionError> {
        let mut state = self.lock();
        state.calls.push(AuthorityCall::End(session_id.into()));
        if state.unreachable_end {
            return Err(SessionError::Authority("network unreachable".into()));
        }
        let Some(org_id) = state.grants.remove(session_id) else {
            return Ok(RevokeResponse {
                success: false,
                error: Some("session not found".into()),
            });
        };
        drop(state);

        self.tenant.remove_org(&self.operator, &org_id);
        Ok(RevokeResponse {
            success: true,
            error: None,
        })
    }
}

#[derive(Default)]
struct DataState {
    profiles: HashMap<String, UserProfile>,
    templates: HashMap<String, Option<String>>,
    template_writes: Vec<(String, Option<String>)>,
    fail_profiles: bool,
}

/// Profile and template tables.
#[derive(Default)]
pub struct FakeDataLayer {
    state: Mutex<DataState>,
}

impl FakeDataLayer {
    fn lock(&self) -> MutexGuard<'_, DataState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_profile(&self, user_id: &str, profile: UserProfile) {
        self.lock().profiles.insert(user_id.into(), profile);
    }

    pub fn fail_profiles(&self) {
        self.lock().fail_profiles = true;
    }

    /// Change a template out-of-band, as a settings page would.
    pub fn edit_template(&self, org_id: &str, value: Option<&str>) {
        self.lock()
            .templates
            .insert(org_id.into(), value.map(String::from));
    }

    pub fn template(&self, org_id: &str) -> Option<String> {
        self.lock().templates.get(org_id).cloned().flatten()
    }

    /// Writes issued through `set_industry_template`.
    pub fn template_writes(&self) -> Vec<(String, Option<String>)> {
        self.lock().template_writes.clone()
    }
}

#[async_trait]
impl ProfileSource for FakeDataLayer {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>, SessionError> {
        let state = self.lock();
        if state.fail_profiles {
            return Err(SessionError::DataLayer("profiles: HTTP 500".into()));
        }
        Ok(state.profiles.get(user_id).cloned())
    }
}

#[async_trait]
impl TemplateStore for FakeDataLayer {
    async fn industry_template(&self, org_id: &str) -> Result<Option<String>, SessionError> {
        Ok(self.template(org_id))
    }

    async fn set_industry_template(
        &self,
        org_id: &str,
        template: Option<&str>,
    ) -> Result<(), SessionError> {
        let mut state = self.lock();
        state
            .template_writes
            .push((org_id.into(), template.map(String::from)));
        state
            .templates
            .insert(org_id.into(), template.map(String::from));
        Ok(())
    }
}

/// A manager wired to fakes, with handles to every collaborator.
pub struct Harness {
    pub manager: Arc<ImpersonationManager>,
    pub tenant: Arc<InMemoryTenantStore>,
    pub authority: Arc<FakeAuthority>,
    pub data: Arc<FakeDataLayer>,
    pub storage: Arc<MemorySessionStorage>,
    pub operator: watch::Sender<Option<AuthIdentity>>,
}

impl Harness {
    pub fn new() -> Self {
        let tenant = tenant_with_home();
        let authority = Arc::new(FakeAuthority::new(tenant.clone()));
        Self::with_authority(tenant, authority)
    }

    pub fn with_authority(tenant: Arc<InMemoryTenantStore>, authority: Arc<FakeAuthority>) -> Self {
        let data = Arc::new(FakeDataLayer::default());
        let storage = Arc::new(MemorySessionStorage::new());
        let (operator, operator_rx) = watch::channel(Some(identity(OPERATOR)));
        let manager = Arc::new(ImpersonationManager::new(
            authority.clone(),
            data.clone(),
            data.clone(),
            tenant.clone(),
            storage.clone(),
            operator_rx,
        ));
        Self {
            manager,
            tenant,
            authority,
            data,
            storage,
            operator,
        }
    }

    /// A fresh manager over the same storage, tenant store, and authority,
    /// as after a page reload.
    pub fn reload(&self) -> Arc<ImpersonationManager> {
        Arc::new(ImpersonationManager::new(
            self.authority.clone(),
            self.data.clone(),
            self.data.clone(),
            self.tenant.clone(),
            self.storage.clone(),
            self.operator.subscribe(),
        ))
    }
}
