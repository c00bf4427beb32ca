//! Impersonation session manager.
//!
//! Single writer of the live [`ImpersonationSession`] and its [`SessionPhase`].
//! Readers subscribe through watch channels.
//!
//! `start` is conservative: any failure before the in-memory commit aborts
//! and surfaces to the caller. The storage write happens before the tenant
//! switch and is a checkpoint for `restore`, so it is not rolled back. `end`
//! is liberal: every remote step is best-effort, and local state always ends
//! up cleared with the operator back in their own tenant.
//!
//! Every sequence captures an epoch when it begins and re-checks it after each
//! suspension point. `shutdown`, `end`, and identity teardown bump the epoch,
//! so a continuation that resumes after its owner went away stops without
//! committing anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use standin_auth::DependentStore;
use standin_core::identity::AuthIdentity;
use standin_core::session::{ImpersonationSession, ImpersonationTarget, SessionPhase};
use standin_core::tenant::TenantContextStore;
use tokio::sync::watch;

use crate::authority::RemoteAuthority;
use crate::error::SessionError;
use crate::profile::{ProfileSource, TemplateStore};
use crate::rest::DataApiClient;
use crate::storage::SessionStorage;

/// The tenant's industry template as first observed during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TemplateSnapshot {
    org_id: String,
    value: Option<String>,
}

pub struct ImpersonationManager {
    authority: Arc<dyn RemoteAuthority>,
    profiles: Arc<dyn ProfileSource>,
    templates: Arc<dyn TemplateStore>,
    tenant: Arc<dyn TenantContextStore>,
    storage: Arc<dyn SessionStorage>,
    operator: watch::Receiver<Option<AuthIdentity>>,
    session: watch::Sender<Option<ImpersonationSession>>,
    phase: watch::Sender<SessionPhase>,
    template_snapshot: Mutex<Option<TemplateSnapshot>>,
    epoch: AtomicU64,
}

impl ImpersonationManager {
    /// `operator` is the real identity, usually `IdentityManager::subscribe()`.
    #[must_use]
    pub fn new(
        authority: Arc<dyn RemoteAuthority>,
        profiles: Arc<dyn ProfileSource>,
        templates: Arc<dyn TemplateStore>,
        tenant: Arc<dyn TenantContextStore>,
        storage: Arc<dyn SessionStorage>,
        operator: watch::Receiver<Option<AuthIdentity>>,
    ) -> Self {
        Self {
            authority,
            profiles,
            templates,
            tenant,
            storage,
            operator,
            session: watch::Sender::new(None),
            phase: watch::Sender::new(SessionPhase::Idle),
            template_snapshot: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Use one data API client as authority, profile source, and template store.
    #[must_use]
    pub fn with_data_api(
        api: &Arc<DataApiClient>,
        tenant: Arc<dyn TenantContextStore>,
        storage: Arc<dyn SessionStorage>,
        operator: watch::Receiver<Option<AuthIdentity>>,
    ) -> Self {
        Self::new(
            api.clone(),
            api.clone(),
            api.clone(),
            tenant,
            storage,
            operator,
        )
    }

    #[must_use]
    pub fn session(&self) -> Option<ImpersonationSession> {
        self.session.borrow().clone()
    }

    #[must_use]
    pub fn is_impersonating(&self) -> bool {
        self.session.borrow().is_some()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<ImpersonationSession>> {
        self.session.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Mark the owning context dead. In-flight continuations stop at their
    /// next checkpoint without committing.
    pub fn shutdown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("impersonation manager shut down");
    }

    /// Start impersonating `target`.
    ///
    /// Returns `Ok(None)` when the sequence was abandoned because the manager
    /// was shut down or torn down while it was suspended.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` if there is no real identity.
    /// - `AlreadyActive` if a session is live or another sequence is running.
    /// - `Rejected` / `Authority` if the grant was refused or unreachable.
    /// - `Storage` / `Tenant` if the checkpoint or the tenant switch failed.
    pub async fn start(
        &self,
        target: ImpersonationTarget,
    ) -> Result<Option<ImpersonationSession>, SessionError> {
        if self.operator_id().is_none() {
            return Err(SessionError::NotAuthenticated);
        }
        self.try_enter(SessionPhase::Starting)
            .map_err(SessionError::AlreadyActive)?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let result = self.run_start(target, epoch).await;
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => tracing::debug!("impersonation start abandoned"),
            Err(error) => tracing::warn!(%error, "impersonation start failed"),
        }
        if !matches!(result, Ok(Some(_))) {
            self.leave(SessionPhase::Starting);
        }
        result
    }

    async fn run_start(
        &self,
        mut target: ImpersonationTarget,
        epoch: u64,
    ) -> Result<Option<ImpersonationSession>, SessionError> {
        let grant = self
            .authority
            .start_impersonation(&target.target_user_id, &target.target_org_id)
            .await?;
        if !grant.success {
            return Err(SessionError::Rejected(
                grant
                    .error
                    .unwrap_or_else(|| "impersonation not permitted".into()),
            ));
        }
        let Some(session_id) = grant.session_id.filter(|id| !id.trim().is_empty()) else {
            return Err(SessionError::Rejected("grant carried no session id".into()));
        };
        if let Some(org_id) = grant.target_org_id.filter(|id| !id.is_empty()) {
            target.target_org_id = org_id;
        }
        if !self.is_current(epoch) {
            return Ok(None);
        }

        let target_profile = match self.profiles.fetch_profile(&target.target_user_id).await {
            Ok(profile) => profile,
            Err(error) => {
                tracing::warn!(
                    %error,
                    user_id = %target.target_user_id,
                    "target profile unavailable; continuing without it",
                );
                None
            }
        };
        if !self.is_current(epoch) {
            return Ok(None);
        }

        let admin_original_org_id = self.tenant.current_organization().map(|org| org.id);
        let session = ImpersonationSession::from_grant(
            &target,
            session_id,
            grant.target_role.unwrap_or_default(),
            admin_original_org_id,
            target_profile,
        );

        // Checkpoint before any tenant mutation.
        self.storage.save(&session)?;

        let Some(operator_id) = self.operator_id() else {
            return if self.is_current(epoch) {
                Err(SessionError::NotAuthenticated)
            } else {
                Ok(None)
            };
        };
        self.tenant.fetch_user_organizations(&operator_id).await?;
        if !self.is_current(epoch) {
            return Ok(None);
        }
        self.tenant
            .set_current_organization(&session.target_org_id)
            .await?;
        if !self.is_current(epoch) {
            return Ok(None);
        }

        if !self.commit(&session, epoch) {
            return Ok(None);
        }
        tracing::info!(
            session_id = %session.session_id,
            user_id = %session.target_user_id,
            org_id = %session.target_org_id,
            "impersonation started",
        );
        Ok(Some(session))
    }

    /// Publish the session and move `Starting → Active` in one step, unless
    /// the sequence went stale in between.
    fn commit(&self, session: &ImpersonationSession, epoch: u64) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase != SessionPhase::Starting || !self.is_current(epoch) {
                return false;
            }
            *self
                .template_snapshot
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
            self.session.send_replace(Some(session.clone()));
            *phase = SessionPhase::Active;
            true
        })
    }

    /// Leave impersonation and return the operator to their own tenant.
    ///
    /// Never fails. Without an in-memory session, a persisted record is
    /// ended instead. Calls while another sequence is running are ignored.
    pub async fn end(&self) {
        if self.session().is_none() && self.adopt_persisted().is_none() {
            tracing::debug!("no impersonation session to end");
            return;
        }
        if let Err(phase) = self.try_enter(SessionPhase::Ending) {
            tracing::debug!(%phase, "end ignored while another sequence is running");
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let Some(session) = self.session() else {
            self.reset();
            return;
        };

        self.restore_template().await;

        match self.authority.end_impersonation(&session.session_id).await {
            Ok(revoke) if revoke.success => {}
            Ok(revoke) => tracing::warn!(
                session_id = %session.session_id,
                error = revoke.error.as_deref().unwrap_or("not found"),
                "authority reports session already ended",
            ),
            Err(error) => tracing::warn!(
                %error,
                session_id = %session.session_id,
                "revoking impersonation grant failed; continuing local cleanup",
            ),
        }

        if let Err(error) = self.storage.clear() {
            tracing::warn!(%error, "clearing impersonation record failed");
        }

        if let Some(operator_id) = self.operator_id()
            && let Err(error) = self.tenant.fetch_user_organizations(&operator_id).await
        {
            tracing::warn!(%error, user_id = %operator_id, "tenant list refresh failed");
        }

        self.return_to_original_tenant(&session).await;
        self.reset();
        tracing::info!(session_id = %session.session_id, "impersonation ended");
    }

    /// Load the persisted record into memory without reconciliation, via
    /// `Idle → Restoring → Active`.
    fn adopt_persisted(&self) -> Option<ImpersonationSession> {
        self.try_enter(SessionPhase::Restoring).ok()?;
        match self.load_record() {
            Some(session) => {
                self.session.send_replace(Some(session.clone()));
                self.set_phase_if(SessionPhase::Restoring, SessionPhase::Active);
                Some(session)
            }
            None => {
                self.leave(SessionPhase::Restoring);
                None
            }
        }
    }

    async fn restore_template(&self) {
        let snapshot = self
            .template_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(snapshot) = snapshot else {
            return;
        };
        match self.templates.industry_template(&snapshot.org_id).await {
            Ok(current) if current == snapshot.value => return,
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, org_id = %snapshot.org_id, "reading industry template failed");
            }
        }
        if let Err(error) = self
            .templates
            .set_industry_template(&snapshot.org_id, snapshot.value.as_deref())
            .await
        {
            tracing::warn!(%error, org_id = %snapshot.org_id, "restoring industry template failed");
        }
    }

    async fn return_to_original_tenant(&self, session: &ImpersonationSession) {
        let original = session
            .admin_original_org_id
            .as_deref()
            .filter(|id| self.tenant.organizations().iter().any(|org| org.id == *id));
        match original {
            Some(org_id) => {
                if let Err(error) = self.tenant.set_current_organization(org_id).await {
                    tracing::warn!(%error, org_id, "switching back to original tenant failed");
                }
            }
            None => tracing::debug!(
                original = session.admin_original_org_id.as_deref().unwrap_or("<none>"),
                "original tenant unavailable; keeping store default",
            ),
        }

        let still_in_target = self
            .tenant
            .current_organization()
            .is_some_and(|org| org.id == session.target_org_id);
        if !still_in_target || original == Some(session.target_org_id.as_str()) {
            return;
        }
        let fallback = self
            .tenant
            .organizations()
            .into_iter()
            .find(|org| org.id != session.target_org_id);
        match fallback {
            Some(org) => {
                if let Err(error) = self.tenant.set_current_organization(&org.id).await {
                    tracing::warn!(%error, org_id = %org.id, "leaving target tenant failed");
                }
            }
            None => tracing::warn!(
                org_id = %session.target_org_id,
                "no other tenant available after impersonation",
            ),
        }
    }

    /// Reload a session persisted by an earlier run of this tab.
    ///
    /// Adopts the record as-is, then switches the tenant to the target if the
    /// tenant store lost it. Calling this again while a session is live
    /// returns that session unchanged.
    pub async fn restore(&self) -> Option<ImpersonationSession> {
        if let Err(phase) = self.try_enter(SessionPhase::Restoring) {
            tracing::debug!(%phase, "restore skipped");
            return self.session();
        }
        let epoch = self.epoch.load(Ordering::SeqCst);

        let Some(session) = self.load_record() else {
            self.leave(SessionPhase::Restoring);
            return None;
        };
        self.session.send_replace(Some(session.clone()));
        self.set_phase_if(SessionPhase::Restoring, SessionPhase::Active);
        tracing::info!(
            session_id = %session.session_id,
            org_id = %session.target_org_id,
            "impersonation restored",
        );

        self.reconcile_tenant(&session, epoch).await;
        self.session()
    }

    async fn reconcile_tenant(&self, session: &ImpersonationSession, epoch: u64) {
        let in_target = self
            .tenant
            .current_organization()
            .is_some_and(|org| org.id == session.target_org_id);
        if in_target {
            return;
        }
        let Some(operator_id) = self.operator_id() else {
            tracing::debug!("no operator identity; tenant reconciliation skipped");
            return;
        };
        tracing::info!(org_id = %session.target_org_id, "active tenant drifted; switching back");
        if let Err(error) = self.tenant.fetch_user_organizations(&operator_id).await {
            tracing::warn!(%error, user_id = %operator_id, "tenant list refresh failed");
        }
        if !self.is_current(epoch) {
            return;
        }
        if let Err(error) = self
            .tenant
            .set_current_organization(&session.target_org_id)
            .await
        {
            tracing::warn!(%error, org_id = %session.target_org_id, "re-switching to target tenant failed");
        }
    }

    /// Record the tenant's industry template the first time it is seen
    /// during the live session. Later observations are ignored.
    ///
    /// Returns whether this call captured the snapshot.
    pub fn observe_template(&self, org_id: &str, value: Option<&str>) -> bool {
        if self.phase() != SessionPhase::Active {
            return false;
        }
        let in_target = self
            .session
            .borrow()
            .as_ref()
            .is_some_and(|s| s.target_org_id == org_id);
        if !in_target {
            return false;
        }
        let mut snapshot = self
            .template_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if snapshot.is_some() {
            return false;
        }
        *snapshot = Some(TemplateSnapshot {
            org_id: org_id.to_string(),
            value: value.map(String::from),
        });
        true
    }

    fn load_record(&self) -> Option<ImpersonationSession> {
        match self.storage.load() {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(%error, "discarding unreadable impersonation record");
                if let Err(error) = self.storage.clear() {
                    tracing::warn!(%error, "clearing impersonation record failed");
                }
                None
            }
        }
    }

    fn operator_id(&self) -> Option<String> {
        self.operator.borrow().as_ref().map(|i| i.user_id.clone())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn try_enter(&self, next: SessionPhase) -> Result<(), SessionPhase> {
        let mut refused = None;
        self.phase.send_if_modified(|phase| {
            match phase.transition(next) {
                Ok(entered) => {
                    *phase = entered;
                    true
                }
                Err(error) => {
                    tracing::trace!(%error, "phase change refused");
                    refused = Some(*phase);
                    false
                }
            }
        });
        refused.map_or(Ok(()), Err)
    }

    fn set_phase_if(&self, from: SessionPhase, to: SessionPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == from {
                *phase = to;
                true
            } else {
                false
            }
        })
    }

    fn leave(&self, from: SessionPhase) {
        self.set_phase_if(from, SessionPhase::Idle);
    }

    fn reset(&self) {
        *self
            .template_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.session.send_replace(None);
        self.phase.send_replace(SessionPhase::Idle);
    }
}

#[async_trait]
impl DependentStore for ImpersonationManager {
    fn name(&self) -> &str {
        "impersonation_session"
    }

    /// Local-only teardown: the real identity is gone, so the grant cannot
    /// be revoked from here.
    async fn teardown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(error) = self.storage.clear() {
            tracing::warn!(%error, "clearing impersonation record failed");
        }
        let had_session = self.session.borrow().is_some();
        self.reset();
        if had_session {
            tracing::info!("impersonation session discarded with identity");
        }
    }
}
