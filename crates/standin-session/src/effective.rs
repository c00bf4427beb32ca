//! Effective identity: the identity the rest of the application displays and
//! scopes requests to.
//!
//! While a session with a target user is live, the target wins entirely.
//! Otherwise fields come from the real identity, with the cached profile
//! taking precedence and the email's local part as the last-resort name.

use standin_core::identity::{AuthIdentity, UserProfile, email_local_part};
use standin_core::session::ImpersonationSession;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveIdentity {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub role: Option<String>,
    pub is_impersonated: bool,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolve the effective identity. Pure; no side effects.
///
/// `target_profile` overrides the snapshot stored in the session when given.
#[must_use]
pub fn resolve_effective_identity(
    auth: Option<&AuthIdentity>,
    session: Option<&ImpersonationSession>,
    real_profile: Option<&UserProfile>,
    target_profile: Option<&UserProfile>,
) -> Option<EffectiveIdentity> {
    if let Some(session) = session.filter(|s| !s.target_user_id.is_empty()) {
        let profile = target_profile.or(session.target_profile.as_ref());
        let display_name = non_empty(profile.and_then(|p| p.display_name.as_deref()))
            .or_else(|| non_empty(Some(session.target_user_name.as_str())))
            .unwrap_or_else(|| email_local_part(&session.target_user_email))
            .to_string();
        return Some(EffectiveIdentity {
            user_id: session.target_user_id.clone(),
            email: session.target_user_email.clone(),
            display_name,
            avatar_url: profile.and_then(|p| p.avatar_url.clone()),
            metadata: profile.map(|p| p.metadata.clone()).unwrap_or_default(),
            role: non_empty(Some(session.target_role.as_str())).map(String::from),
            is_impersonated: true,
        });
    }

    let auth = auth?;
    let display_name = non_empty(real_profile.and_then(|p| p.display_name.as_deref()))
        .or_else(|| non_empty(auth.display_name.as_deref()))
        .unwrap_or_else(|| auth.email_local_part())
        .to_string();
    Some(EffectiveIdentity {
        user_id: auth.user_id.clone(),
        email: auth.email.clone(),
        display_name,
        avatar_url: real_profile.and_then(|p| p.avatar_url.clone()),
        metadata: real_profile.map(|p| p.metadata.clone()).unwrap_or_default(),
        role: auth.role.clone(),
        is_impersonated: false,
    })
}

/// Memoized projection fed by the identity and session watch channels.
///
/// Recomputes only when a source has changed since the last read.
pub struct EffectiveIdentityResolver {
    auth: watch::Receiver<Option<AuthIdentity>>,
    session: watch::Receiver<Option<ImpersonationSession>>,
    real_profile: Option<UserProfile>,
    target_profile: Option<UserProfile>,
    memo: Option<EffectiveIdentity>,
    dirty: bool,
}

impl EffectiveIdentityResolver {
    #[must_use]
    pub const fn new(
        auth: watch::Receiver<Option<AuthIdentity>>,
        session: watch::Receiver<Option<ImpersonationSession>>,
    ) -> Self {
        Self {
            auth,
            session,
            real_profile: None,
            target_profile: None,
            memo: None,
            dirty: true,
        }
    }

    /// Replace the locally cached profile of the real user.
    pub fn set_real_profile(&mut self, profile: Option<UserProfile>) {
        if self.real_profile != profile {
            self.real_profile = profile;
            self.dirty = true;
        }
    }

    /// Replace the freshly fetched profile of the impersonated user. It takes
    /// precedence over the snapshot stored with the session.
    pub fn set_target_profile(&mut self, profile: Option<UserProfile>) {
        if self.target_profile != profile {
            self.target_profile = profile;
            self.dirty = true;
        }
    }

    /// Current effective identity, recomputed if any input changed.
    pub fn current(&mut self) -> Option<EffectiveIdentity> {
        let auth_changed = self.auth.has_changed().unwrap_or(false);
        let session_changed = self.session.has_changed().unwrap_or(false);
        if self.dirty || auth_changed || session_changed {
            let auth = self.auth.borrow_and_update().clone();
            let session = self.session.borrow_and_update().clone();
            self.memo = resolve_effective_identity(
                auth.as_ref(),
                session.as_ref(),
                self.real_profile.as_ref(),
                self.target_profile.as_ref(),
            );
            self.dirty = false;
        }
        self.memo.clone()
    }

    /// Wait until either source changes, then return the new value.
    ///
    /// Once a source's sender is gone this returns the memo without waiting.
    pub async fn changed(&mut self) -> Option<EffectiveIdentity> {
        let closed = tokio::select! {
            result = self.auth.changed() => result.is_err(),
            result = self.session.changed() => result.is_err(),
        };
        if closed {
            return self.memo.clone();
        }
        self.dirty = true;
        self.current()
    }
}
