//! Impersonation session record and phase state machine.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::identity::UserProfile;

/// Who the operator wants to become. Input of `ImpersonationManager::start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationTarget {
    pub target_user_id: String,
    pub target_user_name: String,
    pub target_user_email: String,
    pub target_org_id: String,
    pub target_org_name: String,
}

/// An active privileged context switch.
///
/// Serialized with camelCase field names; this is the exact shape of the
/// session-scoped storage record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationSession {
    /// Opaque ID issued by the remote authority.
    pub session_id: String,
    pub target_user_id: String,
    pub target_user_name: String,
    pub target_user_email: String,
    pub target_org_id: String,
    pub target_org_name: String,
    pub target_role: String,
    /// Tenant the operator was in before the switch. Captured once.
    #[serde(default)]
    pub admin_original_org_id: Option<String>,
    #[serde(default)]
    pub target_profile: Option<UserProfile>,
}

impl ImpersonationSession {
    /// Assemble a session from the requested target and the authority's grant.
    #[must_use]
    pub fn from_grant(
        target: &ImpersonationTarget,
        session_id: String,
        target_role: String,
        admin_original_org_id: Option<String>,
        target_profile: Option<UserProfile>,
    ) -> Self {
        Self {
            session_id,
            target_user_id: target.target_user_id.clone(),
            target_user_name: target.target_user_name.clone(),
            target_user_email: target.target_user_email.clone(),
            target_org_id: target.target_org_id.clone(),
            target_org_name: target.target_org_name.clone(),
            target_role,
            admin_original_org_id,
            target_profile,
        }
    }

    /// Check the fields every restore depends on.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the session ID, target user, or target
    /// tenant is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("sessionId", &self.session_id),
            ("targetUserId", &self.target_user_id),
            ("targetOrgId", &self.target_org_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("{field} is empty")));
            }
        }
        Ok(())
    }
}

/// Phase of the impersonation session manager.
///
/// ```text
/// idle → starting → active → ending → idle
///      → restoring → active
///                  → idle
/// starting → idle    (failed start)
/// active   → idle    (sign-out teardown)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Active,
    Ending,
    Restoring,
}

impl SessionPhase {
    /// Valid next states from the current state.
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::Starting, Self::Restoring],
            Self::Starting | Self::Restoring => &[Self::Active, Self::Idle],
            Self::Active => &[Self::Ending, Self::Idle],
            Self::Ending => &[Self::Idle],
        }
    }

    /// Check whether transitioning to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    /// Validate a transition, returning an error naming both states.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if `next` is not reachable.
    pub fn transition(self, next: Self) -> Result<Self, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                entity_type: "impersonation_session".into(),
                from: self.as_str().into(),
                to: next.as_str().into(),
            })
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Restoring => "restoring",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
