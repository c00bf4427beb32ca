//! Remote impersonation authority.
//!
//! The authority creates and revokes the temporary membership that lets the
//! operator act inside the target tenant, and issues the session ID.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Answer to `start_impersonation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantResponse {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub target_role: Option<String>,
    #[serde(default)]
    pub target_org_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Answer to `end_impersonation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn start_impersonation(
        &self,
        target_user_id: &str,
        target_org_id: &str,
    ) -> Result<GrantResponse, SessionError>;

    /// Ending an already-ended session answers `success: false`; callers
    /// treat that as a warning, not a failure.
    async fn end_impersonation(&self, session_id: &str) -> Result<RevokeResponse, SessionError>;
}
