use standin_core::session::SessionPhase;
use standin_core::tenant::TenantError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no authenticated operator")]
    NotAuthenticated,

    #[error("an impersonation session is already {0}")]
    AlreadyActive(SessionPhase),

    #[error("impersonation rejected by authority: {0}")]
    Rejected(String),

    #[error("authority request failed: {0}")]
    Authority(String),

    #[error("data layer request failed: {0}")]
    DataLayer(String),

    #[error("tenant context error: {0}")]
    Tenant(#[from] TenantError),

    #[error("session storage error: {0}")]
    Storage(String),
}
