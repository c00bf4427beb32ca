//! Data-layer reads used around a session: the target's profile snapshot
//! and the tenant's industry template.

use async_trait::async_trait;
use standin_core::identity::UserProfile;

use crate::error::SessionError;

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>, SessionError>;
}

/// A tenant's display/behavior template (`None` = unset).
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn industry_template(&self, org_id: &str) -> Result<Option<String>, SessionError>;

    async fn set_industry_template(
        &self,
        org_id: &str,
        template: Option<&str>,
    ) -> Result<(), SessionError>;
}
