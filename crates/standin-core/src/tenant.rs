//! Tenant context store interface.
//!
//! The store itself (tenant directory, active tenant, cache teardown) is an
//! external collaborator. Standin only consumes it through
//! [`TenantContextStore`] and owns one rule: the cache is never trusted when
//! its owning identity differs from the current one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The caller's membership inside an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub membership: Membership,
}

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("organization not available: {0}")]
    NotAvailable(String),

    #[error("tenant directory request failed: {0}")]
    Request(String),
}

/// Tenant list plus active tenant, cached for one identity.
///
/// Reads are synchronous snapshots of the cache; every call re-reads, so a
/// caller that suspended in between sees whatever the cache holds now.
#[async_trait]
pub trait TenantContextStore: Send + Sync {
    fn organizations(&self) -> Vec<Organization>;

    fn current_organization(&self) -> Option<Organization>;

    fn current_membership(&self) -> Option<Membership>;

    /// Reload the tenant list for `user_id` and pick a default active tenant
    /// if the previous one disappeared.
    async fn fetch_user_organizations(&self, user_id: &str) -> Result<(), TenantError>;

    async fn set_current_organization(&self, org_id: &str) -> Result<(), TenantError>;

    fn clear_cache(&self);
}

/// Clear the tenant cache if it belongs to someone other than `user_id`.
///
/// With no identity, any cached membership is stale. Returns whether the
/// cache was cleared.
pub fn ensure_cache_owner(store: &dyn TenantContextStore, user_id: Option<&str>) -> bool {
    let Some(membership) = store.current_membership() else {
        return false;
    };
    if user_id == Some(membership.user_id.as_str()) {
        return false;
    }
    tracing::info!(
        cached_owner = %membership.user_id,
        current_user = user_id.unwrap_or("<none>"),
        "tenant cache belongs to another principal; clearing",
    );
    store.clear_cache();
    true
}
