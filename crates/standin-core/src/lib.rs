//! # standin-core
//!
//! Core types shared across all Standin crates:
//! - The authenticated identity and profile snapshots
//! - The impersonation session record and its phase state machine
//! - The tenant context store interface consumed by the session and identity managers
//! - Cross-cutting error types

pub mod errors;
pub mod identity;
pub mod session;
pub mod tenant;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use errors::CoreError;
pub use identity::{AuthIdentity, UserProfile};
pub use session::{ImpersonationSession, ImpersonationTarget, SessionPhase};
pub use tenant::{Membership, Organization, TenantContextStore, TenantError};
