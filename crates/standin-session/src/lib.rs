//! # standin-session
//!
//! Impersonation: an operator temporarily assumes another user's identity and
//! tenant, then returns to their own with guaranteed restoration.
//!
//! - [`manager::ImpersonationManager`]: the `start` / `end` / `restore` state machine
//! - [`effective`]: "who is the user right now", derived from identity + session
//! - [`storage`]: the session-scoped checkpoint record
//! - [`authority`], [`profile`]: remote collaborators, with a REST client in [`rest`]

pub mod authority;
pub mod effective;
pub mod error;
pub mod manager;
pub mod profile;
pub mod rest;
pub mod storage;

pub use effective::{EffectiveIdentity, EffectiveIdentityResolver, resolve_effective_identity};
pub use error::SessionError;
pub use manager::ImpersonationManager;
