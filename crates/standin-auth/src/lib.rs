//! # standin-auth
//!
//! Owns the real, authenticated user's identity.
//!
//! Provides the identity lifecycle manager (bounded startup, provider push
//! events, deterministic logout), a REST identity-provider client, JWT expiry
//! decoding, and a read-only accessor that recovers an access token from
//! durable storage (`keyring`, env, per-origin storage files).

pub mod claims;
pub mod credential_store;
pub mod error;
pub mod lifecycle;
pub mod provider;
pub mod rest;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use credential_store::CredentialStore;
pub use error::AuthError;
pub use lifecycle::{DependentStore, IdentityManager};
pub use provider::{IdentityEvent, IdentityProvider, ProviderError};
