//! Identity-provider interface.

use std::fmt;

use async_trait::async_trait;
use standin_core::identity::AuthIdentity;
use thiserror::Error;

/// Push-channel event names emitted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityEvent {
    /// Replay of the session already known at subscribe time.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl IdentityEvent {
    /// Parse the provider's wire name (`"SIGNED_IN"`, ...).
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "INITIAL_SESSION" => Some(Self::InitialSession),
            "SIGNED_IN" => Some(Self::SignedIn),
            "SIGNED_OUT" => Some(Self::SignedOut),
            "TOKEN_REFRESHED" => Some(Self::TokenRefreshed),
            "USER_UPDATED" => Some(Self::UserUpdated),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitialSession => "initial_session",
            Self::SignedIn => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed => "token_refreshed",
            Self::UserUpdated => "user_updated",
        }
    }
}

impl fmt::Display for IdentityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The client cancelled its own request (navigation, teardown).
    #[error("request aborted: {0}")]
    Aborted(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider response could not be decoded: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Aborts are expected during fast navigation and are never reported.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// Client of the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The currently signed-in user, or `None` if there is no session.
    async fn current_session(&self) -> Result<Option<AuthIdentity>, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}
