use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("token expired")]
    TokenExpired,

    #[error("keyring error: {0}")]
    KeyringError(String),

    #[error("credential store error: {0}")]
    CredentialStore(String),

    #[error("identity provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Other(String),
}
