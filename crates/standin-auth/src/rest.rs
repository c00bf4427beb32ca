//! REST identity-provider client.
//!
//! Calls the provider's `/auth/v1/user` and `/auth/v1/logout` endpoints via
//! `reqwest`. The bearer token is the client's in-memory session token; when
//! that is gone (torn down mid-request) the read-only [`CredentialStore`]
//! supplies one from durable storage.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use standin_config::IdentityConfig;
use standin_core::identity::AuthIdentity;
use tokio::sync::Notify;

use crate::credential_store::CredentialStore;
use crate::error::AuthError;
use crate::provider::{IdentityProvider, ProviderError};

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    app_metadata: serde_json::Map<String, serde_json::Value>,
}

impl UserResponse {
    fn into_identity(self) -> AuthIdentity {
        let display_name = ["full_name", "name", "display_name"]
            .iter()
            .find_map(|k| self.user_metadata.get(*k)?.as_str())
            .map(String::from);
        let org_hint = self
            .app_metadata
            .get("org_id")
            .and_then(|v| v.as_str())
            .map(String::from);
        AuthIdentity {
            user_id: self.id,
            email: self.email.unwrap_or_default(),
            display_name,
            role: self.role,
            org_hint,
        }
    }
}

pub struct RestIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session_token: RwLock<Option<String>>,
    credentials: CredentialStore,
    abort: Notify,
}

impl RestIdentityProvider {
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, credentials: CredentialStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            session_token: RwLock::new(None),
            credentials,
            abort: Notify::new(),
        }
    }

    /// # Errors
    ///
    /// Returns `AuthError::Other` if the provider URL or key is missing, or the
    /// credential store cannot be located.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, AuthError> {
        if !config.is_configured() {
            return Err(AuthError::Other(
                "identity provider not configured (set STANDIN_IDENTITY__PROVIDER_URL and STANDIN_IDENTITY__API_KEY)".into(),
            ));
        }
        let credentials = CredentialStore::from_config(config)?;
        Ok(Self::new(&config.provider_url, &config.api_key, credentials))
    }

    /// Replace the in-memory session token (`None` tears it down).
    pub fn set_session_token(&self, token: Option<String>) {
        *self
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Cancel every request currently in flight. They resolve as
    /// [`ProviderError::Aborted`].
    pub fn abort_in_flight(&self) {
        self.abort.notify_waiters();
    }

    fn bearer(&self) -> Option<String> {
        let in_memory = self
            .session_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        in_memory.or_else(|| {
            let recovered = self.credentials.load();
            if recovered.is_some() {
                tracing::debug!("session token recovered from durable storage");
            }
            recovered
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let aborted = self.abort.notified();
        tokio::select! {
            result = request.send() => {
                result.map_err(|e| ProviderError::Request(e.to_string()))
            }
            () = aborted => Err(ProviderError::Aborted("request cancelled by client".into())),
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn current_session(&self) -> Result<Option<AuthIdentity>, ProviderError> {
        let Some(token) = self.bearer() else {
            return Ok(None);
        };

        let request = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&token);
        let resp = self.send(request).await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            status if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(ProviderError::Request(format!("get user: HTTP {status}: {body}")));
            }
            _ => {}
        }

        let user: UserResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("parse user: {e}")))?;
        Ok(Some(user.into_identity()))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(token) = self.bearer() else {
            return Ok(());
        };
        self.set_session_token(None);

        let request = self
            .client
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&token);
        let resp = self.send(request).await?;

        let status = resp.status();
        // An already-invalid session is as signed out as it gets.
        if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(ProviderError::Request(format!("logout: HTTP {status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::{CredentialConvention, OriginStorage};
    use pretty_assertions::assert_eq;

    fn empty_credentials(dir: &std::path::Path) -> CredentialStore {
        CredentialStore::new(
            "standin-test-no-such-service",
            OriginStorage::new(dir),
            CredentialConvention::default(),
        )
    }

    #[test]
    fn user_response_maps_metadata() {
        let raw = r#"{
            "id": "user_1",
            "email": "op@acme.io",
            "role": "authenticated",
            "user_metadata": {"full_name": "Olive Operator"},
            "app_metadata": {"org_id": "OrgAdmin"}
        }"#;
        let user: UserResponse = serde_json::from_str(raw).expect("parse");
        let identity = user.into_identity();
        assert_eq!(identity.display_name.as_deref(), Some("Olive Operator"));
        assert_eq!(identity.org_hint.as_deref(), Some("OrgAdmin"));
    }

    #[test]
    fn from_config_requires_provider_url() {
        let err = RestIdentityProvider::from_config(&IdentityConfig::default())
            .err()
            .expect("not configured");
        assert!(err.to_string().contains("STANDIN_IDENTITY__PROVIDER_URL"));
    }

    #[test]
    fn in_memory_token_wins_over_storage() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let provider =
            RestIdentityProvider::new("http://127.0.0.1:9/", "anon", empty_credentials(tmp.path()));
        assert_eq!(provider.base_url, "http://127.0.0.1:9");
        provider.set_session_token(Some("tok_mem".into()));
        assert_eq!(provider.bearer().as_deref(), Some("tok_mem"));
    }

    #[tokio::test]
    async fn no_token_means_no_session() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let provider =
            RestIdentityProvider::new("http://127.0.0.1:9", "anon", empty_credentials(tmp.path()));
        // STANDIN_AUTH__TOKEN would leak into this test if set in the shell.
        if std::env::var("STANDIN_AUTH__TOKEN").is_ok() {
            return;
        }
        let session = provider.current_session().await.expect("no request made");
        assert!(session.is_none());
    }
}
