//! Data API client.
//!
//! One `reqwest` client serves the remote authority RPCs, the target profile
//! read, and the tenant industry template. Requests carry the `apikey`
//! header and a bearer token: the in-memory session token when present,
//! otherwise whatever the read-only [`CredentialStore`] recovers.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use standin_auth::CredentialStore;
use standin_config::AuthorityConfig;
use standin_core::identity::UserProfile;

use crate::authority::{GrantResponse, RemoteAuthority, RevokeResponse};
use crate::error::SessionError;
use crate::profile::{ProfileSource, TemplateStore};

#[derive(Deserialize)]
struct ProfileRow {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    preferences: Option<serde_json::Map<String, Value>>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            display_name: row.display_name.or(row.full_name),
            avatar_url: row.avatar_url,
            metadata: row.preferences.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct TemplateRow {
    #[serde(default)]
    industry_template: Option<String>,
}

/// RPCs may answer with a single object or a one-row set.
fn first_row<T: DeserializeOwned>(value: Value) -> Result<Option<T>, serde_json::Error> {
    let row = match value {
        Value::Array(rows) => rows.into_iter().next(),
        Value::Null => None,
        other => Some(other),
    };
    row.map(serde_json::from_value).transpose()
}

pub struct DataApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    start_rpc: String,
    end_rpc: String,
    session_token: RwLock<Option<String>>,
    credentials: Option<CredentialStore>,
}

impl DataApiClient {
    #[must_use]
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let defaults = AuthorityConfig::default();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            start_rpc: defaults.start_rpc,
            end_rpc: defaults.end_rpc,
            session_token: RwLock::new(None),
            credentials: None,
        }
    }

    /// # Errors
    ///
    /// Returns `SessionError::Authority` if the base URL or key is missing.
    pub fn from_config(config: &AuthorityConfig) -> Result<Self, SessionError> {
        if !config.is_configured() {
            return Err(SessionError::Authority(
                "data API not configured; set STANDIN_AUTHORITY__BASE_URL and STANDIN_AUTHORITY__API_KEY".into(),
            ));
        }
        let mut client = Self::new(&config.base_url, &config.api_key);
        client.start_rpc.clone_from(&config.start_rpc);
        client.end_rpc.clone_from(&config.end_rpc);
        Ok(client)
    }

    /// Fall back to durable credentials when no session token is set.
    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replace the in-memory session token (`None` tears it down).
    pub fn set_session_token(&self, token: Option<String>) {
        *self
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn bearer(&self) -> String {
        let in_memory = self
            .session_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        in_memory
            .or_else(|| {
                let recovered = self.credentials.as_ref()?.load();
                if recovered.is_some() {
                    tracing::debug!("data API token recovered from durable storage");
                }
                recovered
            })
            .unwrap_or_else(|| self.api_key.clone())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{path}", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }

    async fn rpc(&self, name: &str, params: Value) -> Result<Value, SessionError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("rpc/{name}"))
            .json(&params)
            .send()
            .await
            .map_err(|e| SessionError::Authority(format!("{name}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::Authority(format!("{name}: HTTP {status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| SessionError::Authority(format!("parse {name} response: {e}")))
    }

    async fn select(&self, path: &str) -> Result<Value, SessionError> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| SessionError::DataLayer(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::DataLayer(format!("GET {path}: HTTP {status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| SessionError::DataLayer(format!("parse {path}: {e}")))
    }
}

#[async_trait]
impl RemoteAuthority for DataApiClient {
    async fn start_impersonation(
        &self,
        target_user_id: &str,
        target_org_id: &str,
    ) -> Result<GrantResponse, SessionError> {
        let params = json!({
            "p_target_user_id": target_user_id,
            "p_target_org_id": target_org_id,
        });
        let value = self.rpc(&self.start_rpc, params).await?;
        let grant = first_row(value)
            .map_err(|e| SessionError::Authority(format!("parse grant: {e}")))?;
        Ok(grant.unwrap_or_default())
    }

    async fn end_impersonation(&self, session_id: &str) -> Result<RevokeResponse, SessionError> {
        let value = self
            .rpc(&self.end_rpc, json!({ "p_session_id": session_id }))
            .await?;
        let revoke = first_row(value)
            .map_err(|e| SessionError::Authority(format!("parse revoke: {e}")))?;
        Ok(revoke.unwrap_or_default())
    }
}

#[async_trait]
impl ProfileSource for DataApiClient {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>, SessionError> {
        let path = format!("profiles?id=eq.{user_id}&select=display_name,full_name,avatar_url,preferences");
        let row: Option<ProfileRow> = first_row(self.select(&path).await?)
            .map_err(|e| SessionError::DataLayer(format!("parse profile: {e}")))?;
        Ok(row.map(UserProfile::from))
    }
}

#[async_trait]
impl TemplateStore for DataApiClient {
    async fn industry_template(&self, org_id: &str) -> Result<Option<String>, SessionError> {
        let path = format!("organizations?id=eq.{org_id}&select=industry_template");
        let row: Option<TemplateRow> = first_row(self.select(&path).await?)
            .map_err(|e| SessionError::DataLayer(format!("parse organization: {e}")))?;
        Ok(row.and_then(|r| r.industry_template))
    }

    async fn set_industry_template(
        &self,
        org_id: &str,
        template: Option<&str>,
    ) -> Result<(), SessionError> {
        let path = format!("organizations?id=eq.{org_id}");
        let resp = self
            .request(reqwest::Method::PATCH, &path)
            .header("Prefer", "return=minimal")
            .json(&json!({ "industry_template": template }))
            .send()
            .await
            .map_err(|e| SessionError::DataLayer(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(SessionError::DataLayer(format!("PATCH {path}: HTTP {status}: {body}")))
        }
    }
}
