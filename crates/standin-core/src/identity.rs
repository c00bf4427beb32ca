use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The real, authenticated principal.
///
/// Produced by `standin-auth` on session initialization or a provider push
/// event, replaced wholesale on every later event. Contains only data fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuthIdentity {
    /// Provider user ID (JWT `sub` claim).
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Role hint from the provider (e.g. `"admin"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Tenant hint from the provider, if it carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_hint: Option<String>,
}

impl AuthIdentity {
    /// Local part of the email address (`"jane"` for `"jane@acme.io"`).
    #[must_use]
    pub fn email_local_part(&self) -> &str {
        email_local_part(&self.email)
    }
}

/// Denormalized display/preference snapshot of a user.
///
/// Best-effort: fetched from the data layer and never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Free-form preference metadata (theme, locale, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Local part of an email address, or the whole string if it has no `@`.
#[must_use]
pub fn email_local_part(email: &str) -> &str {
    email.split_once('@').map_or(email, |(local, _)| local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn local_part_strips_domain() {
        assert_eq!(email_local_part("jane.doe@acme.io"), "jane.doe");
    }

    #[test]
    fn local_part_without_at_is_whole_string() {
        assert_eq!(email_local_part("operator"), "operator");
    }

    #[test]
    fn identity_omits_absent_optionals() {
        let identity = AuthIdentity {
            user_id: "user_1".into(),
            email: "a@b.c".into(),
            display_name: None,
            role: None,
            org_hint: None,
        };
        let json = serde_json::to_value(&identity).expect("serialize");
        assert_eq!(json, serde_json::json!({"user_id": "user_1", "email": "a@b.c"}));
    }

    #[test]
    fn profile_uses_camel_case() {
        let profile = UserProfile {
            display_name: Some("Jane".into()),
            avatar_url: Some("https://cdn/a.png".into()),
            metadata: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&profile).expect("serialize");
        assert_eq!(json["displayName"], "Jane");
        assert_eq!(json["avatarUrl"], "https://cdn/a.png");
    }
}
