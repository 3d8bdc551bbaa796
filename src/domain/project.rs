//! Project aggregate: membership, API keys, and key constraints

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alarm::ProjectAlarm;

/// Membership role within a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Role::Viewer),
            "editor" => Some(Role::Editor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// A project member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUser {
    pub id: String,
    pub role: Role,
}

/// IP allowlist: literal IPv4/IPv6 addresses or CIDR blocks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRestrictions {
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

/// Referer allowlist: `*` globs over the Referer header
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefererRestrictions {
    #[serde(default)]
    pub allowed_referers: Vec<String>,
}

/// Origin allowlist: `*` globs over the Origin header
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginRestrictions {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// User-Agent allowlist: regular expressions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentRestrictions {
    #[serde(default)]
    pub allowed_patterns: Vec<String>,
}

/// Optional predicates attached to an API key.
///
/// An absent predicate passes vacuously; all present predicates must pass.
/// The `requests_per_*` fields are part of the wire shape but are not
/// enforced here (rate limiting is a gateway concern).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_restrictions: Option<IpRestrictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer_restrictions: Option<RefererRestrictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_restrictions: Option<OriginRestrictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_restrictions: Option<UserAgentRestrictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_environments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u32>,
}

/// An API key bound to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: Uuid,
    pub key: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub constraints: ApiKeyConstraints,
}

impl ApiKey {
    /// Mint a key with a fresh opaque token and no constraints.
    pub fn generate(now: DateTime<Utc>) -> Self {
        ApiKey {
            id: Uuid::new_v4(),
            key: generate_key_token(),
            created_at: now,
            constraints: ApiKeyConstraints::default(),
        }
    }
}

/// Generate a 40-character opaque key token.
///
/// 30 bytes from the OS RNG, base64url without padding.
pub fn generate_key_token() -> String {
    let mut bytes = [0u8; 30];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// The project aggregate.
///
/// `users`, `api_keys`, and `alarms` are owned by the aggregate and only
/// mutated through versioned read-modify-write in the repository layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub project_id: String,
    pub owner_id: String,
    pub users: Vec<ProjectUser>,
    pub api_keys: Vec<ApiKey>,
    #[serde(default)]
    pub alarms: Vec<ProjectAlarm>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Role of the given user, or `None` when not a member.
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        self.users.iter().find(|u| u.id == user_id).map(|u| u.role)
    }

    /// Find an API key by its literal token.
    pub fn find_api_key(&self, token: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == token)
    }

    /// Number of admin members.
    pub fn admin_count(&self) -> usize {
        self.users.iter().filter(|u| u.role == Role::Admin).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_token_is_40_chars_url_safe() {
        let token = generate_key_token();
        assert_eq!(token.len(), 40);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn key_tokens_are_unique() {
        assert_ne!(generate_key_token(), generate_key_token());
    }

    #[test]
    fn role_ordering_supports_minimum_checks() {
        assert!(Role::Admin > Role::Editor);
        assert!(Role::Editor > Role::Viewer);
    }

    #[test]
    fn constraints_deserialize_from_camel_case() {
        let raw = r#"{
            "ipRestrictions": {"allowedIps": ["192.168.1.0/24"]},
            "allowedEnvironments": ["production"],
            "requestsPerMinute": 60
        }"#;
        let constraints: ApiKeyConstraints = serde_json::from_str(raw).unwrap();
        assert_eq!(
            constraints.ip_restrictions.unwrap().allowed_ips,
            vec!["192.168.1.0/24"]
        );
        assert_eq!(constraints.requests_per_minute, Some(60));
        assert!(constraints.expiration_date.is_none());
    }
}
