use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Timestamp;

/// How an account was provisioned. Set at creation and never mutated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Password,
    Google,
}

impl AuthProvider {
    /// Return the canonical string representation expected by the
    /// persistence layer.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProvider {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "password" => Ok(Self::Password),
            "google" => Ok(Self::Google),
            _ => Err("unknown auth provider"),
        }
    }
}

/// Public view of a user account. Never carries credential material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct User {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// The user's username.
    pub username: String,

    /// The user's email address.
    pub email: String,

    /// Reference to the stored avatar image; empty when unset.
    pub avatar_url: String,

    /// How the account was provisioned.
    pub auth_provider: AuthProvider,

    /// When the user was created.
    pub created_at: Timestamp,
}

/// Compact user representation returned by relation and sidebar listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct UserSummary {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// The user's username.
    pub username: String,

    /// The user's email address.
    pub email: String,

    /// Reference to the stored avatar image; empty when unset.
    pub avatar_url: String,
}

/// Request to create a new password-provisioned account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SignupRequest {
    /// Desired username, 3 to 20 characters.
    pub username: String,

    /// Email address, unique across all accounts.
    pub email: String,

    /// Raw password, at least 6 characters. Never stored.
    pub password: String,
}

/// Request to authenticate with email and password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct LoginRequest {
    /// The account's email address.
    pub email: String,

    /// The raw password.
    pub password: String,
}

/// Profile update payload. Both fields are optional; supplying neither is
/// an error. Applied all-or-nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct UpdateProfileRequest {
    /// New username, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// New avatar image as a data URI, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Result of a username availability probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct UsernameAvailability {
    /// Whether the username can be claimed by the caller.
    pub available: bool,

    /// Human-readable explanation.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn auth_provider_roundtrip() {
        for (text, provider) in [
            ("password", AuthProvider::Password),
            ("google", AuthProvider::Google),
        ] {
            assert_eq!(provider.as_str(), text);
            assert_eq!(provider.to_string(), text);
            assert_eq!(AuthProvider::from_str(text).unwrap(), provider);
        }
    }

    #[test]
    fn auth_provider_rejects_unknown() {
        assert!(AuthProvider::from_str("github").is_err());
    }

    #[test]
    fn user_serialization_roundtrip() {
        let user = User {
            id: Uuid::new_v4(),
            username: "ann".to_string(),
            email: "ann@x.com".to_string(),
            avatar_url: String::new(),
            auth_provider: AuthProvider::Password,
            created_at: Timestamp(Utc::now()),
        };

        let json = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
        assert!(json.contains("\"auth_provider\":\"password\""));
    }

    #[test]
    fn update_profile_request_omits_absent_fields() {
        let request = UpdateProfileRequest {
            username: Some("new_name".to_string()),
            avatar: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("new_name"));
        assert!(!json.contains("avatar"));
    }
}
