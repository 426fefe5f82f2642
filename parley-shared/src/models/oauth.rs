use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Query parameters delivered to the OAuth callback endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct OAuthCallback {
    /// Authorization code to exchange for tokens.
    pub code: String,

    /// Opaque state echoed back by the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Normalized profile returned by an external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ProviderProfile {
    /// Stable identifier assigned by the provider.
    pub provider_id: String,

    /// Display name as reported by the provider.
    pub display_name: String,

    /// Email addresses reported by the provider, most-preferred first.
    pub emails: Vec<String>,
}

impl ProviderProfile {
    /// The provider's primary email, if it supplied one.
    #[must_use]
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .map(String::as_str)
            .find(|email| !email.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_email_skips_blank_entries() {
        let profile = ProviderProfile {
            provider_id: "g1".to_string(),
            display_name: "Ann Lee".to_string(),
            emails: vec![String::new(), "ann@x.com".to_string()],
        };
        assert_eq!(profile.primary_email(), Some("ann@x.com"));
    }

    #[test]
    fn primary_email_absent_when_empty() {
        let profile = ProviderProfile {
            provider_id: "g1".to_string(),
            display_name: "Ann Lee".to_string(),
            emails: vec![],
        };
        assert_eq!(profile.primary_email(), None);
    }
}
