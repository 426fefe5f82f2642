//! Google OAuth code exchange and profile retrieval.

use async_trait::async_trait;
use oauth2::{AuthorizationCode, TokenResponse, basic::BasicClient};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, instrument};

use shared::{config::server::GoogleConfig, models::ProviderProfile};

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("oauth configuration invalid: {0}")]
    Config(String),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("profile fetch failed: {0}")]
    Profile(String),
}

/// Exchange seam so the callback handler can be exercised without a live
/// provider.
#[async_trait]
pub trait GoogleExchange: Send + Sync {
    /// Exchange an authorization code and fetch the normalized profile.
    async fn fetch_profile(
        &self,
        config: &GoogleConfig,
        auth_code: String,
    ) -> Result<ProviderProfile, OAuthError>;
}

/// Production exchange against the configured Google endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoogleOAuth;

/// Build the authorization URL the browser is redirected to.
#[must_use]
pub fn authorization_url(config: &GoogleConfig) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20profile%20email",
        config.auth_url, config.client_id, config.redirect_url
    )
}

/// Creates an HTTP client with security-focused configuration.
///
/// # Returns
/// A [`reqwest::Client`] configured to prevent SSRF vulnerabilities by
/// disabling redirects.
#[must_use]
pub fn create_http_client() -> reqwest::Client {
    reqwest::ClientBuilder::new()
        // Following redirects opens the client up to SSRF vulnerabilities.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Client should build")
}

#[derive(Deserialize)]
struct UserInfo {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[async_trait]
impl GoogleExchange for GoogleOAuth {
    #[instrument(skip(self, config, auth_code))]
    async fn fetch_profile(
        &self,
        config: &GoogleConfig,
        auth_code: String,
    ) -> Result<ProviderProfile, OAuthError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(OAuthError::Config("Google client credentials missing".into()));
        }

        let auth_url = oauth2::AuthUrl::new(config.auth_url.clone())
            .map_err(|_| OAuthError::Config("Invalid Google auth URL".into()))?;
        let token_url = oauth2::TokenUrl::new(config.token_url.clone())
            .map_err(|_| OAuthError::Config("Invalid Google token URL".into()))?;
        let redirect_url = oauth2::RedirectUrl::new(config.redirect_url.clone())
            .map_err(|_| OAuthError::Config("Invalid Google redirect URL".into()))?;

        let client = BasicClient::new(oauth2::ClientId::new(config.client_id.clone()))
            .set_client_secret(oauth2::ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        let http_client = create_http_client();

        let token_response = client
            .exchange_code(AuthorizationCode::new(auth_code))
            .request_async(&http_client)
            .await
            .map_err(|err| {
                error!("Failed to retrieve Google OAuth token");
                OAuthError::Exchange(err.to_string())
            })?;
        info!("Successfully retrieved Google OAuth token");

        let access_token = token_response.access_token().secret().clone();

        let info: UserInfo = http_client
            .get(&config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| OAuthError::Profile(err.to_string()))?
            .error_for_status()
            .map_err(|err| OAuthError::Profile(err.to_string()))?
            .json()
            .await
            .map_err(|err| OAuthError::Profile(err.to_string()))?;

        Ok(ProviderProfile {
            provider_id: info.id,
            display_name: info.name.unwrap_or_default(),
            emails: info.email.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google_config() -> GoogleConfig {
        GoogleConfig {
            client_id: "cid-123".to_string(),
            client_secret: "secret".to_string(),
            ..GoogleConfig::default()
        }
    }

    #[test]
    fn authorization_url_carries_client_and_redirect() {
        let url = authorization_url(&google_config());
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=cid-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid%20profile%20email"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_network_call() {
        let config = GoogleConfig::default();
        let result = GoogleOAuth.fetch_profile(&config, "code".to_string()).await;
        assert!(matches!(result, Err(OAuthError::Config(_))));
    }

    #[tokio::test]
    async fn invalid_endpoint_urls_are_rejected() {
        let mut config = google_config();
        config.auth_url = "not_a_url".to_string();
        let result = GoogleOAuth.fetch_profile(&config, "code".to_string()).await;
        assert!(matches!(result, Err(OAuthError::Config(_))));
    }

    #[test]
    fn http_client_builds() {
        let client = create_http_client();
        assert!(format!("{client:?}").contains("Client"));
    }
}
