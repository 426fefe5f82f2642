use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use tracing::{instrument, warn};

use crate::{
    app_state::AppState,
    handlers::auth::{apply_cookies, session_manager, user_service},
    services::{
        oauth_service::{GoogleExchange, GoogleOAuth, authorization_url},
        user_service::UserServiceError,
    },
};
use shared::models::OAuthCallback;

/// Redirect the browser to Google's authorization endpoint.
#[utoipa::path(
    get,
    path = "/auth/google",
    responses((status = 303, description = "Redirect to the provider")),
    tag = "Auth"
)]
#[instrument(skip(state))]
pub async fn google_oauth_init(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&authorization_url(&state.config.google))
}

/// Google OAuth callback: exchanges the code, resolves or provisions the
/// account, opens a session, and sends the browser back to the app.
#[utoipa::path(
    get,
    path = "/auth/google/callback",
    responses(
        (status = 303, description = "Redirect into the app, or to the login page with an error indicator")
    ),
    tag = "Auth"
)]
#[instrument(skip(query, state))]
pub async fn google_oauth_callback(
    query: Query<OAuthCallback>,
    state: State<Arc<AppState>>,
) -> Response {
    google_oauth_callback_with_service(query, state, GoogleOAuth).await
}

/// Callback body parameterized over the exchange so it can be exercised
/// without a live provider.
pub async fn google_oauth_callback_with_service<T: GoogleExchange>(
    Query(params): Query<OAuthCallback>,
    State(state): State<Arc<AppState>>,
    exchange: T,
) -> Response {
    let failure = |code: &str| {
        Redirect::to(&format!(
            "{}?error={code}",
            state.config.google.failure_redirect
        ))
        .into_response()
    };

    let profile = match exchange
        .fetch_profile(&state.config.google, params.code)
        .await
    {
        Ok(profile) => profile,
        Err(err) => {
            warn!(error = %err, "google oauth exchange failed");
            return failure("google_auth_failed");
        }
    };

    let users = match user_service(&state) {
        Ok(users) => users,
        Err(_) => return failure("google_auth_processing_error"),
    };

    let user = match users.resolve_google_profile(&profile).await {
        Ok(user) => user,
        Err(UserServiceError::ProviderMismatch) => return failure("provider_mismatch"),
        Err(UserServiceError::MissingProviderEmail) => return failure("email_missing"),
        Err(err) => {
            warn!(error = %err, "google account resolution failed");
            return failure("google_auth_processing_error");
        }
    };

    let bundle = match session_manager(&state) {
        Ok(sessions) => match sessions.issue(user.id).await {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!(error = %err, "session issuance failed after google sign-in");
                return failure("google_auth_processing_error");
            }
        },
        Err(_) => return failure("google_auth_processing_error"),
    };

    let mut response = Redirect::to(&state.config.google.post_login_redirect).into_response();
    apply_cookies(&mut response, &[bundle.cookie]);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oauth_service::OAuthError;
    use async_trait::async_trait;
    use axum::http::{StatusCode, header};
    use shared::{config::server::GoogleConfig, models::ProviderProfile};

    struct FailingExchange;

    #[async_trait]
    impl GoogleExchange for FailingExchange {
        async fn fetch_profile(
            &self,
            _config: &GoogleConfig,
            _auth_code: String,
        ) -> Result<ProviderProfile, OAuthError> {
            Err(OAuthError::Exchange("provider unreachable".to_string()))
        }
    }

    struct SucceedingExchange;

    #[async_trait]
    impl GoogleExchange for SucceedingExchange {
        async fn fetch_profile(
            &self,
            _config: &GoogleConfig,
            _auth_code: String,
        ) -> Result<ProviderProfile, OAuthError> {
            Ok(ProviderProfile {
                provider_id: "g1".to_string(),
                display_name: "Ann Lee".to_string(),
                emails: vec!["ann2@x.com".to_string()],
            })
        }
    }

    fn callback_params() -> Query<OAuthCallback> {
        Query(OAuthCallback {
            code: "auth-code".to_string(),
            state: None,
        })
    }

    fn location(response: &Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn exchange_failure_redirects_to_login_with_error() {
        let state = State(Arc::new(AppState::default()));
        let response =
            google_oauth_callback_with_service(callback_params(), state, FailingExchange).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let target = location(&response);
        assert!(target.starts_with("http://localhost:5173/login"));
        assert!(target.contains("error=google_auth_failed"));
    }

    #[tokio::test]
    async fn resolution_failure_redirects_with_processing_error() {
        // No pool configured: the exchange succeeds but resolution cannot.
        let state = State(Arc::new(AppState::default()));
        let response =
            google_oauth_callback_with_service(callback_params(), state, SucceedingExchange)
                .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).contains("error=google_auth_processing_error"));
    }
}
