use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::{
    app_state::AppState,
    auth::session::{SessionManager, clear_session_cookie},
    http::error::{ApiError, AppResult},
    middleware::auth::{CurrentUser, extract_session_cookie},
    services::{image_host::ImageHost, user_service::UserService},
};
use shared::models::{
    ErrorResponse, LoginRequest, SignupRequest, StatusMessage, UpdateProfileRequest, User,
    UsernameAvailability,
};

pub(crate) fn user_service(state: &Arc<AppState>) -> Result<UserService, ApiError> {
    state
        .pool
        .clone()
        .map(UserService::new)
        .ok_or_else(|| ApiError::internal_server_error("database unavailable"))
}

pub(crate) fn session_manager(
    state: &Arc<AppState>,
) -> Result<Arc<dyn SessionManager>, ApiError> {
    state
        .sessions
        .clone()
        .ok_or_else(|| ApiError::internal_server_error("session service unavailable"))
}

pub(crate) fn image_host(state: &Arc<AppState>) -> Result<Arc<dyn ImageHost>, ApiError> {
    state
        .images
        .clone()
        .ok_or_else(|| ApiError::internal_server_error("image host unavailable"))
}

pub(crate) fn apply_cookies(response: &mut Response, cookies: &[cookie::Cookie<'static>]) {
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
}

/// Create a password-provisioned account and open a session for it.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 409, description = "Email or username already taken", body = ErrorResponse),
        (status = 422, description = "Malformed submission", body = ErrorResponse)
    ),
    tag = "Auth"
)]
#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<Response> {
    let users = user_service(&state)?;
    let sessions = session_manager(&state)?;

    let user = users.register(&payload).await.map_err(ApiError::from)?;
    let bundle = sessions.issue(user.id).await.map_err(ApiError::from)?;

    let mut response = (StatusCode::CREATED, Json(user)).into_response();
    apply_cookies(&mut response, &[bundle.cookie]);
    Ok(response)
}

/// Authenticate with email and password.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = User),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "Auth"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Response> {
    if payload.email.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(ApiError::validation("Email and password are required."));
    }

    let users = user_service(&state)?;
    let sessions = session_manager(&state)?;

    let user = users
        .verify_credentials(&payload.email, &payload.password)
        .await
        .map_err(ApiError::from)?;
    let bundle = sessions.issue(user.id).await.map_err(ApiError::from)?;

    let mut response = Json(user).into_response();
    apply_cookies(&mut response, &[bundle.cookie]);
    Ok(response)
}

/// End the caller's session and clear the cookie.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = StatusMessage)
    ),
    tag = "Auth"
)]
#[instrument(skip(state, headers))]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> AppResult<Response> {
    let cookie_name = &state.config.session.cookie_name;
    if let Some(token) = extract_session_cookie(&headers, cookie_name) {
        let sessions = session_manager(&state)?;
        sessions.revoke(&token).await.map_err(ApiError::from)?;
    }

    let mut response = Json(StatusMessage::new("Logged out successfully.")).into_response();
    apply_cookies(&mut response, &[clear_session_cookie(&state.config)]);
    Ok(response)
}

/// The authenticated caller's own account.
#[utoipa::path(
    get,
    path = "/auth/check",
    responses(
        (status = 200, description = "Current account", body = User),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Auth"
)]
#[instrument(skip(current))]
pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.0.to_user())
}

/// Probe whether a username can be claimed by the caller.
#[utoipa::path(
    get,
    path = "/auth/username/check/{username}",
    params(("username" = String, Path, description = "Candidate username")),
    responses(
        (status = 200, description = "Availability verdict", body = UsernameAvailability),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Auth"
)]
#[instrument(skip(state, current))]
pub async fn check_username(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> AppResult<Json<UsernameAvailability>> {
    let users = user_service(&state)?;
    let availability = users
        .check_username(&current.0.username, &username)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(availability))
}

/// Update the caller's username and/or avatar. All-or-nothing; a username
/// change re-issues the session cookie.
#[utoipa::path(
    put,
    path = "/auth/update-profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated account", body = User),
        (status = 409, description = "Username already taken", body = ErrorResponse),
        (status = 422, description = "No changes or invalid username", body = ErrorResponse),
        (status = 502, description = "Image upload failed", body = ErrorResponse)
    ),
    tag = "Auth"
)]
#[instrument(skip(state, current, payload))]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Response> {
    let users = user_service(&state)?;
    let images = image_host(&state)?;

    let (user, username_changed) = users
        .update_profile(current.0.id, &payload, images.as_ref())
        .await
        .map_err(ApiError::from)?;

    let mut response = Json(user).into_response();
    if username_changed {
        let sessions = session_manager(&state)?;
        let bundle = sessions.issue(current.0.id).await.map_err(ApiError::from)?;
        apply_cookies(&mut response, &[bundle.cookie]);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use cookie::Cookie;

    #[test]
    fn helpers_error_without_configured_collaborators() {
        let state = Arc::new(AppState::default());
        assert!(user_service(&state).is_err());
        assert!(session_manager(&state).is_err());
        assert!(image_host(&state).is_err());
    }

    #[test]
    fn apply_cookies_appends_set_cookie_headers() {
        let mut response = Response::new(Body::empty());
        let session = Cookie::build(("parley_session", "token")).path("/").build();
        let other = Cookie::build(("theme", "dark")).path("/").build();
        apply_cookies(&mut response, &[session, other]);

        let headers: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_string())
            .collect();
        assert_eq!(headers.len(), 2);
        assert!(
            headers
                .iter()
                .any(|value| value.starts_with("parley_session=") && value.contains("Path=/"))
        );
    }
}
