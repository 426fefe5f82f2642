use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{self, header},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use tracing::instrument;

use crate::{
    app_state::AppState,
    auth::session::SessionUser,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
};

/// The authenticated caller, attached to the request by
/// [`require_session`]. Handlers take this as an extension; there is no
/// ambient current-user state.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub SessionUser);

/// Middleware guarding protected routes: resolves the session cookie and
/// attaches the caller, or rejects with 401.
#[instrument(skip(state, req, next))]
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let cookie_name = &state.config.session.cookie_name;
    let token = extract_session_cookie(req.headers(), cookie_name)
        .ok_or_else(|| ApiError::unauthenticated("Authentication required."))?;

    let sessions = state
        .sessions
        .clone()
        .ok_or_else(|| ApiError::internal_server_error("session service unavailable"))?;

    let session = sessions
        .resolve(&token)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::unauthenticated("Session is invalid or expired."))?;

    if let Some(context) = req.extensions_mut().get_mut::<RequestContext>() {
        context.session = Some(session.clone());
    }
    req.extensions_mut().insert(CurrentUser(session));

    Ok(next.run(req).await)
}

/// Pull the named cookie's value out of the request headers.
pub fn extract_session_cookie(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(header::COOKIE)?.to_str().ok()?;
    Cookie::split_parse(value)
        .flatten()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn extracts_named_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; parley_session=tok123; lang=en"),
        );
        assert_eq!(
            extract_session_cookie(&headers, "parley_session"),
            Some("tok123".to_string())
        );
    }

    #[test]
    fn absent_cookie_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_cookie(&headers, "parley_session"), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("other=value"));
        assert_eq!(extract_session_cookie(&headers, "parley_session"), None);
    }
}
