use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    auth::session::SessionUser,
    http::error::{ApiError, AppResult},
};
use shared::config::server::Config;

/// Per-request context: the request id and, once the auth middleware has
/// run, the resolved session.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub session: Option<SessionUser>,
}

impl RequestContext {
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.id)
    }
}

#[derive(Clone, Debug)]
pub struct RequestIdState {
    header: HeaderName,
}

impl RequestIdState {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let header = HeaderName::from_str(&config.server.request_id_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
        Self { header }
    }
}

pub async fn assign_request_id(
    State(state): State<RequestIdState>,
    mut request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let header_name = state.header.clone();
    let current = extract_request_id(request.headers(), &header_name);

    let request_id = current.unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
        session: None,
    });

    request.headers_mut().insert(
        header_name.clone(),
        HeaderValue::from_str(&request_id)
            .map_err(|_| ApiError::internal_server_error("failed to encode request id"))?,
    );

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header_name,
        HeaderValue::from_str(&request_id)
            .map_err(|_| ApiError::internal_server_error("failed to encode request id"))?,
    );

    Ok(response)
}

fn extract_request_id(headers: &HeaderMap, header: &HeaderName) -> Option<String> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_request_id_trims_and_filters_empty() {
        let header = HeaderName::from_static("x-request-id");
        let mut headers = HeaderMap::new();

        headers.insert(&header, HeaderValue::from_static("  abc-123  "));
        assert_eq!(
            extract_request_id(&headers, &header),
            Some("abc-123".to_string())
        );

        headers.insert(&header, HeaderValue::from_static("   "));
        assert_eq!(extract_request_id(&headers, &header), None);
    }

    #[test]
    fn request_id_state_falls_back_on_invalid_header_name() {
        let mut config = Config::with_defaults();
        config.server.request_id_header = "not a header\n".to_string();
        let state = RequestIdState::from_config(&config);
        assert_eq!(state.header.as_str(), "x-request-id");
    }

    #[test]
    fn context_exposes_user_id_once_session_attached() {
        let context = RequestContext::default();
        assert_eq!(context.user_id(), None);
    }
}
