use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    handlers::auth::image_host,
    http::error::{ApiError, AppResult},
    middleware::auth::CurrentUser,
    services::message_service::MessageService,
};
use shared::models::{ErrorResponse, MessageView, SendMessageRequest, UserSummary};

fn message_service(state: &Arc<AppState>) -> Result<MessageService, ApiError> {
    state
        .pool
        .clone()
        .map(MessageService::new)
        .ok_or_else(|| ApiError::internal_server_error("database unavailable"))
}

/// Every other user, for the chat sidebar.
#[utoipa::path(
    get,
    path = "/messages/users",
    responses((status = 200, description = "Sidebar users", body = [UserSummary])),
    tag = "Messages"
)]
#[instrument(skip(state, current))]
pub async fn sidebar_users(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let messages = message_service(&state)?;
    let users = messages
        .sidebar_users(current.0.id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(users))
}

/// Conversation history with a peer, oldest first.
#[utoipa::path(
    get,
    path = "/messages/{peer_id}",
    params(("peer_id" = Uuid, Path, description = "Conversation peer")),
    responses((status = 200, description = "Conversation history", body = [MessageView])),
    tag = "Messages"
)]
#[instrument(skip(state, current))]
pub async fn conversation(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(peer_id): Path<Uuid>,
) -> AppResult<Json<Vec<MessageView>>> {
    let messages = message_service(&state)?;
    let history = messages
        .conversation_with(current.0.id, peer_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(history))
}

/// Store a direct message for a receiver.
#[utoipa::path(
    post,
    path = "/messages/send/{receiver_id}",
    params(("receiver_id" = Uuid, Path, description = "Receiving user")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Stored message", body = MessageView),
        (status = 404, description = "No such user", body = ErrorResponse),
        (status = 422, description = "Empty message", body = ErrorResponse)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, current, payload))]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(receiver_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<Json<MessageView>> {
    let messages = message_service(&state)?;
    let images = image_host(&state)?;
    let stored = messages
        .send(current.0.id, receiver_id, &payload, images.as_ref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_service_requires_a_pool() {
        let state = Arc::new(AppState::default());
        assert!(message_service(&state).is_err());
    }
}
