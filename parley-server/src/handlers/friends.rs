use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::auth::CurrentUser,
    services::friend_service::FriendService,
};
use shared::models::{ErrorResponse, SendFriendRequest, StatusMessage, UserSummary};

fn friend_service(state: &Arc<AppState>) -> Result<FriendService, ApiError> {
    state
        .pool
        .clone()
        .map(FriendService::new)
        .ok_or_else(|| ApiError::internal_server_error("database unavailable"))
}

/// Send a friend request to a user identified by username or email.
#[utoipa::path(
    post,
    path = "/friends/request/send",
    request_body = SendFriendRequest,
    responses(
        (status = 200, description = "Request sent", body = StatusMessage),
        (status = 404, description = "No such user", body = ErrorResponse),
        (status = 409, description = "Relationship already exists", body = ErrorResponse)
    ),
    tag = "Friends"
)]
#[instrument(skip(state, current, payload))]
pub async fn send_request(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<SendFriendRequest>,
) -> AppResult<Json<StatusMessage>> {
    let friends = friend_service(&state)?;
    friends
        .send_request(current.0.id, &payload.identifier)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(StatusMessage::new("Friend request sent successfully.")))
}

/// Accept a pending friend request from `sender_id`.
#[utoipa::path(
    post,
    path = "/friends/request/accept/{sender_id}",
    params(("sender_id" = Uuid, Path, description = "User whose request is accepted")),
    responses(
        (status = 200, description = "Request accepted", body = StatusMessage),
        (status = 404, description = "No such user", body = ErrorResponse),
        (status = 409, description = "No pending request", body = ErrorResponse)
    ),
    tag = "Friends"
)]
#[instrument(skip(state, current))]
pub async fn accept_request(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(sender_id): Path<Uuid>,
) -> AppResult<Json<StatusMessage>> {
    let friends = friend_service(&state)?;
    friends
        .accept_request(current.0.id, sender_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(StatusMessage::new("Friend request accepted.")))
}

/// Reject a pending friend request from `sender_id`.
#[utoipa::path(
    post,
    path = "/friends/request/reject/{sender_id}",
    params(("sender_id" = Uuid, Path, description = "User whose request is rejected")),
    responses(
        (status = 200, description = "Request rejected", body = StatusMessage),
        (status = 404, description = "No such user", body = ErrorResponse),
        (status = 409, description = "No pending request", body = ErrorResponse)
    ),
    tag = "Friends"
)]
#[instrument(skip(state, current))]
pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(sender_id): Path<Uuid>,
) -> AppResult<Json<StatusMessage>> {
    let friends = friend_service(&state)?;
    friends
        .reject_request(current.0.id, sender_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(StatusMessage::new("Friend request rejected.")))
}

/// Remove an established friendship.
#[utoipa::path(
    delete,
    path = "/friends/remove/{friend_id}",
    params(("friend_id" = Uuid, Path, description = "Friend to remove")),
    responses(
        (status = 200, description = "Friend removed", body = StatusMessage),
        (status = 404, description = "No such user", body = ErrorResponse),
        (status = 409, description = "Not friends", body = ErrorResponse)
    ),
    tag = "Friends"
)]
#[instrument(skip(state, current))]
pub async fn remove_friend(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(friend_id): Path<Uuid>,
) -> AppResult<Json<StatusMessage>> {
    let friends = friend_service(&state)?;
    friends
        .remove_friend(current.0.id, friend_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(StatusMessage::new("Friend removed successfully.")))
}

/// The caller's friends.
#[utoipa::path(
    get,
    path = "/friends/list",
    responses((status = 200, description = "Friends", body = [UserSummary])),
    tag = "Friends"
)]
#[instrument(skip(state, current))]
pub async fn list_friends(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let friends = friend_service(&state)?;
    let list = friends
        .list_friends(current.0.id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(list))
}

/// Requests awaiting the caller's decision.
#[utoipa::path(
    get,
    path = "/friends/requests/pending",
    responses((status = 200, description = "Pending requests", body = [UserSummary])),
    tag = "Friends"
)]
#[instrument(skip(state, current))]
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let friends = friend_service(&state)?;
    let list = friends
        .list_incoming(current.0.id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(list))
}

/// Requests the caller has sent that are still pending.
#[utoipa::path(
    get,
    path = "/friends/requests/sent",
    responses((status = 200, description = "Sent requests", body = [UserSummary])),
    tag = "Friends"
)]
#[instrument(skip(state, current))]
pub async fn list_sent(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let friends = friend_service(&state)?;
    let list = friends
        .list_outgoing(current.0.id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(list))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friend_service_requires_a_pool() {
        let state = Arc::new(AppState::default());
        assert!(friend_service(&state).is_err());
    }
}
