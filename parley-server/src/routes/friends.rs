use std::sync::Arc;

use crate::{
    app_state::AppState,
    handlers::friends::{
        accept_request, list_friends, list_pending, list_sent, reject_request, remove_friend,
        send_request,
    },
    middleware::auth::require_session,
};
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tracing::info;

/// Function to register the friend graph routes. All of them require a
/// session.
pub fn create_router_friends(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    info!("Creating friends router");
    Router::new()
        .route("/friends/request/send", post(send_request))
        .route("/friends/request/accept/{sender_id}", post(accept_request))
        .route("/friends/request/reject/{sender_id}", post(reject_request))
        .route("/friends/remove/{friend_id}", delete(remove_friend))
        .route("/friends/list", get(list_friends))
        .route("/friends/requests/pending", get(list_pending))
        .route("/friends/requests/sent", get(list_sent))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
}
