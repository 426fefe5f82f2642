use std::sync::Arc;

use crate::{
    app_state::AppState,
    handlers::messages::{conversation, send_message, sidebar_users},
    middleware::auth::require_session,
};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tracing::info;

/// Function to register the message routes. All of them require a session.
/// The static `/messages/users` segment takes precedence over the
/// `{peer_id}` capture.
pub fn create_router_messages(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    info!("Creating messages router");
    Router::new()
        .route("/messages/users", get(sidebar_users))
        .route("/messages/send/{receiver_id}", post(send_message))
        .route("/messages/{peer_id}", get(conversation))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_router_has_routes() {
        let state = Arc::new(AppState::default());
        let router = create_router_messages(&state);
        assert!(router.has_routes(), "Router should not be empty");
    }
}
