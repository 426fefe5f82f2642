use std::sync::Arc;

use crate::{
    app_state::AppState,
    handlers::{
        auth::{check_username, login, logout, me, signup, update_profile},
        google_auth::{google_oauth_callback, google_oauth_init},
    },
    middleware::auth::require_session,
};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tracing::info;

/// Function to register the auth routes.
pub fn create_router_auth(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    info!("Creating auth router");
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/google", get(google_oauth_init))
        .route("/auth/google/callback", get(google_oauth_callback))
        .merge(
            Router::new()
                .route("/auth/check", get(me))
                .route("/auth/update-profile", put(update_profile))
                .route("/auth/username/check/{username}", get(check_username))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    require_session,
                )),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_router_has_routes() {
        let state = Arc::new(AppState::default());
        let router = create_router_auth(&state);
        assert!(router.has_routes(), "Router should not be empty");
    }
}
