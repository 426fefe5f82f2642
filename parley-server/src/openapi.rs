#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{
    ErrorResponse, LoginRequest, MessageView, SendFriendRequest, SendMessageRequest,
    SignupRequest, StatusMessage, UpdateProfileRequest, User, UserSummary, UsernameAvailability,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Parley API",
        version = "1.0.0",
        description = "API documentation for the Parley chat platform"
    ),
    paths(
        crate::handlers::auth::signup,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::check_username,
        crate::handlers::auth::update_profile,
        crate::handlers::google_auth::google_oauth_init,
        crate::handlers::google_auth::google_oauth_callback,
        crate::handlers::friends::send_request,
        crate::handlers::friends::accept_request,
        crate::handlers::friends::reject_request,
        crate::handlers::friends::remove_friend,
        crate::handlers::friends::list_friends,
        crate::handlers::friends::list_pending,
        crate::handlers::friends::list_sent,
        crate::handlers::messages::sidebar_users,
        crate::handlers::messages::conversation,
        crate::handlers::messages::send_message,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            UpdateProfileRequest,
            User,
            UserSummary,
            UsernameAvailability,
            SendFriendRequest,
            SendMessageRequest,
            MessageView,
            StatusMessage,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Authentication and profile endpoints"),
        (name = "Friends", description = "Friend graph endpoints"),
        (name = "Messages", description = "Direct messaging endpoints")
    )
)]
pub struct ApiDoc;
