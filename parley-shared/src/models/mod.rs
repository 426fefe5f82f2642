//! Wire models shared between the Parley server and its clients.

pub mod errors;
pub mod friend;
pub mod message;
pub mod oauth;
pub mod timestamp;
pub mod user;

pub use errors::ErrorResponse;
pub use friend::SendFriendRequest;
pub use message::{MessageView, SendMessageRequest};
pub use oauth::{OAuthCallback, ProviderProfile};
pub use timestamp::Timestamp;
pub use user::{
    AuthProvider, LoginRequest, SignupRequest, UpdateProfileRequest, User, UserSummary,
    UsernameAvailability,
};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Generic acknowledgement body for operations without a richer result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StatusMessage {
    /// Human-readable outcome description.
    pub message: String,
}

impl StatusMessage {
    /// Build an acknowledgement from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
