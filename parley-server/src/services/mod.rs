pub mod friend_service;
pub mod image_host;
pub mod message_service;
pub mod oauth_service;
pub mod user_service;
