pub mod auth;
pub mod friends;
pub mod google_auth;
pub mod messages;
