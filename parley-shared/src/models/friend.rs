use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Payload for sending a friend request. The identifier is resolved as a
/// username first, then as an email address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SendFriendRequest {
    /// Username or email of the user to befriend.
    pub identifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_identifier() {
        let payload: SendFriendRequest =
            serde_json::from_str(r#"{"identifier":"bob@x.com"}"#).unwrap();
        assert_eq!(payload.identifier, "bob@x.com");
    }
}
