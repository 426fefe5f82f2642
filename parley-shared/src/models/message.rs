use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Timestamp;

/// Request to send a direct message. At least one of `text` and `image`
/// must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SendMessageRequest {
    /// Message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Image attachment as a data URI; uploaded to the image host before
    /// the message is stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A stored direct message between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessageView {
    /// Unique identifier for the message.
    pub id: Uuid,

    /// The sending user.
    pub sender_id: Uuid,

    /// The receiving user.
    pub receiver_id: Uuid,

    /// Message text, if any.
    pub text: Option<String>,

    /// Stable reference to the attached image, if any.
    pub image_url: Option<String>,

    /// When the message was stored.
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn message_view_roundtrip() {
        let view = MessageView {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            text: Some("hello".to_string()),
            image_url: None,
            created_at: Timestamp(Utc::now()),
        };
        let json = serde_json::to_string(&view).unwrap();
        let back: MessageView = serde_json::from_str(&json).unwrap();
        assert_eq!(back, view);
    }

    #[test]
    fn send_request_allows_text_only() {
        let request: SendMessageRequest = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(request.text.as_deref(), Some("hi"));
        assert!(request.image.is_none());
    }
}
