//! Direct message storage. Simple inserts and reads; delivery guarantees
//! and the realtime transport live elsewhere.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use shared::models::{MessageView, SendMessageRequest, Timestamp, UserSummary};

use crate::services::image_host::ImageHost;

#[derive(Debug, Error)]
pub enum MessageServiceError {
    #[error("User not found.")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("image upload failed: {0}")]
    Upload(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type MessageServiceResult<T> = Result<T, MessageServiceError>;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    body: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for MessageView {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            text: row.body,
            image_url: row.image_url,
            created_at: Timestamp(row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    username: String,
    email: String,
    avatar_url: String,
}

/// Database-backed message service.
#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
}

impl std::fmt::Debug for MessageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageService").finish()
    }
}

impl MessageService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every other user, for the chat sidebar. Summaries only.
    #[instrument(name = "messages.sidebar_users", skip(self), err)]
    pub async fn sidebar_users(&self, actor: Uuid) -> MessageServiceResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT id, username::TEXT AS username, email::TEXT AS email, avatar_url
             FROM users WHERE id <> $1
             ORDER BY username",
        )
        .bind(actor)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserSummary {
                id: row.id,
                username: row.username,
                email: row.email,
                avatar_url: row.avatar_url,
            })
            .collect())
    }

    /// Both directions of a conversation, oldest first.
    #[instrument(name = "messages.conversation_with", skip(self), err)]
    pub async fn conversation_with(
        &self,
        actor: Uuid,
        peer: Uuid,
    ) -> MessageServiceResult<Vec<MessageView>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, sender_id, receiver_id, body, image_url, created_at
             FROM messages
             WHERE (sender_id = $1 AND receiver_id = $2)
                OR (sender_id = $2 AND receiver_id = $1)
             ORDER BY created_at",
        )
        .bind(actor)
        .bind(peer)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MessageView::from).collect())
    }

    /// Store a message, uploading the attached image first when present.
    #[instrument(name = "messages.send", skip(self, request, images), err)]
    pub async fn send(
        &self,
        actor: Uuid,
        receiver: Uuid,
        request: &SendMessageRequest,
        images: &dyn ImageHost,
    ) -> MessageServiceResult<MessageView> {
        let receiver_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(receiver)
                .fetch_one(&self.pool)
                .await?;
        if !receiver_exists {
            return Err(MessageServiceError::NotFound);
        }

        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let image_payload = request
            .image
            .as_deref()
            .map(str::trim)
            .filter(|payload| !payload.is_empty());

        if text.is_none() && image_payload.is_none() {
            return Err(MessageServiceError::Validation(
                "Message text or image is required.".to_string(),
            ));
        }

        let image_url = match image_payload {
            Some(payload) => Some(
                images
                    .upload(payload)
                    .await
                    .map_err(|err| MessageServiceError::Upload(err.to_string()))?,
            ),
            None => None,
        };

        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (sender_id, receiver_id, body, image_url)
             VALUES ($1, $2, $3, $4)
             RETURNING id, sender_id, receiver_id, body, image_url, created_at",
        )
        .bind(actor)
        .bind(receiver)
        .bind(text)
        .bind(image_url.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}
