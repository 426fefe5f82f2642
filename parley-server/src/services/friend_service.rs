//! Friend graph engine.
//!
//! The relation between two users is stored as a single row keyed by the
//! unordered pair, so symmetry and request mirroring hold by construction.
//! Each mutation loads the pair row `FOR UPDATE` inside one transaction,
//! plans the transition with the pure functions below, and applies exactly
//! one write. Conflicting operations on the same pair serialize on the row
//! lock; the primary key settles concurrent first-inserts.

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use shared::models::UserSummary;

#[derive(Debug, Error)]
pub enum FriendServiceError {
    #[error("Username or email is required.")]
    MissingIdentifier,
    #[error("User not found.")]
    NotFound,
    #[error("You cannot send a friend request to yourself.")]
    SelfRequest,
    #[error("You are already friends with this user.")]
    AlreadyFriends,
    #[error("Friend request already sent.")]
    AlreadySent,
    #[error("This user has already sent you a friend request.")]
    AlreadyReceived,
    #[error("Friend request not found or already handled.")]
    NoSuchRequest,
    #[error("This user is not in your friends list.")]
    NotFriends,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type FriendServiceResult<T> = Result<T, FriendServiceError>;

/// Stored status of a pair row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStatus {
    PendingLoHi,
    PendingHiLo,
    Friends,
}

impl EdgeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingLoHi => "pending_lo_hi",
            Self::PendingHiLo => "pending_hi_lo",
            Self::Friends => "friends",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_lo_hi" => Some(Self::PendingLoHi),
            "pending_hi_lo" => Some(Self::PendingHiLo),
            "friends" => Some(Self::Friends),
            _ => None,
        }
    }
}

/// Unordered pair key with the canonical `lo < hi` orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairKey {
    lo: Uuid,
    hi: Uuid,
}

impl PairKey {
    /// Build the canonical key for two distinct users.
    pub fn new(a: Uuid, b: Uuid) -> FriendServiceResult<Self> {
        if a == b {
            return Err(FriendServiceError::SelfRequest);
        }
        if a < b {
            Ok(Self { lo: a, hi: b })
        } else {
            Ok(Self { lo: b, hi: a })
        }
    }

    #[must_use]
    pub fn lo(&self) -> Uuid {
        self.lo
    }

    #[must_use]
    pub fn hi(&self) -> Uuid {
        self.hi
    }

    /// The pending status representing a request sent by `sender`.
    #[must_use]
    pub fn pending_from(&self, sender: Uuid) -> EdgeStatus {
        if sender == self.lo {
            EdgeStatus::PendingLoHi
        } else {
            EdgeStatus::PendingHiLo
        }
    }
}

/// Relationship of a pair as seen from one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    None,
    Friends,
    /// The actor has a pending outgoing request to the peer.
    Sent,
    /// The peer has a pending request awaiting the actor.
    Received,
}

/// Project the stored status onto the actor's point of view.
#[must_use]
pub fn relation_from(key: &PairKey, actor: Uuid, status: Option<EdgeStatus>) -> Relation {
    match status {
        None => Relation::None,
        Some(EdgeStatus::Friends) => Relation::Friends,
        Some(pending) => {
            if key.pending_from(actor) == pending {
                Relation::Sent
            } else {
                Relation::Received
            }
        }
    }
}

/// Plan a `send_request`: returns the status to insert.
pub fn plan_send(
    key: &PairKey,
    actor: Uuid,
    status: Option<EdgeStatus>,
) -> FriendServiceResult<EdgeStatus> {
    match relation_from(key, actor, status) {
        Relation::None => Ok(key.pending_from(actor)),
        Relation::Friends => Err(FriendServiceError::AlreadyFriends),
        Relation::Sent => Err(FriendServiceError::AlreadySent),
        Relation::Received => Err(FriendServiceError::AlreadyReceived),
    }
}

/// Plan an `accept_request` by the receiving side: the row flips to
/// `friends`.
pub fn plan_accept(
    key: &PairKey,
    actor: Uuid,
    status: Option<EdgeStatus>,
) -> FriendServiceResult<()> {
    match relation_from(key, actor, status) {
        Relation::Received => Ok(()),
        _ => Err(FriendServiceError::NoSuchRequest),
    }
}

/// Plan a `reject_request` by the receiving side: the row is deleted.
pub fn plan_reject(
    key: &PairKey,
    actor: Uuid,
    status: Option<EdgeStatus>,
) -> FriendServiceResult<()> {
    match relation_from(key, actor, status) {
        Relation::Received => Ok(()),
        _ => Err(FriendServiceError::NoSuchRequest),
    }
}

/// Plan a `remove_friend`: the row is deleted.
pub fn plan_remove(
    key: &PairKey,
    actor: Uuid,
    status: Option<EdgeStatus>,
) -> FriendServiceResult<()> {
    match relation_from(key, actor, status) {
        Relation::Friends => Ok(()),
        _ => Err(FriendServiceError::NotFriends),
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    username: String,
    email: String,
    avatar_url: String,
}

impl From<SummaryRow> for UserSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            avatar_url: row.avatar_url,
        }
    }
}

/// Database-backed friend graph service.
#[derive(Clone)]
pub struct FriendService {
    pool: PgPool,
}

impl std::fmt::Debug for FriendService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FriendService").finish()
    }
}

impl FriendService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(name = "friends.send_request", skip(self, identifier), err)]
    pub async fn send_request(
        &self,
        actor: Uuid,
        identifier: &str,
    ) -> FriendServiceResult<UserSummary> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(FriendServiceError::MissingIdentifier);
        }

        let mut tx = self.pool.begin().await?;

        let receiver = Self::resolve_identifier(&mut tx, identifier)
            .await?
            .ok_or(FriendServiceError::NotFound)?;

        let key = PairKey::new(actor, receiver.id)?;
        let status = Self::load_status(&mut tx, &key).await?;
        let inserted = plan_send(&key, actor, status)?;

        let insert = sqlx::query(
            "INSERT INTO friendships (user_lo, user_hi, status) VALUES ($1, $2, $3)",
        )
        .bind(key.lo())
        .bind(key.hi())
        .bind(inserted.as_str())
        .execute(&mut *tx)
        .await;

        if let Err(err) = insert {
            // A concurrent mirrored send lost the insert race; the pair now
            // has a request either way.
            if is_unique_violation(&err) {
                return Err(FriendServiceError::AlreadySent);
            }
            return Err(err.into());
        }

        tx.commit().await?;
        Ok(receiver)
    }

    #[instrument(name = "friends.accept_request", skip(self), err)]
    pub async fn accept_request(&self, actor: Uuid, sender_id: Uuid) -> FriendServiceResult<()> {
        let mut tx = self.pool.begin().await?;

        if !Self::user_exists(&mut tx, sender_id).await? {
            return Err(FriendServiceError::NotFound);
        }

        let key = PairKey::new(actor, sender_id)?;
        let status = Self::load_status(&mut tx, &key).await?;
        plan_accept(&key, actor, status)?;

        sqlx::query(
            "UPDATE friendships SET status = 'friends', updated_at = now()
             WHERE user_lo = $1 AND user_hi = $2",
        )
        .bind(key.lo())
        .bind(key.hi())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(name = "friends.reject_request", skip(self), err)]
    pub async fn reject_request(&self, actor: Uuid, sender_id: Uuid) -> FriendServiceResult<()> {
        let mut tx = self.pool.begin().await?;

        if !Self::user_exists(&mut tx, sender_id).await? {
            return Err(FriendServiceError::NotFound);
        }

        let key = PairKey::new(actor, sender_id)?;
        let status = Self::load_status(&mut tx, &key).await?;
        plan_reject(&key, actor, status)?;

        Self::delete_edge(&mut tx, &key).await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(name = "friends.remove_friend", skip(self), err)]
    pub async fn remove_friend(&self, actor: Uuid, friend_id: Uuid) -> FriendServiceResult<()> {
        let mut tx = self.pool.begin().await?;

        if !Self::user_exists(&mut tx, friend_id).await? {
            return Err(FriendServiceError::NotFound);
        }

        let key = PairKey::new(actor, friend_id)?;
        let status = Self::load_status(&mut tx, &key).await?;
        plan_remove(&key, actor, status)?;

        Self::delete_edge(&mut tx, &key).await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(name = "friends.list_friends", skip(self), err)]
    pub async fn list_friends(&self, actor: Uuid) -> FriendServiceResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT u.id,
                    u.username::TEXT AS username,
                    u.email::TEXT AS email,
                    u.avatar_url
             FROM friendships f
             JOIN users u
               ON u.id = CASE WHEN f.user_lo = $1 THEN f.user_hi ELSE f.user_lo END
             WHERE (f.user_lo = $1 OR f.user_hi = $1)
               AND f.status = 'friends'
             ORDER BY u.username",
        )
        .bind(actor)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    /// Requests awaiting the actor's decision.
    #[instrument(name = "friends.list_incoming", skip(self), err)]
    pub async fn list_incoming(&self, actor: Uuid) -> FriendServiceResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT u.id,
                    u.username::TEXT AS username,
                    u.email::TEXT AS email,
                    u.avatar_url
             FROM friendships f
             JOIN users u
               ON u.id = CASE WHEN f.user_lo = $1 THEN f.user_hi ELSE f.user_lo END
             WHERE (f.user_lo = $1 AND f.status = 'pending_hi_lo')
                OR (f.user_hi = $1 AND f.status = 'pending_lo_hi')
             ORDER BY f.created_at",
        )
        .bind(actor)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    /// Requests the actor has sent and that are still pending.
    #[instrument(name = "friends.list_outgoing", skip(self), err)]
    pub async fn list_outgoing(&self, actor: Uuid) -> FriendServiceResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT u.id,
                    u.username::TEXT AS username,
                    u.email::TEXT AS email,
                    u.avatar_url
             FROM friendships f
             JOIN users u
               ON u.id = CASE WHEN f.user_lo = $1 THEN f.user_hi ELSE f.user_lo END
             WHERE (f.user_lo = $1 AND f.status = 'pending_lo_hi')
                OR (f.user_hi = $1 AND f.status = 'pending_hi_lo')
             ORDER BY f.created_at",
        )
        .bind(actor)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    /// Username match wins over email match; uniqueness makes each lookup
    /// yield at most one row.
    async fn resolve_identifier(
        tx: &mut Transaction<'_, Postgres>,
        identifier: &str,
    ) -> Result<Option<UserSummary>, sqlx::Error> {
        let by_username = sqlx::query_as::<_, SummaryRow>(
            "SELECT id, username::TEXT AS username, email::TEXT AS email, avatar_url
             FROM users WHERE username = $1::citext",
        )
        .bind(identifier)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = by_username {
            return Ok(Some(row.into()));
        }

        let by_email = sqlx::query_as::<_, SummaryRow>(
            "SELECT id, username::TEXT AS username, email::TEXT AS email, avatar_url
             FROM users WHERE email = $1::citext",
        )
        .bind(identifier)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(by_email.map(UserSummary::from))
    }

    async fn load_status(
        tx: &mut Transaction<'_, Postgres>,
        key: &PairKey,
    ) -> Result<Option<EdgeStatus>, sqlx::Error> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM friendships
             WHERE user_lo = $1 AND user_hi = $2
             FOR UPDATE",
        )
        .bind(key.lo())
        .bind(key.hi())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(status.as_deref().and_then(EdgeStatus::parse))
    }

    async fn delete_edge(
        tx: &mut Transaction<'_, Postgres>,
        key: &PairKey,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM friendships WHERE user_lo = $1 AND user_hi = $2")
            .bind(key.lo())
            .bind(key.hi())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn user_exists(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut **tx)
            .await
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn pair_key_is_order_independent() {
        let (a, b) = pair();
        let forward = PairKey::new(a, b).unwrap();
        let backward = PairKey::new(b, a).unwrap();
        assert_eq!(forward, backward);
        assert!(forward.lo() < forward.hi());
    }

    #[test]
    fn pair_key_rejects_self_relation() {
        let a = Uuid::new_v4();
        assert!(matches!(
            PairKey::new(a, a),
            Err(FriendServiceError::SelfRequest)
        ));
    }

    #[test]
    fn pending_direction_tracks_sender() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let from_a = key.pending_from(a);
        let from_b = key.pending_from(b);
        assert_ne!(from_a, from_b);
        // The same stored status reads as Sent for the sender and Received
        // for the peer.
        assert_eq!(relation_from(&key, a, Some(from_a)), Relation::Sent);
        assert_eq!(relation_from(&key, b, Some(from_a)), Relation::Received);
    }

    #[test]
    fn send_on_empty_pair_inserts_pending() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let inserted = plan_send(&key, a, None).unwrap();
        assert_eq!(inserted, key.pending_from(a));
    }

    #[test]
    fn duplicate_send_is_rejected() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let status = plan_send(&key, a, None).unwrap();
        assert!(matches!(
            plan_send(&key, a, Some(status)),
            Err(FriendServiceError::AlreadySent)
        ));
    }

    #[test]
    fn crossing_send_is_reported_as_already_received() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let status = plan_send(&key, a, None).unwrap();
        // B tries to send while A's request is pending: mirror-aware
        // rejection, not a duplicate-send error.
        assert!(matches!(
            plan_send(&key, b, Some(status)),
            Err(FriendServiceError::AlreadyReceived)
        ));
    }

    #[test]
    fn send_between_friends_is_rejected() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        assert!(matches!(
            plan_send(&key, a, Some(EdgeStatus::Friends)),
            Err(FriendServiceError::AlreadyFriends)
        ));
    }

    #[test]
    fn accept_completes_the_round_trip() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let status = plan_send(&key, a, None).unwrap();

        // Only the receiver may accept.
        assert!(matches!(
            plan_accept(&key, a, Some(status)),
            Err(FriendServiceError::NoSuchRequest)
        ));
        plan_accept(&key, b, Some(status)).unwrap();

        // After the accept the pair is symmetric friends and no request
        // remains in either direction.
        let accepted = EdgeStatus::Friends;
        assert_eq!(relation_from(&key, a, Some(accepted)), Relation::Friends);
        assert_eq!(relation_from(&key, b, Some(accepted)), Relation::Friends);
        assert!(matches!(
            plan_accept(&key, b, Some(accepted)),
            Err(FriendServiceError::NoSuchRequest)
        ));
    }

    #[test]
    fn accept_without_request_fails() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        assert!(matches!(
            plan_accept(&key, b, None),
            Err(FriendServiceError::NoSuchRequest)
        ));
        assert!(matches!(
            plan_accept(&key, b, Some(EdgeStatus::Friends)),
            Err(FriendServiceError::NoSuchRequest)
        ));
    }

    #[test]
    fn reject_clears_and_second_reject_fails() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let status = plan_send(&key, a, None).unwrap();

        plan_reject(&key, b, Some(status)).unwrap();
        // The row is deleted; rejecting again reports no such request and
        // leaves no half-state behind.
        assert!(matches!(
            plan_reject(&key, b, None),
            Err(FriendServiceError::NoSuchRequest)
        ));
        assert_eq!(relation_from(&key, a, None), Relation::None);
        assert_eq!(relation_from(&key, b, None), Relation::None);
    }

    #[test]
    fn sender_cannot_reject_own_request() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let status = plan_send(&key, a, None).unwrap();
        assert!(matches!(
            plan_reject(&key, a, Some(status)),
            Err(FriendServiceError::NoSuchRequest)
        ));
    }

    #[test]
    fn remove_friend_then_again_reports_not_friends() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();

        plan_remove(&key, a, Some(EdgeStatus::Friends)).unwrap();
        assert!(matches!(
            plan_remove(&key, a, None),
            Err(FriendServiceError::NotFriends)
        ));
    }

    #[test]
    fn remove_requires_an_established_friendship() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        let pending = plan_send(&key, a, None).unwrap();
        assert!(matches!(
            plan_remove(&key, a, Some(pending)),
            Err(FriendServiceError::NotFriends)
        ));
        assert!(matches!(
            plan_remove(&key, b, None),
            Err(FriendServiceError::NotFriends)
        ));
    }

    #[test]
    fn states_are_mutually_exclusive_per_pair() {
        let (a, b) = pair();
        let key = PairKey::new(a, b).unwrap();
        // A pending edge is never simultaneously a friendship from either
        // point of view.
        for actor in [a, b] {
            let rel = relation_from(&key, actor, Some(key.pending_from(a)));
            assert_ne!(rel, Relation::Friends);
        }
    }

    #[test]
    fn edge_status_roundtrips_through_storage_text() {
        for status in [
            EdgeStatus::PendingLoHi,
            EdgeStatus::PendingHiLo,
            EdgeStatus::Friends,
        ] {
            assert_eq!(EdgeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EdgeStatus::parse("blocked"), None);
    }
}
