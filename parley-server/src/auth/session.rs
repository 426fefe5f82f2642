use std::{str::FromStr, sync::Arc};

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, SameSite};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared::{
    config::server::Config,
    models::{AuthProvider, Timestamp, User},
};

/// Errors produced by the session subsystem.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("password verification failed")]
    InvalidCredentials,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("time conversion error: {0}")]
    TimeConversion(String),
}

/// Authenticated user details attached to the request context.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub avatar_url: String,
    pub auth_provider: AuthProvider,
    pub created_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl SessionUser {
    /// Public view of the account behind this session.
    #[must_use]
    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            avatar_url: self.avatar_url.clone(),
            auth_provider: self.auth_provider,
            created_at: Timestamp(self.created_at),
        }
    }
}

/// Session issuance output containing the raw token and encoded cookie.
#[derive(Debug, Clone)]
pub struct SessionBundle {
    pub token: String,
    pub cookie: Cookie<'static>,
    pub session_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Seam between handlers/middleware and the session storage, so both can be
/// exercised with an in-memory fake.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Mint a new session for the given user and build its cookie.
    async fn issue(&self, user_id: Uuid) -> Result<SessionBundle, SessionError>;

    /// Resolve a bearer token to its user. Expired and revoked tokens
    /// resolve to `None`. Pure lookup, safe to retry.
    async fn resolve(&self, token: &str) -> Result<Option<SessionUser>, SessionError>;

    /// Invalidate the session behind the given token immediately.
    async fn revoke(&self, token: &str) -> Result<(), SessionError>;
}

/// Database-backed session manager.
#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    config: Arc<Config>,
}

impl SessionService {
    pub fn new(pool: PgPool, config: Arc<Config>) -> Self {
        Self { pool, config }
    }

    fn session_ttl(&self) -> Duration {
        Duration::days(self.config.session.ttl_days.max(1))
    }

    fn build_cookie(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Cookie<'static>, SessionError> {
        build_session_cookie(&self.config, token, expires_at)
    }

    fn new_token() -> (String, Vec<u8>) {
        let mut raw = [0u8; 32];
        OsRng.fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);
        let hash = Sha256::digest(token.as_bytes());
        (token, hash.to_vec())
    }

    fn hash_for_token(token: &str) -> Vec<u8> {
        Sha256::digest(token.as_bytes()).to_vec()
    }
}

#[async_trait]
impl SessionManager for SessionService {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn issue(&self, user_id: Uuid) -> Result<SessionBundle, SessionError> {
        let (token, hash) = Self::new_token();
        let expires_at = Utc::now() + self.session_ttl();

        let record = sqlx::query_as::<_, SessionRow>(
            "INSERT INTO user_sessions (user_id, token_hash, expires_at)
             VALUES ($1, $2, $3)
             RETURNING id AS session_id, issued_at, expires_at",
        )
        .bind(user_id)
        .bind(&hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(session_id = %record.session_id, "issued new session");

        let cookie = self.build_cookie(&token, record.expires_at)?;

        Ok(SessionBundle {
            token,
            cookie,
            session_id: record.session_id,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
        })
    }

    #[instrument(skip(self, token))]
    async fn resolve(&self, token: &str) -> Result<Option<SessionUser>, SessionError> {
        if token.trim().is_empty() {
            return Ok(None);
        }

        let hash = Self::hash_for_token(token);
        let row = sqlx::query_as::<_, ActiveSessionRow>(
            "SELECT s.id AS session_id,
                    s.user_id,
                    s.expires_at,
                    u.email::TEXT AS email,
                    u.username::TEXT AS username,
                    u.avatar_url,
                    u.auth_provider,
                    u.created_at
             FROM user_sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = $1
               AND s.revoked_at IS NULL
               AND s.expires_at > now()",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let auth_provider =
            AuthProvider::from_str(&row.auth_provider).unwrap_or(AuthProvider::Password);

        Ok(Some(SessionUser {
            id: row.user_id,
            email: row.email,
            username: row.username,
            avatar_url: row.avatar_url,
            auth_provider,
            created_at: row.created_at,
            session_id: row.session_id,
            expires_at: row.expires_at,
        }))
    }

    #[instrument(skip(self, token))]
    async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        let hash = Self::hash_for_token(token);
        sqlx::query(
            "UPDATE user_sessions
             SET revoked_at = now()
             WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Build the session cookie for a raw token.
pub fn build_session_cookie(
    config: &Config,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<Cookie<'static>, SessionError> {
    let expires_utc = OffsetDateTime::from_unix_timestamp(expires_at.timestamp()).map_err(
        |err| SessionError::TimeConversion(format!("failed to convert cookie expiry: {err}")),
    )?;
    let max_age = (expires_utc - OffsetDateTime::now_utc()).max(TimeDuration::seconds(0));

    let mut builder = Cookie::build((config.session.cookie_name.clone(), token.to_owned()))
        .path("/")
        .http_only(true)
        .secure(config.session.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .expires(expires_utc);

    if let Some(domain) = &config.session.cookie_domain {
        builder = builder.domain(domain.clone());
    }

    Ok(builder.build())
}

/// Build an expired session cookie used to clear the browser state on
/// logout.
#[must_use]
pub fn clear_session_cookie(config: &Config) -> Cookie<'static> {
    let mut builder = Cookie::build((config.session.cookie_name.clone(), String::new()))
        .path("/")
        .http_only(true)
        .secure(config.session.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::seconds(0))
        .expires(OffsetDateTime::UNIX_EPOCH);

    if let Some(domain) = &config.session.cookie_domain {
        builder = builder.domain(domain.clone());
    }

    builder.build()
}

/// Compute an Argon2id password hash.
pub fn hash_password(password: &str) -> Result<String, SessionError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| SessionError::PasswordHash(err.to_string()))
}

/// Verify a password against an encoded Argon2id hash.
pub fn verify_password(hash: &str, candidate: &str) -> Result<(), SessionError> {
    let parsed =
        PasswordHash::new(hash).map_err(|err| SessionError::PasswordHash(err.to_string()))?;
    let argon2 = Argon2::default();
    argon2
        .verify_password(candidate.as_bytes(), &parsed)
        .map_err(|_| SessionError::InvalidCredentials)
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ActiveSessionRow {
    session_id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    email: String,
    username: String,
    avatar_url: String,
    auth_provider: String,
    created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(verify_password(&hash, "secret1").is_ok());
        assert!(matches!(
            verify_password(&hash, "wrong"),
            Err(SessionError::InvalidCredentials)
        ));
    }

    #[test]
    fn tokens_are_unique_and_hash_deterministically() {
        let (token_a, hash_a) = SessionService::new_token();
        let (token_b, hash_b) = SessionService::new_token();
        assert_ne!(token_a, token_b);
        assert_ne!(hash_a, hash_b);
        assert_eq!(SessionService::hash_for_token(&token_a), hash_a);
        // Raw tokens are never stored; only digests are.
        assert_eq!(hash_a.len(), 32);
    }

    #[test]
    fn session_cookie_is_http_only_and_scoped() {
        let config = Config::with_defaults();
        let expires = Utc::now() + Duration::days(7);
        let cookie = build_session_cookie(&config, "token-value", expires).unwrap();

        assert_eq!(cookie.name(), "parley_session");
        assert_eq!(cookie.value(), "token-value");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert!(cookie.max_age().unwrap() > TimeDuration::days(6));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let config = Config::with_defaults();
        let cookie = clear_session_cookie(&config);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(TimeDuration::seconds(0)));
        assert_eq!(cookie.expires(), Some(OffsetDateTime::UNIX_EPOCH.into()));
    }

    #[test]
    fn cookie_domain_applies_when_configured() {
        let mut config = Config::with_defaults();
        config.session.cookie_domain = Some("parley.dev".to_string());
        let cookie =
            build_session_cookie(&config, "t", Utc::now() + Duration::days(1)).unwrap();
        assert_eq!(cookie.domain(), Some("parley.dev"));
    }
}
