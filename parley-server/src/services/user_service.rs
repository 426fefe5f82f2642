//! Identity store access: registration, credential checks, external
//! provisioning, and profile updates.

use rand::Rng;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use shared::models::{
    AuthProvider, ProviderProfile, SignupRequest, Timestamp, UpdateProfileRequest, User,
    UsernameAvailability,
};

use crate::{
    auth::session::{self, SessionError},
    services::image_host::ImageHost,
};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 20;
const PASSWORD_MIN: usize = 6;
const SUFFIX_LEN: usize = 4;
const PROVISION_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is provisioned through an external provider")]
    ExternalAccount,
    #[error("{0}")]
    NotFound(String),
    #[error("identity provider did not supply an email address")]
    MissingProviderEmail,
    #[error("email already registered with a different sign-in method")]
    ProviderMismatch,
    #[error("image upload failed: {0}")]
    Upload(String),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type UserServiceResult<T> = Result<T, UserServiceError>;

impl From<SessionError> for UserServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidCredentials => Self::InvalidCredentials,
            SessionError::PasswordHash(message) | SessionError::TimeConversion(message) => {
                Self::PasswordHash(message)
            }
            SessionError::Database(db_err) => Self::Database(db_err),
        }
    }
}

/// Validate a signup submission without touching storage.
pub fn validate_signup(request: &SignupRequest) -> UserServiceResult<()> {
    if request.username.trim().is_empty()
        || request.email.trim().is_empty()
        || request.password.is_empty()
    {
        return Err(UserServiceError::Validation(
            "Please fill in all fields.".to_string(),
        ));
    }
    let username_len = request.username.trim().chars().count();
    if username_len < USERNAME_MIN {
        return Err(UserServiceError::Validation(
            "Username must be at least 3 characters.".to_string(),
        ));
    }
    if username_len > USERNAME_MAX {
        return Err(UserServiceError::Validation(
            "Username cannot be more than 20 characters.".to_string(),
        ));
    }
    if request.password.chars().count() < PASSWORD_MIN {
        return Err(UserServiceError::Validation(
            "Password must be at least 6 characters.".to_string(),
        ));
    }
    Ok(())
}

/// Derive a username candidate from a provider display name: lowercased,
/// whitespace stripped, clamped to the length limit.
#[must_use]
pub fn derive_username(display_name: &str) -> String {
    let stripped: String = display_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    let base = if stripped.is_empty() {
        "user".to_string()
    } else {
        stripped
    };

    base.chars().take(USERNAME_MAX).collect()
}

/// Append a uniqueness tail, keeping the result within the length limit.
#[must_use]
pub fn suffixed_username(base: &str, tail: &str) -> String {
    let keep = USERNAME_MAX.saturating_sub(tail.chars().count());
    let mut candidate: String = base.chars().take(keep).collect();
    candidate.push_str(tail);
    candidate
}

fn numeric_tail() -> String {
    let n: u32 = rand::rng().random_range(0..10_000);
    format!("{n:0width$}", width = SUFFIX_LEN)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    avatar_url: String,
    auth_provider: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let auth_provider = row
            .auth_provider
            .parse()
            .unwrap_or(AuthProvider::Password);
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            avatar_url: row.avatar_url,
            auth_provider,
            created_at: Timestamp(row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    email: String,
    username: String,
    avatar_url: String,
    auth_provider: String,
    password_hash: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

const USER_COLUMNS: &str = "id, email::TEXT AS email, username::TEXT AS username, \
     avatar_url, auth_provider, created_at";

/// Identity store service.
#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService").finish()
    }
}

impl UserService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a password-provisioned account. The raw password is hashed
    /// before it reaches storage and is never persisted.
    #[instrument(name = "users.register", skip(self, request), err)]
    pub async fn register(&self, request: &SignupRequest) -> UserServiceResult<User> {
        validate_signup(request)?;

        let username = request.username.trim();
        let email = request.email.trim();

        if self.email_taken(email).await? {
            return Err(UserServiceError::Conflict("Email already exists.".to_string()));
        }
        if self.username_taken(username, None).await? {
            return Err(UserServiceError::Conflict(
                "Username already exists. Please choose another.".to_string(),
            ));
        }

        let password_hash = session::hash_password(&request.password)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, username, password_hash, auth_provider)
             VALUES ($1, $2, $3, 'password')
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(username)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_unique_violation)?;

        info!(user_id = %row.id, "registered new account");
        Ok(row.into())
    }

    /// Resolve an email/password submission to an account. Unknown email
    /// and wrong password collapse into one rejection; an
    /// externally-provisioned account without a password directs the
    /// caller to the external flow.
    #[instrument(name = "users.verify_credentials", skip(self, password), err)]
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> UserServiceResult<User> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1::citext"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(UserServiceError::InvalidCredentials);
        };

        let Some(hash) = row.password_hash.as_deref() else {
            if row.auth_provider == AuthProvider::Google.as_str() {
                return Err(UserServiceError::ExternalAccount);
            }
            return Err(UserServiceError::InvalidCredentials);
        };

        match session::verify_password(hash, password) {
            Ok(()) => {}
            Err(SessionError::InvalidCredentials) => {
                return Err(UserServiceError::InvalidCredentials);
            }
            Err(other) => return Err(other.into()),
        }

        Ok(User::from(UserRow {
            id: row.id,
            email: row.email,
            username: row.username,
            avatar_url: row.avatar_url,
            auth_provider: row.auth_provider,
            created_at: row.created_at,
        }))
    }

    /// Resolve an external-provider profile to an account, provisioning
    /// one on first sign-in.
    #[instrument(name = "users.resolve_google_profile", skip(self, profile), err)]
    pub async fn resolve_google_profile(
        &self,
        profile: &ProviderProfile,
    ) -> UserServiceResult<User> {
        let existing = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = $1"
        ))
        .bind(&profile.provider_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(row.into());
        }

        let email = profile
            .primary_email()
            .ok_or(UserServiceError::MissingProviderEmail)?;

        let holder = sqlx::query_scalar::<_, String>(
            "SELECT auth_provider FROM users WHERE email = $1::citext",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        // The email is claimed: same provider with a different external id
        // is just as suspect as a password account, so never merge.
        if holder.is_some() {
            return Err(UserServiceError::ProviderMismatch);
        }

        let base = derive_username(&profile.display_name);
        let mut candidate = base.clone();

        for attempt in 0..PROVISION_ATTEMPTS {
            if attempt > 0 {
                candidate = suffixed_username(&base, &numeric_tail());
            }
            if candidate.chars().count() < USERNAME_MIN {
                candidate = suffixed_username(&candidate, &numeric_tail());
            }
            if self.username_taken(&candidate, None).await? {
                continue;
            }

            let inserted = sqlx::query_as::<_, UserRow>(&format!(
                "INSERT INTO users (email, username, auth_provider, google_id)
                 VALUES ($1, $2, 'google', $3)
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(email)
            .bind(&candidate)
            .bind(&profile.provider_id)
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(row) => {
                    info!(user_id = %row.id, "provisioned account from external profile");
                    return Ok(row.into());
                }
                // Lost a username race; retry with a fresh tail.
                Err(err) if is_unique_violation_on(&err, "users_username_key") => {}
                Err(err) => return Err(map_user_unique_violation(err)),
            }
        }

        Err(UserServiceError::Conflict(
            "Could not allocate a unique username. Please try again.".to_string(),
        ))
    }

    /// Probe whether a username can be claimed by the caller.
    #[instrument(name = "users.check_username", skip(self), err)]
    pub async fn check_username(
        &self,
        current_username: &str,
        candidate: &str,
    ) -> UserServiceResult<UsernameAvailability> {
        let candidate = candidate.trim();
        let len = candidate.chars().count();

        if len < USERNAME_MIN {
            return Ok(UsernameAvailability {
                available: false,
                message: "Username must be at least 3 characters.".to_string(),
            });
        }
        if len > USERNAME_MAX {
            return Ok(UsernameAvailability {
                available: false,
                message: "Username cannot be more than 20 characters.".to_string(),
            });
        }
        if candidate.eq_ignore_ascii_case(current_username) {
            return Ok(UsernameAvailability {
                available: true,
                message: "This is your current username.".to_string(),
            });
        }

        if self.username_taken(candidate, None).await? {
            Ok(UsernameAvailability {
                available: false,
                message: "Username is already taken.".to_string(),
            })
        } else {
            Ok(UsernameAvailability {
                available: true,
                message: "Username is available.".to_string(),
            })
        }
    }

    /// Apply a profile update all-or-nothing: the username is validated and
    /// uniqueness-checked before the avatar is uploaded, and both fields
    /// land in a single UPDATE. An upload failure commits nothing.
    ///
    /// Returns the updated account and whether the username changed (the
    /// caller re-issues the session in that case).
    #[instrument(name = "users.update_profile", skip(self, request, images), err)]
    pub async fn update_profile(
        &self,
        actor: Uuid,
        request: &UpdateProfileRequest,
        images: &dyn ImageHost,
    ) -> UserServiceResult<(User, bool)> {
        let current = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(actor)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| UserServiceError::NotFound("User not found.".to_string()))?;

        let new_username = request
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != current.username)
            .map(ToString::to_string);

        if let Some(name) = &new_username {
            let len = name.chars().count();
            if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
                return Err(UserServiceError::Validation(
                    "Username must be between 3 and 20 characters.".to_string(),
                ));
            }
            if self.username_taken(name, Some(actor)).await? {
                return Err(UserServiceError::Conflict(
                    "This username is already taken by someone else.".to_string(),
                ));
            }
        }

        let avatar_payload = request
            .avatar
            .as_deref()
            .map(str::trim)
            .filter(|payload| !payload.is_empty());

        if new_username.is_none() && avatar_payload.is_none() {
            return Err(UserServiceError::Validation(
                "No changes provided to update.".to_string(),
            ));
        }

        let avatar_url = match avatar_payload {
            Some(payload) => Some(
                images
                    .upload(payload)
                    .await
                    .map_err(|err| UserServiceError::Upload(err.to_string()))?,
            ),
            None => None,
        };

        let updated = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users
             SET username = COALESCE($2::citext, username),
                 avatar_url = COALESCE($3, avatar_url),
                 updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(actor)
        .bind(new_username.as_deref())
        .bind(avatar_url.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation_on(&err, "users_username_key") {
                UserServiceError::Conflict(
                    "This username is already taken by someone else.".to_string(),
                )
            } else {
                UserServiceError::from(err)
            }
        })?;

        let username_changed = new_username.is_some();
        Ok((updated.into(), username_changed))
    }

    async fn email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1::citext)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
    }

    async fn username_taken(
        &self,
        username: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM users
                 WHERE username = $1::citext AND ($2::uuid IS NULL OR id <> $2)
             )",
        )
        .bind(username)
        .bind(excluding)
        .fetch_one(&self.pool)
        .await
    }
}

fn is_unique_violation_on(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.constraint() == Some(constraint)
    )
}

/// Map a unique violation from the insert backstop to the matching
/// per-field conflict message.
fn map_user_unique_violation(err: sqlx::Error) -> UserServiceError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return match db.constraint() {
            Some("users_email_key") => {
                UserServiceError::Conflict("Email already exists.".to_string())
            }
            Some("users_username_key") => UserServiceError::Conflict(
                "Username already exists. Please choose another.".to_string(),
            ),
            Some("users_google_id_key") => UserServiceError::ProviderMismatch,
            _ => UserServiceError::Database(err),
        };
    }
    UserServiceError::Database(err)
}
