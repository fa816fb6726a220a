//! Credential storage.

use serde::Deserialize;
use surrealdb::sql::Datetime;
use tracing::debug;

use crate::auth::error::AuthError;
use crate::db::Db;
use crate::db::schema::{AuditLogCreate, AuditLogRecord, UserCreate, UserRecord, UserView};
use crate::types::{RefreshToken, UserId};

/// How many times a conditional write is re-run after a transaction conflict.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Public profile columns; secrets are never selected.
const PROFILE_COLUMNS: &str =
    "uid, username, email, full_name, avatar, cover_image, created_at, updated_at";

#[derive(Debug, Deserialize)]
struct ProfileRow {
    uid: UserId,
    username: String,
    email: String,
    full_name: String,
    avatar: Option<String>,
    cover_image: Option<String>,
    created_at: Option<Datetime>,
    updated_at: Option<Datetime>,
}

impl From<ProfileRow> for UserView {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.uid,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            avatar: row.avatar,
            cover_image: row.cover_image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// User store for database operations.
///
/// Guarantees username and email uniqueness and owns every write to the
/// stored refresh token.
pub struct UserStore {
    db: Db,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Find a user matching either the username or the email.
    ///
    /// Inputs are expected to be normalized (trimmed, lowercased).
    pub async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>, AuthError> {
        let query = r#"
            SELECT * FROM user
            WHERE username = $username OR email = $email
            LIMIT 1
        "#;

        let mut res = self.db
            .query(query)
            .bind(("username", username.map(str::to_owned)))
            .bind(("email", email.map(str::to_owned)))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Get the full user record, secrets included.
    pub async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserRecord>, AuthError> {
        let query = "SELECT * FROM user WHERE uid = $uid LIMIT 1";

        let mut res = self.db
            .query(query)
            .bind(("uid", user_id.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Get the sanitized view of a user; password hash and refresh token are
    /// excluded by the projection itself.
    pub async fn find_view_by_id(&self, user_id: &UserId) -> Result<Option<UserView>, AuthError> {
        let query = format!("SELECT {} FROM user WHERE uid = $uid LIMIT 1", PROFILE_COLUMNS);

        let mut res = self.db
            .query(query)
            .bind(("uid", user_id.clone()))
            .await?;

        let rows: Vec<ProfileRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(UserView::from))
    }

    /// Create a new user. Fails with `Conflict` when the username or email
    /// is taken.
    pub async fn create(&self, create: UserCreate) -> Result<UserRecord, AuthError> {
        let query = r#"
            CREATE type::thing('user', $uid) CONTENT {
                uid: $uid,
                username: $username,
                email: $email,
                full_name: $full_name,
                avatar: $avatar,
                cover_image: $cover_image,
                password_hash: $password_hash,
                refresh_token: NONE
            }
        "#;

        let result = async {
            let mut res = self.db
                .query(query)
                .bind(("uid", create.uid))
                .bind(("username", create.username))
                .bind(("email", create.email))
                .bind(("full_name", create.full_name))
                .bind(("avatar", create.avatar))
                .bind(("cover_image", create.cover_image))
                .bind(("password_hash", create.password_hash))
                .await?;
            res.take::<Vec<UserRecord>>(0)
        }
        .await;

        match result {
            Ok(users) => users
                .into_iter()
                .next()
                .ok_or_else(|| AuthError::Internal("Failed to create user".to_string())),
            Err(e) if is_unique_violation(&e) => Err(AuthError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the stored refresh token, invalidating any previous one.
    pub async fn set_refresh_token(
        &self,
        user_id: &UserId,
        token: &RefreshToken,
    ) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE user SET refresh_token = $new_token
            WHERE uid = $uid
            RETURN AFTER
        "#;

        let mut res = self.db
            .query(query)
            .bind(("uid", user_id.clone()))
            .bind(("new_token", token.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(!users.is_empty())
    }

    /// Replace the stored refresh token only if it still equals `presented`.
    ///
    /// Returns `false` when the stored token has already moved on (rotated
    /// or cleared). Of two concurrent rotations presenting the same token,
    /// at most one returns `true`.
    pub async fn rotate_refresh_token(
        &self,
        user_id: &UserId,
        presented: &RefreshToken,
        next: &RefreshToken,
    ) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE user SET refresh_token = $next
            WHERE uid = $uid AND refresh_token = $presented
            RETURN AFTER
        "#;

        let mut attempt = 1;
        loop {
            let result = async {
                let mut res = self.db
                    .query(query)
                    .bind(("uid", user_id.clone()))
                    .bind(("presented", presented.clone()))
                    .bind(("next", next.clone()))
                    .await?;
                res.take::<Vec<UserRecord>>(0)
            }
            .await;

            match result {
                Ok(users) => return Ok(!users.is_empty()),
                // A retry re-evaluates the condition against the winner's write.
                Err(e) if is_retryable_conflict(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("Refresh token rotation conflicted (attempt {}), retrying", attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Clear the stored refresh token. Idempotent.
    pub async fn clear_refresh_token(&self, user_id: &UserId) -> Result<(), AuthError> {
        let query = r#"
            UPDATE user SET refresh_token = NONE
            WHERE uid = $uid
        "#;

        self.db
            .query(query)
            .bind(("uid", user_id.clone()))
            .await?
            .check()?;

        Ok(())
    }

    /// Store a new password hash and revoke the stored refresh token.
    pub async fn replace_password(
        &self,
        user_id: &UserId,
        password_hash: String,
    ) -> Result<bool, AuthError> {
        let query = r#"
            UPDATE user SET
                password_hash = $password_hash,
                refresh_token = NONE
            WHERE uid = $uid
            RETURN AFTER
        "#;

        let mut res = self.db
            .query(query)
            .bind(("uid", user_id.clone()))
            .bind(("password_hash", password_hash))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(!users.is_empty())
    }

    /// Update profile fields. Fails with `Conflict` when the email belongs
    /// to another user.
    pub async fn update_account(
        &self,
        user_id: &UserId,
        full_name: String,
        email: String,
    ) -> Result<Option<UserRecord>, AuthError> {
        let query = r#"
            UPDATE user SET
                full_name = $full_name,
                email = $email
            WHERE uid = $uid
            RETURN AFTER
        "#;

        let result = async {
            let mut res = self.db
                .query(query)
                .bind(("uid", user_id.clone()))
                .bind(("full_name", full_name))
                .bind(("email", email))
                .await?;
            res.take::<Vec<UserRecord>>(0)
        }
        .await;

        match result {
            Ok(users) => Ok(users.into_iter().next()),
            Err(e) if is_unique_violation(&e) => Err(AuthError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an audit log entry.
    pub async fn audit_log(&self, entry: AuditLogCreate) -> Result<(), AuthError> {
        let query = r#"
            CREATE audit_log CONTENT {
                user_id: $user_id,
                action: $action,
                details: $details,
                ip_address: $ip_address,
                user_agent: $user_agent
            }
        "#;

        self.db
            .query(query)
            .bind(("user_id", entry.user_id))
            .bind(("action", entry.action))
            .bind(("details", entry.details))
            .bind(("ip_address", entry.ip_address))
            .bind(("user_agent", entry.user_agent))
            .await?
            .check()?;

        Ok(())
    }

    /// Get recent audit log entries for a user, newest first.
    pub async fn get_user_audit_log(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<AuditLogRecord>, AuthError> {
        let query = r#"
            SELECT * FROM audit_log
            WHERE user_id = $user_id
            ORDER BY created_at DESC
            LIMIT $limit
        "#;

        let mut res = self.db
            .query(query)
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await?;

        let logs: Vec<AuditLogRecord> = res.take(0)?;
        Ok(logs)
    }
}

fn is_unique_violation(err: &surrealdb::Error) -> bool {
    err.to_string().contains("already contains")
}

fn is_retryable_conflict(err: &surrealdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("can be retried") || msg.contains("conflict")
}
