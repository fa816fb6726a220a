use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{RecordId, sql::Datetime};

use crate::types::{RefreshToken, UserId};

/// Persisted user record, including secret fields.
///
/// Never serialize this outward; convert to [`UserView`] first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier (`user:<uid>`)
    pub id: RecordId,
    /// Stable user identifier carried in token claims
    pub uid: UserId,
    /// Lowercased, unique handle
    pub username: String,
    /// Lowercased, unique email address
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Avatar image URL
    pub avatar: Option<String>,
    /// Cover image URL
    pub cover_image: Option<String>,
    /// bcrypt hash of the current password
    pub password_hash: String,
    /// The single refresh token currently accepted for this user
    pub refresh_token: Option<RefreshToken>,
    /// When the user registered
    pub created_at: Option<Datetime>,
    /// Last update time
    pub updated_at: Option<Datetime>,
}

impl UserRecord {
    /// Strip secret fields for returning to clients.
    pub fn sanitized(&self) -> UserView {
        UserView {
            id: self.uid.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            avatar: self.avatar.clone(),
            cover_image: self.cover_image.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Payload for creating a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub uid: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub password_hash: String,
}

/// User record with password hash and refresh token excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub created_at: Option<Datetime>,
    pub updated_at: Option<Datetime>,
}

/// Session lifecycle events recorded in the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Register,
    Login,
    LoginFailed,
    Refresh,
    RefreshReuseRejected,
    Logout,
    PasswordChanged,
    AccountUpdated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::LoginFailed => "login_failed",
            Self::Refresh => "refresh",
            Self::RefreshReuseRejected => "refresh_reuse_rejected",
            Self::Logout => "logout",
            Self::PasswordChanged => "password_changed",
            Self::AccountUpdated => "account_updated",
        }
    }
}

/// Payload for writing an audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogCreate {
    pub user_id: Option<String>,
    pub action: String,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Persisted audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: RecordId,
    pub user_id: Option<String>,
    pub action: String,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Option<Datetime>,
}
