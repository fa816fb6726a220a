//! Authentication and session errors.

use std::fmt;

use thiserror::Error;

/// Which of the two token classes an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Token signing and verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature and structure are fine, but `exp` has passed
    #[error("jwt expired")]
    Expired,

    /// Signed with a different secret, or tampered with
    #[error("invalid signature")]
    InvalidSignature,

    /// Not a JWT, wrong algorithm, or missing required claims
    #[error("jwt malformed: {0}")]
    Malformed(String),

    /// Encoding failed on our side
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Session lifecycle errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing or invalid request fields
    #[error("{0}")]
    Validation(String),

    /// No bearer credential was presented
    #[error("Unauthorized request")]
    MissingToken,

    /// Credential failed signature or expiry verification
    #[error("{0}")]
    Token(TokenError),

    /// Unknown identifier or wrong password at login
    #[error("Invalid user credentials")]
    InvalidCredentials,

    /// Wrong current password on password change; a credential failure
    /// like a bad login, with its own message
    #[error("Invalid old password")]
    IncorrectPassword,

    /// Token verified, but the identity it names no longer exists
    #[error("Invalid {0} token")]
    UnknownIdentity(TokenKind),

    /// Refresh token no longer matches the stored one
    #[error("Refresh token is expired or used")]
    RefreshTokenReused,

    /// Username or email already taken
    #[error("User with email or username already exists")]
    Conflict,

    /// Referenced user does not exist
    #[error("User does not exist")]
    NotFound,

    /// Credential store failure
    #[error("database error: {0}")]
    Database(String),

    /// Any other unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::MissingToken
            | Self::Token(_)
            | Self::InvalidCredentials
            | Self::IncorrectPassword
            | Self::UnknownIdentity(_)
            | Self::RefreshTokenReused => 401,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::MissingToken => "MISSING_TOKEN",
            Self::Token(TokenError::Expired) => "TOKEN_EXPIRED",
            Self::Token(_) => "INVALID_TOKEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::IncorrectPassword => "INCORRECT_PASSWORD",
            Self::UnknownIdentity(_) => "UNKNOWN_IDENTITY",
            Self::RefreshTokenReused => "REFRESH_TOKEN_REUSED",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the cause is on our side rather than the caller's.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => Self::Internal(msg),
            other => Self::Token(other),
        }
    }
}

impl From<surrealdb::Error> for AuthError {
    fn from(err: surrealdb::Error) -> Self {
        tracing::error!("Database error: {}", err);
        Self::Database(err.to_string())
    }
}
