//! Password hashing.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking pool and are
//! awaited like any other store call.

use crate::auth::error::AuthError;

/// Hash a password with the given bcrypt cost.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AuthError::Internal(format!("failed to hash password: {}", e)))
}

/// Compare a candidate password against a stored hash.
///
/// A stored hash that bcrypt cannot parse counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("password verification task failed: {}", e)))?;

    match verified {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            Ok(false)
        }
    }
}
