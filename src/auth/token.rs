//! Signed, time-limited session tokens.
//!
//! Access and refresh tokens are HS256 JWTs signed with two distinct secrets;
//! a token verifies only against the secret of its own class. Every token
//! carries a random `jti`, so two tokens issued for the same user within the
//! same second still differ.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::auth::error::{TokenError, TokenKind};
use crate::config::AuthConfig;
use crate::db::UserView;
use crate::types::{AccessToken, RefreshToken, UserId};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: UserId,
    pub email: String,
    pub username: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Claim sets that carry an expiry timestamp.
pub trait ExpiringClaims {
    fn expires_at(&self) -> i64;
}

impl ExpiringClaims for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl ExpiringClaims for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl SigningKeys {
    fn from_secret(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }
}

/// Issues and verifies access and refresh tokens.
pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec from the configured secrets and lifetimes.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact: no grace period after `exp`.
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: SigningKeys::from_secret(&config.access_token_secret, config.access_token_ttl_secs),
            refresh: SigningKeys::from_secret(&config.refresh_token_secret, config.refresh_token_ttl_secs),
            validation,
        }
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access.ttl_secs
    }

    /// Refresh token lifetime in seconds.
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh.ttl_secs
    }

    /// Sign an access token carrying the user's id and profile fields.
    pub fn issue_access_token(&self, user: &UserView) -> Result<AccessToken, TokenError> {
        self.issue_access_token_at(user, Utc::now().timestamp())
    }

    /// Sign a refresh token carrying only the user's id.
    pub fn issue_refresh_token(&self, user_id: &UserId) -> Result<RefreshToken, TokenError> {
        self.issue_refresh_token_at(user_id, Utc::now().timestamp())
    }

    /// Issue both tokens for a user.
    pub fn issue_pair(&self, user: &UserView) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(&user.id)?,
        })
    }

    pub(crate) fn issue_access_token_at(
        &self,
        user: &UserView,
        issued_at: i64,
    ) -> Result<AccessToken, TokenError> {
        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat: issued_at,
            exp: issued_at.saturating_add(self.access.ttl_secs),
            jti: Uuid::new_v4().to_string(),
        };
        sign(&claims, &self.access.encoding).map(AccessToken::new)
    }

    pub(crate) fn issue_refresh_token_at(
        &self,
        user_id: &UserId,
        issued_at: i64,
    ) -> Result<RefreshToken, TokenError> {
        let claims = RefreshClaims {
            sub: user_id.clone(),
            iat: issued_at,
            exp: issued_at.saturating_add(self.refresh.ttl_secs),
            jti: Uuid::new_v4().to_string(),
        };
        sign(&claims, &self.refresh.encoding).map(RefreshToken::new)
    }

    /// Verify an access token's signature and expiry.
    pub fn verify_access(&self, token: &AccessToken) -> Result<AccessClaims, TokenError> {
        self.verify(token.as_str(), TokenKind::Access)
    }

    /// Verify a refresh token's signature and expiry.
    ///
    /// This is only the cryptographic half of refresh token validity; the
    /// session manager additionally requires a match with the stored token.
    pub fn verify_refresh(&self, token: &RefreshToken) -> Result<RefreshClaims, TokenError> {
        self.verify(token.as_str(), TokenKind::Refresh)
    }

    /// Verify a raw token against the secret of the given class.
    pub fn verify<C>(&self, token: &str, kind: TokenKind) -> Result<C, TokenError>
    where
        C: DeserializeOwned + ExpiringClaims,
    {
        let keys = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };

        let data = decode::<C>(token, &keys.decoding, &self.validation).map_err(|e| {
            debug!("{} token rejected: {}", kind, e);
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            }
        })?;

        // Additional expiration check (jsonwebtoken does this, but be explicit)
        if data.claims.expires_at() < Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

fn sign<C: Serialize>(claims: &C, key: &EncodingKey) -> Result<String, TokenError> {
    encode(&Header::new(Algorithm::HS256), claims, key).map_err(|e| TokenError::Signing(e.to_string()))
}
