//! Authentication extractor for HTTP requests.

use std::sync::Arc;

use tracing::debug;

use crate::auth::context::{ClientInfo, UserContext};
use crate::auth::error::{AuthError, TokenKind};
use crate::auth::token::TokenCodec;
use crate::auth::user_store::UserStore;
use crate::types::AccessToken;

/// Name of the cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Name of the cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Gate run before protected handlers.
///
/// Verifies the presented access token and loads the sanitized identity it
/// names. It never touches the stored refresh token.
pub struct AuthExtractor {
    codec: Arc<TokenCodec>,
    user_store: Arc<UserStore>,
}

impl AuthExtractor {
    /// Create a new auth extractor.
    pub fn new(codec: Arc<TokenCodec>, user_store: Arc<UserStore>) -> Self {
        Self { codec, user_store }
    }

    /// Extract user context from request credentials.
    ///
    /// Checks in order:
    /// 1. `accessToken` cookie
    /// 2. `Authorization: Bearer <token>` header
    pub async fn extract_user(
        &self,
        cookie_token: Option<&str>,
        authorization: Option<&str>,
        client: ClientInfo,
    ) -> Result<UserContext, AuthError> {
        let token = presented_token(cookie_token, authorization).ok_or(AuthError::MissingToken)?;

        let claims = self.codec.verify_access(&token)?;
        debug!("Access token verified for user {}", claims.sub);

        let user = self
            .user_store
            .find_view_by_id(&claims.sub)
            .await?
            .ok_or_else(|| {
                debug!("Access token names unknown user {}", claims.sub);
                AuthError::UnknownIdentity(TokenKind::Access)
            })?;

        Ok(UserContext::new(user).with_client_info(client))
    }
}

/// Pick the credential to verify; a non-empty cookie wins over the header.
fn presented_token(cookie_token: Option<&str>, authorization: Option<&str>) -> Option<AccessToken> {
    if let Some(token) = cookie_token.map(str::trim)
        && !token.is_empty()
    {
        return Some(AccessToken::new(token));
    }

    authorization
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(AccessToken::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::TokenError;
    use crate::config::AuthConfig;
    use crate::db::{DatabaseConfig, Db, UserCreate, UserView, create_connection, ensure_schema};
    use crate::types::UserId;
    use chrono::Utc;

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    async fn setup() -> (AuthExtractor, UserView) {
        let db = setup_test_db().await;
        let codec = Arc::new(TokenCodec::new(
            &AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests")
                .with_access_ttl(900),
        ));
        let store = Arc::new(UserStore::new(db));

        let user = store
            .create(UserCreate {
                uid: UserId::generate(),
                username: "ana".to_string(),
                email: "ana@example.com".to_string(),
                full_name: "Ana Lima".to_string(),
                avatar: None,
                cover_image: None,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
            .sanitized();

        (AuthExtractor::new(codec, store), user)
    }

    fn bearer(token: &AccessToken) -> String {
        format!("Bearer {}", token.as_str())
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let token = presented_token(Some("from-cookie"), Some("Bearer from-header")).unwrap();
        assert_eq!(token.as_str(), "from-cookie");

        let token = presented_token(Some(""), Some("Bearer from-header")).unwrap();
        assert_eq!(token.as_str(), "from-header");
    }

    #[test]
    fn test_non_bearer_header_ignored() {
        assert!(presented_token(None, Some("Basic dXNlcjpwYXNz")).is_none());
        assert!(presented_token(None, Some("Bearer ")).is_none());
        assert!(presented_token(None, None).is_none());
    }

    #[tokio::test]
    async fn test_extract_from_bearer_header() {
        let (extractor, user) = setup().await;
        let token = extractor.codec.issue_access_token(&user).unwrap();

        let client = ClientInfo::new(Some("10.0.0.1".to_string()), None);
        let ctx = extractor
            .extract_user(None, Some(&bearer(&token)), client.clone())
            .await
            .unwrap();

        assert_eq!(ctx.user_id(), &user.id);
        assert_eq!(ctx.username(), "ana");
        assert_eq!(ctx.client(), &client);
    }

    #[tokio::test]
    async fn test_extract_from_cookie_over_invalid_header() {
        let (extractor, user) = setup().await;
        let token = extractor.codec.issue_access_token(&user).unwrap();

        let ctx = extractor
            .extract_user(Some(token.as_str()), Some("Bearer garbage"), ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(ctx.user_id(), &user.id);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (extractor, _) = setup().await;

        let err = extractor
            .extract_user(None, None, ClientInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::MissingToken));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (extractor, user) = setup().await;
        let token = extractor
            .codec
            .issue_access_token_at(&user, Utc::now().timestamp() - 1000)
            .unwrap();

        let err = extractor
            .extract_user(None, Some(&bearer(&token)), ClientInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Token(TokenError::Expired)));
        assert_eq!(err.to_string(), "jwt expired");
    }

    #[tokio::test]
    async fn test_refresh_token_not_accepted() {
        let (extractor, user) = setup().await;
        let refresh = extractor.codec.issue_refresh_token(&user.id).unwrap();

        let err = extractor
            .extract_user(Some(refresh.as_str()), None, ClientInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Token(TokenError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_deleted_user_rejected() {
        let (extractor, mut user) = setup().await;
        user.id = UserId::new("ugone");
        let token = extractor.codec.issue_access_token(&user).unwrap();

        let err = extractor
            .extract_user(None, Some(&bearer(&token)), ClientInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::UnknownIdentity(TokenKind::Access)));
        assert_eq!(err.to_string(), "Invalid access token");
    }
}
