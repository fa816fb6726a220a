//! Session lifecycle: registration, login, refresh rotation, logout and
//! password changes.
//!
//! A user is either anonymous or authenticated. Login and refresh issue a new
//! access/refresh pair and make the new refresh token the only one the store
//! accepts; logout and password changes clear it. Refresh rotation is a
//! conditional write in the store, so two refreshes racing with the same
//! token cannot both succeed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::auth::context::{ClientInfo, UserContext};
use crate::auth::error::{AuthError, TokenKind};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::{TokenCodec, TokenPair};
use crate::auth::user_store::UserStore;
use crate::config::AuthConfig;
use crate::db::{AuditAction, AuditLogCreate, Db, UserCreate, UserView};
use crate::types::{RefreshToken, UserId};

/// Registration payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
}

/// Login payload; either identifier may be used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateAccountRequest {
    pub full_name: String,
    pub email: String,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: UserView,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Orchestrates the session lifecycle over the user store and token codec.
pub struct SessionManager {
    store: Arc<UserStore>,
    codec: Arc<TokenCodec>,
    config: AuthConfig,
}

impl SessionManager {
    pub fn new(store: Arc<UserStore>, codec: Arc<TokenCodec>, config: AuthConfig) -> Self {
        Self { store, codec, config }
    }

    /// Build a manager with its own store and codec over the given database.
    pub fn from_db(db: Db, config: AuthConfig) -> Self {
        Self::new(
            Arc::new(UserStore::new(db)),
            Arc::new(TokenCodec::new(&config)),
            config,
        )
    }

    pub fn store(&self) -> &Arc<UserStore> {
        &self.store
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create a new user. Username and email are stored lowercased.
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<UserView, AuthError> {
        let full_name = request.full_name.trim().to_string();
        let email = normalize(&request.email);
        let username = normalize(&request.username);

        if full_name.is_empty()
            || email.is_empty()
            || username.is_empty()
            || request.password.trim().is_empty()
        {
            return Err(AuthError::validation("All fields are required"));
        }

        if self
            .store
            .find_by_username_or_email(Some(&username), Some(&email))
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict);
        }

        let password_hash = hash_password(&request.password, self.config.password_hash_cost).await?;

        let record = self
            .store
            .create(UserCreate {
                uid: UserId::generate(),
                username,
                email,
                full_name,
                avatar: non_blank(request.avatar),
                cover_image: non_blank(request.cover_image),
                password_hash,
            })
            .await?;

        info!("Registered user {} ({})", record.username, record.uid);
        self.audit(AuditAction::Register, Some(&record.uid), None, client).await;

        Ok(record.sanitized())
    }

    /// Authenticate with username-or-email and password.
    ///
    /// An unknown identifier and a wrong password fail identically. On
    /// success the new refresh token replaces whatever the store held.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        let username = request.username.as_deref().map(normalize).filter(|s| !s.is_empty());
        let email = request.email.as_deref().map(normalize).filter(|s| !s.is_empty());

        if username.is_none() && email.is_none() {
            return Err(AuthError::validation("username or email is required"));
        }
        if request.password.is_empty() {
            return Err(AuthError::validation("Password is required"));
        }

        let identifier = username.clone().or_else(|| email.clone()).unwrap_or_default();

        let Some(record) = self
            .store
            .find_by_username_or_email(username.as_deref(), email.as_deref())
            .await?
        else {
            debug!("Login for unknown identifier");
            self.audit(
                AuditAction::LoginFailed,
                None,
                Some(json!({ "identifier": identifier, "reason": "unknown_user" })),
                client,
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&request.password, &record.password_hash).await? {
            debug!("Wrong password for user {}", record.uid);
            self.audit(
                AuditAction::LoginFailed,
                Some(&record.uid),
                Some(json!({ "reason": "wrong_password" })),
                client,
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        let user = record.sanitized();
        let tokens = self.codec.issue_pair(&user)?;

        if !self.store.set_refresh_token(&user.id, &tokens.refresh_token).await? {
            return Err(AuthError::NotFound);
        }

        info!("User {} logged in", user.id);
        self.audit(AuditAction::Login, Some(&user.id), None, client).await;

        Ok(LoginOutcome { user, tokens })
    }

    /// Exchange the current refresh token for a new access/refresh pair.
    ///
    /// The presented token must verify and must still be the one stored for
    /// its user. After a successful call it is never accepted again.
    pub async fn refresh(
        &self,
        presented: Option<RefreshToken>,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        let presented = presented
            .filter(|t| !t.as_str().trim().is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.codec.verify_refresh(&presented)?;

        let record = self
            .store
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UnknownIdentity(TokenKind::Refresh))?;

        if record.refresh_token.as_ref() != Some(&presented) {
            return Err(self.reject_reuse(&record.uid, client).await);
        }

        let user = record.sanitized();
        let tokens = self.codec.issue_pair(&user)?;

        // The stored token may have moved since the read above.
        let rotated = self
            .store
            .rotate_refresh_token(&user.id, &presented, &tokens.refresh_token)
            .await?;
        if !rotated {
            return Err(self.reject_reuse(&user.id, client).await);
        }

        debug!("Rotated refresh token for user {}", user.id);
        self.audit(AuditAction::Refresh, Some(&user.id), None, client).await;

        Ok(tokens)
    }

    /// Revoke the user's refresh token. Calling it again is harmless.
    pub async fn logout(&self, context: &UserContext) -> Result<(), AuthError> {
        self.store.clear_refresh_token(context.user_id()).await?;

        info!("User {} logged out", context.user_id());
        self.audit(AuditAction::Logout, Some(context.user_id()), None, context.client())
            .await;

        Ok(())
    }

    /// Replace the user's password after checking the current one.
    ///
    /// The stored refresh token is revoked; the caller must log in again to
    /// get a new one.
    pub async fn change_password(
        &self,
        context: &UserContext,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        if request.old_password.is_empty() || request.new_password.trim().is_empty() {
            return Err(AuthError::validation("Old and new password are required"));
        }

        let record = self
            .store
            .find_by_id(context.user_id())
            .await?
            .ok_or(AuthError::NotFound)?;

        if !verify_password(&request.old_password, &record.password_hash).await? {
            return Err(AuthError::IncorrectPassword);
        }

        let password_hash =
            hash_password(&request.new_password, self.config.password_hash_cost).await?;

        if !self.store.replace_password(&record.uid, password_hash).await? {
            return Err(AuthError::NotFound);
        }

        info!("Password changed for user {}", record.uid);
        self.audit(AuditAction::PasswordChanged, Some(&record.uid), None, context.client())
            .await;

        Ok(())
    }

    /// The sanitized identity of the authenticated caller.
    pub fn current_user(&self, context: &UserContext) -> UserView {
        context.user().clone()
    }

    /// Update the caller's display name and email.
    pub async fn update_account(
        &self,
        context: &UserContext,
        request: UpdateAccountRequest,
    ) -> Result<UserView, AuthError> {
        let full_name = request.full_name.trim().to_string();
        let email = normalize(&request.email);

        if full_name.is_empty() || email.is_empty() {
            return Err(AuthError::validation("All fields are required"));
        }

        let record = self
            .store
            .update_account(context.user_id(), full_name, email)
            .await?
            .ok_or(AuthError::NotFound)?;

        self.audit(AuditAction::AccountUpdated, Some(&record.uid), None, context.client())
            .await;

        Ok(record.sanitized())
    }

    async fn reject_reuse(&self, user_id: &UserId, client: &ClientInfo) -> AuthError {
        warn!("Rejected stale refresh token for user {}", user_id);
        self.audit(AuditAction::RefreshReuseRejected, Some(user_id), None, client)
            .await;
        AuthError::RefreshTokenReused
    }

    /// Audit failures are logged and otherwise ignored.
    async fn audit(
        &self,
        action: AuditAction,
        user_id: Option<&UserId>,
        details: Option<Value>,
        client: &ClientInfo,
    ) {
        let entry = AuditLogCreate {
            user_id: user_id.map(|id| id.to_string()),
            action: action.as_str().to_string(),
            details,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        };

        if let Err(e) = self.store.audit_log(entry).await {
            warn!("Failed to write {} audit entry: {}", action.as_str(), e);
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::TokenError;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use chrono::Utc;

    async fn setup_manager() -> SessionManager {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let auth = AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests")
            .with_access_ttl(900)
            .with_refresh_ttl(86_400)
            .with_password_hash_cost(4);

        SessionManager::from_db(db, auth)
    }

    fn client() -> ClientInfo {
        ClientInfo::new(Some("127.0.0.1".to_string()), Some("tests".to_string()))
    }

    fn ana() -> RegisterRequest {
        RegisterRequest {
            full_name: "Ana Lima".to_string(),
            email: "Ana@Example.com".to_string(),
            username: " Ana ".to_string(),
            password: "p1".to_string(),
            avatar: Some("https://cdn.example.com/ana.png".to_string()),
            cover_image: None,
        }
    }

    fn login_as(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: Some(username.to_string()),
            email: None,
            password: password.to_string(),
        }
    }

    async fn stored_token(manager: &SessionManager, user_id: &UserId) -> Option<RefreshToken> {
        manager
            .store()
            .find_by_id(user_id)
            .await
            .unwrap()
            .unwrap()
            .refresh_token
    }

    #[tokio::test]
    async fn test_register_normalizes_identifiers() {
        let manager = setup_manager().await;
        let user = manager.register(ana(), &client()).await.unwrap();

        assert_eq!(user.username, "ana");
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.full_name, "Ana Lima");
        assert!(stored_token(&manager, &user.id).await.is_none());
    }

    #[tokio::test]
    async fn test_register_requires_all_fields() {
        let manager = setup_manager().await;
        let mut request = ana();
        request.full_name = "   ".to_string();

        let err = manager.register(request, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts() {
        let manager = setup_manager().await;
        manager.register(ana(), &client()).await.unwrap();

        let mut same_email = ana();
        same_email.username = "other".to_string();
        let err = manager.register(same_email, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict));

        let mut same_name = ana();
        same_name.email = "other@example.com".to_string();
        let err = manager.register(same_name, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[tokio::test]
    async fn test_login_rotates_refresh_token() {
        let manager = setup_manager().await;
        let user = manager.register(ana(), &client()).await.unwrap();

        let first = manager.login(login_as("ana", "p1"), &client()).await.unwrap();
        assert_eq!(first.user.id, user.id);
        assert_eq!(
            stored_token(&manager, &user.id).await,
            Some(first.tokens.refresh_token.clone())
        );

        let by_email = LoginRequest {
            username: None,
            email: Some("ANA@example.com".to_string()),
            password: "p1".to_string(),
        };
        let second = manager.login(by_email, &client()).await.unwrap();

        assert_ne!(first.tokens.refresh_token, second.tokens.refresh_token);
        assert_eq!(
            stored_token(&manager, &user.id).await,
            Some(second.tokens.refresh_token)
        );
    }

    #[tokio::test]
    async fn test_login_outcome_excludes_secrets() {
        let manager = setup_manager().await;
        manager.register(ana(), &client()).await.unwrap();

        let outcome = manager.login(login_as("ana", "p1"), &client()).await.unwrap();
        let json = serde_json::to_value(&outcome).unwrap();

        assert!(json["accessToken"].is_string());
        assert!(json["refreshToken"].is_string());
        assert_eq!(json["user"]["username"], "ana");
        assert!(json["user"].get("passwordHash").is_none());
        assert!(json["user"].get("refreshToken").is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_refresh_token_unchanged() {
        let manager = setup_manager().await;
        let user = manager.register(ana(), &client()).await.unwrap();
        let outcome = manager.login(login_as("ana", "p1"), &client()).await.unwrap();

        let err = manager.login(login_as("ana", "nope"), &client()).await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(err.status_code(), 401);
        assert_eq!(
            stored_token(&manager, &user.id).await,
            Some(outcome.tokens.refresh_token)
        );
    }

    #[tokio::test]
    async fn test_unknown_user_fails_like_wrong_password() {
        let manager = setup_manager().await;
        manager.register(ana(), &client()).await.unwrap();

        let unknown = manager.login(login_as("bob", "p1"), &client()).await.unwrap_err();
        let wrong = manager.login(login_as("ana", "p2"), &client()).await.unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.status_code(), wrong.status_code());
    }

    #[tokio::test]
    async fn test_login_requires_identifier() {
        let manager = setup_manager().await;
        let request = LoginRequest {
            username: Some("  ".to_string()),
            email: None,
            password: "p1".to_string(),
        };

        let err = manager.login(request, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_refresh_rotation_scenario() {
        let manager = setup_manager().await;
        manager.register(ana(), &client()).await.unwrap();

        let t1 = manager.login(login_as("ana", "p1"), &client()).await.unwrap().tokens;

        let t2 = manager
            .refresh(Some(t1.refresh_token.clone()), &client())
            .await
            .unwrap();
        assert_ne!(t2.refresh_token, t1.refresh_token);
        assert_ne!(t2.access_token, t1.access_token);

        let reused = manager
            .refresh(Some(t1.refresh_token), &client())
            .await
            .unwrap_err();
        assert!(matches!(reused, AuthError::RefreshTokenReused));
        assert_eq!(reused.status_code(), 401);

        // The rotated-in token still works.
        let t3 = manager.refresh(Some(t2.refresh_token), &client()).await.unwrap();
        let claims = manager.codec().verify_access(&t3.access_token).unwrap();
        assert_eq!(claims.username, "ana");
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_single_winner() {
        let manager = setup_manager().await;
        let user = manager.register(ana(), &client()).await.unwrap();
        let t1 = manager.login(login_as("ana", "p1"), &client()).await.unwrap().tokens;

        let c = client();
        let (a, b) = tokio::join!(
            manager.refresh(Some(t1.refresh_token.clone()), &c),
            manager.refresh(Some(t1.refresh_token.clone()), &c),
        );

        let (winner, loser) = match (a, b) {
            (Ok(pair), Err(err)) | (Err(err), Ok(pair)) => (pair, err),
            (a, b) => panic!("expected exactly one success, got {:?} and {:?}", a, b),
        };

        assert!(matches!(loser, AuthError::RefreshTokenReused));
        assert_eq!(stored_token(&manager, &user.id).await, Some(winner.refresh_token));
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let manager = setup_manager().await;
        manager.register(ana(), &client()).await.unwrap();
        let outcome = manager.login(login_as("ana", "p1"), &client()).await.unwrap();
        let context = UserContext::new(outcome.user.clone());

        manager.logout(&context).await.unwrap();
        manager.logout(&context).await.unwrap();

        assert!(stored_token(&manager, &outcome.user.id).await.is_none());

        let err = manager
            .refresh(Some(outcome.tokens.refresh_token), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RefreshTokenReused));
    }

    #[tokio::test]
    async fn test_refresh_without_token() {
        let manager = setup_manager().await;

        let err = manager.refresh(None, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));

        let err = manager
            .refresh(Some(RefreshToken::new("")), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[tokio::test]
    async fn test_refresh_rejects_expired_token() {
        let manager = setup_manager().await;
        let user = manager.register(ana(), &client()).await.unwrap();

        let expired = manager
            .codec()
            .issue_refresh_token_at(&user.id, Utc::now().timestamp() - 86_400 - 10)
            .unwrap();
        manager.store().set_refresh_token(&user.id, &expired).await.unwrap();

        let err = manager.refresh(Some(expired), &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::Expired)));
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let manager = setup_manager().await;
        manager.register(ana(), &client()).await.unwrap();
        let outcome = manager.login(login_as("ana", "p1"), &client()).await.unwrap();

        let swapped = RefreshToken::new(outcome.tokens.access_token.as_str());
        let err = manager.refresh(Some(swapped), &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_refresh_for_unknown_user() {
        let manager = setup_manager().await;
        let ghost = manager.codec().issue_refresh_token(&UserId::new("ughost")).unwrap();

        let err = manager.refresh(Some(ghost), &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownIdentity(TokenKind::Refresh)));
    }

    #[tokio::test]
    async fn test_change_password() {
        let manager = setup_manager().await;
        manager.register(ana(), &client()).await.unwrap();
        let outcome = manager.login(login_as("ana", "p1"), &client()).await.unwrap();
        let context = UserContext::new(outcome.user.clone());

        let wrong = ChangePasswordRequest {
            old_password: "bad".to_string(),
            new_password: "p2".to_string(),
        };
        let err = manager.change_password(&context, wrong).await.unwrap_err();
        assert!(matches!(err, AuthError::IncorrectPassword));
        assert_eq!(err.status_code(), 401);
        // A rejected change leaves the session alone.
        assert_eq!(
            stored_token(&manager, &outcome.user.id).await,
            Some(outcome.tokens.refresh_token.clone())
        );

        let request = ChangePasswordRequest {
            old_password: "p1".to_string(),
            new_password: "p2".to_string(),
        };
        manager.change_password(&context, request).await.unwrap();

        assert!(manager.login(login_as("ana", "p1"), &client()).await.is_err());

        // Refresh token from before the change is revoked.
        let err = manager
            .refresh(Some(outcome.tokens.refresh_token), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RefreshTokenReused));

        assert!(manager.login(login_as("ana", "p2"), &client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_account() {
        let manager = setup_manager().await;
        let user = manager.register(ana(), &client()).await.unwrap();
        let context = UserContext::new(user);

        let updated = manager
            .update_account(
                &context,
                UpdateAccountRequest {
                    full_name: "Ana L.".to_string(),
                    email: " ANA.L@example.com ".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Ana L.");
        assert_eq!(updated.email, "ana.l@example.com");

        let err = manager
            .update_account(&context, UpdateAccountRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_session_events_are_audited() {
        let manager = setup_manager().await;
        let user = manager.register(ana(), &client()).await.unwrap();
        let outcome = manager.login(login_as("ana", "p1"), &client()).await.unwrap();
        let _ = manager.login(login_as("ana", "wrong"), &client()).await;
        manager
            .refresh(Some(outcome.tokens.refresh_token), &client())
            .await
            .unwrap();

        let logs = manager.store().get_user_audit_log(&user.id, 10).await.unwrap();
        let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();

        assert!(actions.contains(&"register"));
        assert!(actions.contains(&"login"));
        assert!(actions.contains(&"login_failed"));
        assert!(actions.contains(&"refresh"));
        assert!(logs.iter().all(|l| l.ip_address.as_deref() == Some("127.0.0.1")));
    }
}
