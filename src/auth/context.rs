//! Authenticated request context.

use serde::{Deserialize, Serialize};

use crate::db::UserView;
use crate::types::UserId;

/// Client metadata recorded with audit log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip_address, user_agent }
    }
}

/// Identity attached to a request by the authenticator.
///
/// Handed to downstream handlers by value; it is never mutated after the
/// authenticator builds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    /// Sanitized user record
    user: UserView,
    /// Client IP address and user agent
    client: ClientInfo,
}

impl UserContext {
    /// Create a new user context.
    pub fn new(user: UserView) -> Self {
        Self {
            user,
            client: ClientInfo::default(),
        }
    }

    /// Set client metadata for audit logging.
    pub fn with_client_info(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Get the user ID.
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }

    /// Get the sanitized user.
    pub fn user(&self) -> &UserView {
        &self.user
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn email(&self) -> &str {
        &self.user.email
    }

    /// Get the client metadata.
    pub fn client(&self) -> &ClientInfo {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(full_name: &str) -> UserView {
        UserView {
            id: UserId::new("utest123"),
            username: "ana".to_string(),
            email: "ana@example.com".to_string(),
            full_name: full_name.to_string(),
            avatar: None,
            cover_image: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_user_context_new() {
        let ctx = UserContext::new(test_user("Ana Lima"));

        assert_eq!(ctx.user_id().as_str(), "utest123");
        assert_eq!(ctx.username(), "ana");
        assert_eq!(ctx.email(), "ana@example.com");
        assert_eq!(ctx.client(), &ClientInfo::default());
    }

    #[test]
    fn test_user_context_with_client_info() {
        let ctx = UserContext::new(test_user("Ana Lima")).with_client_info(ClientInfo::new(
            Some("192.168.1.1".to_string()),
            Some("Mozilla/5.0".to_string()),
        ));

        assert_eq!(ctx.client().ip_address.as_deref(), Some("192.168.1.1"));
        assert_eq!(ctx.client().user_agent.as_deref(), Some("Mozilla/5.0"));
    }
}
