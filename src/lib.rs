// Core modules
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod types;

// Re-export key types and functions
pub use api::{AppState, create_router};
pub use auth::{AuthError, AuthExtractor, SessionManager, TokenCodec, UserContext, UserStore};
pub use config::{AuthConfig, ServerConfig, parse_ttl};
pub use db::{DatabaseConfig, create_connection, ensure_schema};

use anyhow::Result;
use axum::Router;

/// Convenience function to create a fully configured HTTP application.
///
/// Validates the auth settings, connects to the database, applies the schema
/// and wires the session manager into the router.
pub async fn build_app(
    db_config: DatabaseConfig,
    auth_config: AuthConfig,
    server_config: &ServerConfig,
) -> Result<Router> {
    auth_config.validate()?;

    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    let sessions = SessionManager::from_db(db, auth_config);
    Ok(create_router(AppState::new(sessions), server_config))
}
