// REST API for user sessions

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{AppendHeaders, Json},
    routing::{get, patch, post},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{ACCESS_TOKEN_COOKIE, AuthExtractor, REFRESH_TOKEN_COOKIE, SessionManager, TokenPair};
use crate::config::ServerConfig;

pub mod cookies;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;

type CookieHeaders<const N: usize> = AppendHeaders<[(HeaderName, String); N]>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub authenticator: Arc<AuthExtractor>,
}

impl AppState {
    /// Build the state around a session manager; the authenticator shares its
    /// codec and store.
    pub fn new(sessions: SessionManager) -> Self {
        let authenticator = AuthExtractor::new(sessions.codec().clone(), sessions.store().clone());
        Self {
            sessions: Arc::new(sessions),
            authenticator: Arc::new(authenticator),
        }
    }

    fn secure_cookies(&self) -> bool {
        self.sessions.config().secure_cookies
    }

    fn session_cookies(&self, tokens: &TokenPair) -> CookieHeaders<2> {
        let codec = self.sessions.codec();
        AppendHeaders([
            (
                header::SET_COOKIE,
                cookies::session_cookie(
                    ACCESS_TOKEN_COOKIE,
                    tokens.access_token.as_str(),
                    codec.access_ttl_secs(),
                    self.secure_cookies(),
                ),
            ),
            (
                header::SET_COOKIE,
                cookies::session_cookie(
                    REFRESH_TOKEN_COOKIE,
                    tokens.refresh_token.as_str(),
                    codec.refresh_ttl_secs(),
                    self.secure_cookies(),
                ),
            ),
        ])
    }

    fn cleared_session_cookies(&self) -> CookieHeaders<2> {
        AppendHeaders([
            (header::SET_COOKIE, cookies::clear_cookie(ACCESS_TOKEN_COOKIE, self.secure_cookies())),
            (header::SET_COOKIE, cookies::clear_cookie(REFRESH_TOKEN_COOKIE, self.secure_cookies())),
        ])
    }

    fn cleared_refresh_cookie(&self) -> CookieHeaders<1> {
        AppendHeaders([(
            header::SET_COOKIE,
            cookies::clear_cookie(REFRESH_TOKEN_COOKIE, self.secure_cookies()),
        )])
    }
}

pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let users = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/refresh-token", post(handlers::refresh_token))
        .route("/change-password", post(handlers::change_password))
        .route("/current-user", get(handlers::current_user))
        .route("/update-account", patch(handlers::update_account));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/users", users)
        .fallback(route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config))
                .layer(DefaultBodyLimit::max(config.body_limit_bytes)),
        )
        .with_state(state)
}

/// Credentialed CORS for the configured origin, permissive otherwise.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let Some(origin) = config.cors_origin.as_deref() else {
        return CorsLayer::permissive();
    };

    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        Err(e) => {
            warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
            CorsLayer::permissive()
        }
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}
