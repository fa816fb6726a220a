//! Credential and session lifecycle.
//!
//! - **Token codec**: signs and verifies access and refresh tokens with two
//!   distinct secrets and lifetimes
//! - **User store**: persisted users, password hashes and the single refresh
//!   token each user may currently present
//! - **Session manager**: register, login, refresh rotation, logout and
//!   password changes
//! - **Auth extractor**: the gate in front of protected handlers
//!
//! ## Security Model
//!
//! - At most one refresh token is valid per user; login and refresh overwrite
//!   it, logout and password changes clear it
//! - Refresh rotation is a compare-and-swap in the store
//! - Password hashes and refresh tokens never leave the store in a user view
//!
//! ## Usage
//!
//! ```ignore
//! let sessions = SessionManager::from_db(db, auth_config);
//! let outcome = sessions.login(request, &client).await?;
//! let pair = sessions.refresh(Some(outcome.tokens.refresh_token), &client).await?;
//! ```

mod context;
mod error;
mod extractor;
mod password;
mod session;
mod token;
mod user_store;

pub use context::{ClientInfo, UserContext};
pub use error::{AuthError, TokenError, TokenKind};
pub use extractor::{ACCESS_TOKEN_COOKIE, AuthExtractor, REFRESH_TOKEN_COOKIE};
pub use password::{hash_password, verify_password};
pub use session::{
    ChangePasswordRequest, LoginOutcome, LoginRequest, RegisterRequest, SessionManager,
    UpdateAccountRequest,
};
pub use token::{AccessClaims, ExpiringClaims, RefreshClaims, TokenCodec, TokenPair};
pub use user_store::UserStore;
