//! User and session handlers under `/api/v1/users`.

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::AppState;
use crate::api::cookies::cookie_value;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extractors::{ApiJson, Client, CurrentUser};
use crate::api::response::ApiResponse;
use crate::auth::{
    ChangePasswordRequest, LoginRequest, REFRESH_TOKEN_COOKIE, RegisterRequest,
    UpdateAccountRequest,
};
use crate::db::UserView;
use crate::types::RefreshToken;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RefreshTokenBody {
    refresh_token: Option<RefreshToken>,
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Client(client): Client,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> ApiResult<ApiResponse<UserView>> {
    let user = state.sessions.register(request, &client).await?;

    Ok(ApiResponse::new(StatusCode::CREATED, user, "User registered Successfully"))
}

/// POST /login
///
/// Tokens are returned in the body and set as cookies.
pub async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.sessions.login(request, &client).await?;
    let cookies = state.session_cookies(&outcome.tokens);

    Ok((cookies, ApiResponse::ok(outcome, "User logged In Successfully")))
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(context): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    state.sessions.logout(&context).await?;

    Ok((
        state.cleared_session_cookies(),
        ApiResponse::ok(json!({}), "User logged out"),
    ))
}

/// POST /refresh-token
///
/// The refresh token is read from the cookie, or else from the JSON body.
pub async fn refresh_token(
    State(state): State<AppState>,
    Client(client): Client,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = body?;
    let presented = match cookie_value(&headers, REFRESH_TOKEN_COOKIE) {
        Some(token) => Some(RefreshToken::new(token)),
        None => refresh_token_from_body(&body)?,
    };

    let tokens = state.sessions.refresh(presented, &client).await?;
    let cookies = state.session_cookies(&tokens);

    Ok((cookies, ApiResponse::ok(tokens, "Access token refreshed")))
}

/// POST /change-password
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(context): CurrentUser,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    state.sessions.change_password(&context, request).await?;

    // The stored refresh token was revoked along with the old password.
    Ok((
        state.cleared_refresh_cookie(),
        ApiResponse::ok(json!({}), "Password changed successfully"),
    ))
}

/// GET /current-user
pub async fn current_user(
    State(state): State<AppState>,
    CurrentUser(context): CurrentUser,
) -> ApiResponse<UserView> {
    ApiResponse::ok(state.sessions.current_user(&context), "User fetched successfully")
}

/// PATCH /update-account
pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(context): CurrentUser,
    ApiJson(request): ApiJson<UpdateAccountRequest>,
) -> ApiResult<ApiResponse<UserView>> {
    let user = state.sessions.update_account(&context, request).await?;

    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

fn refresh_token_from_body(body: &[u8]) -> ApiResult<Option<RefreshToken>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Failed to parse the request body as JSON: {}", e)))?;
    let parsed: RefreshTokenBody = serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    Ok(parsed.refresh_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_from_body() {
        assert!(refresh_token_from_body(b"").unwrap().is_none());
        assert!(refresh_token_from_body(b"  \n").unwrap().is_none());
        assert!(refresh_token_from_body(b"{}").unwrap().is_none());

        let token = refresh_token_from_body(br#"{"refreshToken":"a.b.c"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(token.as_str(), "a.b.c");

        assert!(matches!(
            refresh_token_from_body(b"{not json"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
