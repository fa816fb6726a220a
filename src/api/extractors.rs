//! Axum extractors for authentication and request bodies.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use serde::de::DeserializeOwned;

use crate::api::AppState;
use crate::api::cookies::cookie_value;
use crate::api::error::ApiError;
use crate::auth::{ACCESS_TOKEN_COOKIE, ClientInfo, UserContext};

/// Authenticated caller; rejects the request with a 401 envelope otherwise.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserContext);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookie = cookie_value(&parts.headers, ACCESS_TOKEN_COOKIE);
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let context = state
            .authenticator
            .extract_user(cookie.as_deref(), authorization, client_info(&parts.headers))
            .await?;

        Ok(CurrentUser(context))
    }
}

/// Client IP and user agent, taken from request headers.
#[derive(Debug, Clone)]
pub struct Client(pub ClientInfo);

impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Client(client_info(&parts.headers)))
    }
}

/// JSON body whose rejections render as error envelopes: 400 for bad JSON,
/// axum's own status when the body cannot be read.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(JsonRejection::BytesRejection(rejection)) => Err(rejection.into()),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    // First hop of X-Forwarded-For is the originating client.
    let ip_address = header_str("x-forwarded-for")
        .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_string()))
        .or_else(|| header_str("x-real-ip"));

    ClientInfo::new(ip_address, header_str(header::USER_AGENT.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let client = client_info(&headers);
        assert_eq!(client.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(client.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_client_info_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        let client = client_info(&headers);
        assert_eq!(client.ip_address.as_deref(), Some("198.51.100.2"));
        assert!(client.user_agent.is_none());

        assert_eq!(client_info(&HeaderMap::new()), ClientInfo::default());
    }
}
