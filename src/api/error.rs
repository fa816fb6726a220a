//! Error envelope for the HTTP surface.

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::auth::AuthError;

/// Message shown in place of internal failure details.
const INTERNAL_MESSAGE: &str = "Something went wrong";

/// `{statusCode, data: null, message, success: false, errors: []}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub data: Option<()>,
    pub message: String,
    pub success: bool,
    pub errors: Vec<String>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unreadable request body
    #[error("{0}")]
    BadRequest(String),

    /// Extractor rejection that keeps axum's status, e.g. 413 for an oversize body
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Route not found")]
    RouteNotFound,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::Auth(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Machine-readable code, logged with every error response.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Rejected { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "PAYLOAD_TOO_LARGE"
            }
            Self::Rejected { .. } => "BAD_REQUEST",
            Self::RouteNotFound => "ROUTE_NOT_FOUND",
            Self::Auth(err) => err.error_code(),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Auth(err) if err.is_internal())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if self.is_internal() {
            tracing::error!(error = %self, code = self.error_code(), "Internal API error");
            INTERNAL_MESSAGE.to_string()
        } else {
            tracing::debug!(status = status.as_u16(), code = self.error_code(), "Request rejected");
            self.to_string()
        };

        let body = ErrorResponse {
            status_code: status.as_u16(),
            data: None,
            message,
            success: false,
            errors: Vec::new(),
        };

        (status, Json(body)).into_response()
    }
}
