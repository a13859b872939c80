use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    auth::{HandoffError, SessionError, StoreError, TokenError},
    db::types::FieldError,
};

#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "code": self.code })),
        )
            .into_response()
    }
}

pub(crate) fn token_error_response(error: TokenError) -> ErrorResponse {
    match error {
        TokenError::NotFound => ErrorResponse::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "Login link is invalid or already used. Please start again.",
        ),
        TokenError::Expired => ErrorResponse::new(
            StatusCode::GONE,
            "expired",
            "Login link has expired. Please start again.",
        ),
        TokenError::NotBound => ErrorResponse::new(
            StatusCode::CONFLICT,
            "not_bound",
            "Login has not been confirmed in Telegram yet.",
        ),
    }
}

pub(crate) fn session_error_response(error: &SessionError) -> ErrorResponse {
    match error {
        SessionError::InvalidCredentialSignature
        | SessionError::MalformedCredential
        | SessionError::SessionRevoked => ErrorResponse::new(
            StatusCode::UNAUTHORIZED,
            "invalid_session",
            "Session is not valid. Please sign in again.",
        ),
        SessionError::CredentialExpired => ErrorResponse::new(
            StatusCode::UNAUTHORIZED,
            "session_expired",
            "Session has expired. Please sign in again.",
        ),
        SessionError::NotFound => ErrorResponse::new(
            StatusCode::NOT_FOUND,
            "session_not_found",
            "Session is already closed.",
        ),
        SessionError::UpstreamUnavailable(reason) => upstream_unavailable(reason),
        SessionError::Signing(source) => {
            tracing::error!(error = %source, "failed to sign session credential");
            internal_error()
        }
        SessionError::Store(source) => store_error_response(source),
    }
}

pub(crate) fn handoff_error_response(error: &HandoffError) -> ErrorResponse {
    match error {
        HandoffError::Token(error) => token_error_response(*error),
        HandoffError::Session(error) => session_error_response(error),
        HandoffError::UnauthorizedBridge => ErrorResponse::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Invalid bot API key",
        ),
        HandoffError::UserNotFound(_) => {
            ErrorResponse::new(StatusCode::NOT_FOUND, "user_not_found", "User not found")
        }
        HandoffError::UpstreamUnavailable(reason) => upstream_unavailable(reason),
        HandoffError::Store(source) => store_error_response(source),
    }
}

/// Client input that the store would reject. Nothing is recorded.
pub(crate) fn field_error_response(error: &FieldError) -> ErrorResponse {
    ErrorResponse::new(StatusCode::BAD_REQUEST, "invalid_request", error.to_string())
}

pub(crate) fn store_error_response(error: &StoreError) -> ErrorResponse {
    match error {
        StoreError::Unavailable(reason) => upstream_unavailable(reason),
        StoreError::Database(source) => {
            tracing::error!(error = %source, "database error");
            internal_error()
        }
    }
}

fn upstream_unavailable(reason: &str) -> ErrorResponse {
    tracing::warn!(reason, "durable store unavailable");
    ErrorResponse::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "upstream_unavailable",
        "Service temporarily unavailable. Please retry.",
    )
}

fn internal_error() -> ErrorResponse {
    ErrorResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "Internal server error",
    )
}
