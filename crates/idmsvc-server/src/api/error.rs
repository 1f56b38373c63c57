//! API error types and the `{"errors": [...]}` response envelope.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use idmsvc_core::error::IdmsvcError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

const INTERNAL_DETAIL: &str = "internal server error";

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request headers too large")]
    HeadersTooLarge,

    /// The cause is logged, never rendered.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One entry of the error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub status: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorInfo {
    fn new(status: StatusCode, detail: Option<String>) -> Self {
        Self {
            status: status.as_u16().to_string(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            detail,
        }
    }

    fn titled(status: StatusCode, title: String) -> Self {
        Self {
            status: status.as_u16().to_string(),
            title,
            detail: None,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorInfo>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::HeadersTooLarge => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg) => Some(msg.clone()),
            ApiError::Unauthorized(_) | ApiError::HeadersTooLarge => None,
            ApiError::Internal(_) => Some(INTERNAL_DETAIL.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(cause) = &self {
            error!(error = %cause, "Request failed");
        }
        // Authentication failures carry their reason as the title.
        let info = match self {
            ApiError::Unauthorized(reason) => ErrorInfo::titled(status, reason),
            other => ErrorInfo::new(status, other.detail()),
        };
        let body = ErrorResponse { errors: vec![info] };
        (status, Json(body)).into_response()
    }
}

impl From<IdmsvcError> for ApiError {
    fn from(err: IdmsvcError) -> Self {
        match err {
            IdmsvcError::BadInput { message } => ApiError::BadRequest(message),
            IdmsvcError::TokenInvalid => ApiError::Unauthorized(err.to_string()),
            IdmsvcError::NotFound { message } => ApiError::NotFound(message),
            IdmsvcError::Conflict { message } => ApiError::Conflict(message),
            IdmsvcError::Forbidden { reason } => ApiError::Forbidden(reason),
            IdmsvcError::InvariantViolation(_)
            | IdmsvcError::Database(_)
            | IdmsvcError::Crypto(_)
            | IdmsvcError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_core_error_kinds_to_status() {
        let cases = [
            (IdmsvcError::bad_input("x"), StatusCode::BAD_REQUEST),
            (IdmsvcError::TokenInvalid, StatusCode::UNAUTHORIZED),
            (IdmsvcError::not_found("domain", "x"), StatusCode::NOT_FOUND),
            (IdmsvcError::conflict("x"), StatusCode::CONFLICT),
            (IdmsvcError::forbidden("x"), StatusCode::FORBIDDEN),
            (
                IdmsvcError::InvariantViolation("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                IdmsvcError::Database("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                IdmsvcError::Crypto("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_detail_is_generic() {
        let err = ApiError::from(IdmsvcError::Database("connection refused to 10.0.0.1".into()));
        assert_eq!(err.detail().as_deref(), Some(INTERNAL_DETAIL));
    }

    #[test]
    fn envelope_shape() {
        let body = ErrorResponse {
            errors: vec![ErrorInfo::new(
                StatusCode::NOT_FOUND,
                Some("unknown domain 'x'".into()),
            )],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "errors": [{"status": "404", "title": "Not Found", "detail": "unknown domain 'x'"}]
            })
        );

        let bare =
            serde_json::to_value(ErrorInfo::new(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE, None))
                .unwrap();
        assert!(bare.get("detail").is_none());
    }

    #[test]
    fn token_failure_is_titled_token_invalid() {
        let err = ApiError::from(IdmsvcError::TokenInvalid);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(err.detail().is_none());
        assert!(matches!(err, ApiError::Unauthorized(ref t) if t == "token invalid"));
    }
}
