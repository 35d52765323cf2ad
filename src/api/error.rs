use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

use crate::services::{AuthError, ServiceError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),

    ValidationError(String),

    Unauthorized(String),

    /// 401 telling the client to resume at `/auth/login/2fa` with the
    /// `session_token` in the details.
    SecondFactorRequired { session_token: String },

    Forbidden(String),

    NotFound(String),

    Conflict {
        message: String,
        field: Option<String>,
    },

    TooManyRequests { retry_after_secs: u64 },

    ServiceUnavailable(String),

    InternalError(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::SecondFactorRequired { .. } => write!(f, "Unauthorized: two-factor code required"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::TooManyRequests { retry_after_secs } => {
                write!(f, "Too many requests, retry after {retry_after_secs}s")
            }
            Self::ServiceUnavailable(msg) => write!(f, "Service unavailable: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            Self::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None),
            Self::SecondFactorRequired { session_token } => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "two-factor code required".to_string(),
                Some(json!({ "requires_2fa": true, "session_token": session_token })),
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            Self::Conflict { message, field } => (
                StatusCode::CONFLICT,
                "CONFLICT",
                message.clone(),
                field.as_ref().map(|f| json!({ "field": f })),
            ),
            Self::TooManyRequests { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_REQUESTS",
                "too many failed attempts, try again later".to_string(),
                Some(json!({ "retry_after": retry_after_secs })),
            ),
            Self::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "service temporarily unavailable".to_string(),
                    None,
                )
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Self::TooManyRequests { retry_after_secs } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::ValidationError(msg),
            ServiceError::Forbidden(msg) => Self::Forbidden(msg),
            ServiceError::NotFound(msg) => Self::NotFound(msg),
            ServiceError::Conflict { message, field } => Self::Conflict { message, field },
            ServiceError::Unavailable(msg) => Self::ServiceUnavailable(msg),
            ServiceError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthorized("invalid credentials".to_string()),
            AuthError::SecondFactorRequired { session_token } => {
                Self::SecondFactorRequired { session_token }
            }
            AuthError::Unauthorized => Self::Unauthorized("unauthorized".to_string()),
            AuthError::Forbidden(msg) => Self::Forbidden(msg),
            AuthError::Throttled { retry_after_secs } => Self::TooManyRequests { retry_after_secs },
            AuthError::RegistrationDisabled => {
                Self::Forbidden("registration is disabled".to_string())
            }
            AuthError::InvalidCaptcha => Self::ValidationError("invalid captcha".to_string()),
            AuthError::Validation(msg) => Self::ValidationError(msg),
            AuthError::Conflict { message, field } => Self::Conflict { message, field },
            AuthError::NotFound(msg) => Self::NotFound(msg),
            AuthError::Unavailable(msg) => Self::ServiceUnavailable(msg),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("unauthorized".to_string())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn credential_failures_do_not_leak_the_reason() {
        let (status, body) = body_of(AuthError::InvalidCredentials.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body["error"]["message"], "invalid credentials");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn conflict_names_the_field() {
        let err = ServiceError::Conflict {
            message: "username already exists".to_string(),
            field: Some("username".to_string()),
        };
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["details"]["field"], "username");
    }

    #[tokio::test]
    async fn internal_errors_are_opaque() {
        let (status, body) = body_of(ApiError::internal("disk on fire")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body["error"]["message"].as_str().unwrap().contains("disk"));
    }

    #[tokio::test]
    async fn throttled_sets_retry_after() {
        let response = ApiError::from(AuthError::Throttled { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
