use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::users::repo::StoreError;

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Errors surfaced by handlers. Each variant maps to one response shape.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{0}")]
    Duplicate(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => Self::Duplicate("Email already registered".into()),
            StoreError::Unavailable(e) => Self::Upstream(e),
        }
    }
}

/// A body that does not decode is reported like any other invalid input.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("body", rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (message, field) = match &self {
            Self::Validation { field, message } => (message.as_str(), Some(*field)),
            Self::Duplicate(msg) => (msg.as_str(), None),
            Self::InvalidCredentials => (INVALID_CREDENTIALS, None),
            Self::Unauthenticated => ("Authentication required", None),
            Self::Upstream(e) => {
                error!(error = %format!("{e:#}"), "upstream failure");
                ("Internal server error", None)
            }
        };
        (status, Json(ErrorBody { message, field })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::validation("password", "too short").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(StoreError::DuplicateEmail).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(StoreError::Unavailable(anyhow::anyhow!("down"))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn validation_body_names_the_field() {
        let res = AppError::validation("email", "Invalid email").into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains(r#""field":"email""#));
        assert!(text.contains(r#""message":"Invalid email""#));
    }

    #[tokio::test]
    async fn upstream_details_are_not_leaked() {
        let res = AppError::Upstream(anyhow::anyhow!("password=hunter2 at db:5432")).into_response();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("hunter2"));
        assert!(text.contains("Internal server error"));
    }
}
