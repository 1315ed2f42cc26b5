use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use warbler_types::api::{ErrorResponse, FieldErrors};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please correct the errors in the form.")]
    Validation(FieldErrors),

    /// No logged-in user on a route that needs one.
    #[error("Access unauthorized.")]
    Unauthorized,

    /// Logged in, but acting on something owned by someone else.
    #[error("Access unauthorized.")]
    Forbidden,

    #[error("Invalid credentials.")]
    InvalidCredentials,

    /// Wrong current password on a profile edit.
    #[error("Invalid password, please try again.")]
    InvalidPassword,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized | Self::InvalidCredentials | Self::InvalidPassword => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_form",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidPassword => "invalid_password",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let fields = match self {
            Self::Validation(fields) => Some(fields),
            _ => None,
        };

        let body = ErrorResponse {
            error: kind.to_string(),
            message,
            fields,
        };

        (status, Json(body)).into_response()
    }
}
