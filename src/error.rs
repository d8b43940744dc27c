use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::responses::MessageDto;

/// Errors raised by the idempotency layer and the payment operations it protects.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("No idempotency header found")]
    MissingIdempotencyKey,

    #[error("Idempotency key conflict: request data does not match previous request with the same key")]
    IdempotencyConflict,

    #[error("Request hash generation failed")]
    Fingerprint {
        #[source]
        source: BoxError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl AppError {
    pub fn fingerprint(source: impl Into<BoxError>) -> Self {
        AppError::Fingerprint {
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingIdempotencyKey => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::IdempotencyConflict => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Fingerprint { .. } | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns true for failures the caller caused and can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Attaches the originating request path so the error can be rendered.
    pub fn at(self, path: impl Into<String>) -> ApiError {
        ApiError {
            error: self,
            path: path.into(),
        }
    }
}

/// An [`AppError`] bound to the request path it was raised for.
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub path: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();

        let message = match &self.error {
            AppError::Fingerprint { source } => {
                tracing::error!(path = %self.path, error = ?source, "Request fingerprint failed");
                self.error.to_string()
            }
            AppError::Config(_) | AppError::Internal(_) => {
                tracing::error!(path = %self.path, error = ?self.error, "Internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(MessageDto::new(status, message, self.path))).into_response()
    }
}
