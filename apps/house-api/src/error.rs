use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED".to_string(),
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN".to_string(),
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "SERVICE_UNAVAILABLE".to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Failure of a persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => Self::not_found(format!("User {id} not found")),
            other => {
                tracing::error!(err = %other, "storage error");
                Self::internal("An internal error occurred")
            }
        }
    }
}

/// Failure to hand an experience event to the broker.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("experience amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("failed to encode experience event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("broker rejected experience event: {0}")]
    Broker(String),
    #[error("publish timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::InvalidAmount(amount) => {
                Self::bad_request(format!("exp_amount must be positive, got {amount}"))
            }
            other => Self::service_unavailable(other.to_string()),
        }
    }
}

impl From<crate::gateway::HubError> for ApiError {
    fn from(err: crate::gateway::HubError) -> Self {
        tracing::warn!(%err, "hub unavailable");
        Self::service_unavailable("Realtime hub unavailable")
    }
}

impl From<lapin::Error> for PublishError {
    fn from(err: lapin::Error) -> Self {
        Self::Broker(err.to_string())
    }
}
