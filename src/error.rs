use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::drip::DripError;
use crate::services::embedding::search::SearchError;
use crate::services::orchestration::PipelineError;
use crate::services::printful::FulfillmentError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Dependency unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Database(e) => AppError::DatabaseError(e),
            other => AppError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NotConfigured(what) => AppError::ServiceUnavailable(format!("{what} is not configured")),
            PipelineError::Database(e) => AppError::DatabaseError(e),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<DripError> for AppError {
    fn from(e: DripError) -> Self {
        match e {
            DripError::Database(e) => AppError::DatabaseError(e),
            DripError::Closed => AppError::ServiceUnavailable("Drip worker is not running".to_string()),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<FulfillmentError> for AppError {
    fn from(e: FulfillmentError) -> Self {
        match e {
            FulfillmentError::UnknownVariant(size) => AppError::BadRequest(format!("No fulfillment variant for size {size}")),
            FulfillmentError::Http { status, message } if (400..500).contains(&status) && status != 429 => {
                AppError::BadRequest(message)
            }
            other => AppError::ServiceUnavailable(other.to_string()),
        }
    }
}
