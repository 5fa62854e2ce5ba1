use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{schemas::ValidationError, search::SearchError, search::IndexerError};

/// ApiError
///
/// Every failure a handler can return. Each variant maps to one status code;
/// the body is always an [`ErrorBody`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request body is not valid JSON.
    #[error("request body is not valid JSON: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("you do not have permission to do that")]
    Forbidden,

    #[error("authentication required")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("indexing error: {0}")]
    Indexer(#[from] IndexerError),
}

/// ErrorBody
///
/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub status: &'static str,
    pub reason: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Payload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) | ApiError::Search(_) | ApiError::Indexer(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details are logged, not returned.
        let reason = if status.is_server_error() {
            tracing::error!("{}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            status: "failure",
            reason,
        };
        (status, Json(body)).into_response()
    }
}
