use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use distribution_common::store::StoreError;

/// The body of every error response.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("source {0} not found")]
    SourceNotFound(i64),
    #[error("operator {0} not found")]
    OperatorNotFound(i64),
    #[error("ticket {0} not found")]
    TicketNotFound(i64),

    #[error("{0}")]
    MissingReference(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ApiError::InvalidRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            ApiError::SourceNotFound(_)
            | ApiError::OperatorNotFound(_)
            | ApiError::TicketNotFound(_) => StatusCode::NOT_FOUND,

            ApiError::MissingReference(_) | ApiError::Store(_) => {
                error!("internal error: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
