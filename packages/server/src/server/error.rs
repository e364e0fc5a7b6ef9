//! Mapping of engine errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::common::EngineError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    retryable: bool,
}

/// Errors returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    BadRequest(String),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "Authentication required".to_string(),
                    field: None,
                    retryable: false,
                },
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    field: None,
                    retryable: false,
                },
            ),
            ApiError::Engine(EngineError::Validation { field, message }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    error: message,
                    field: Some(field),
                    retryable: false,
                },
            ),
            ApiError::Engine(e @ EngineError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: e.to_string(),
                    field: None,
                    retryable: false,
                },
            ),
            ApiError::Engine(e @ EngineError::Conflict(_)) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: e.to_string(),
                    field: None,
                    retryable: true,
                },
            ),
            ApiError::Engine(EngineError::StoreUnavailable(e)) => {
                tracing::error!(error = %e, "Store failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        error: "Service temporarily unavailable, please retry".to_string(),
                        field: None,
                        retryable: true,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
