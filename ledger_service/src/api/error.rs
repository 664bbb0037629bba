use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::domain::error::LedgerError;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ApiErrorBody {
    Error { message: String },
}

/// Maps `LedgerError` onto HTTP status codes per the error-kind table.
/// `Internal` is logged with full detail but never echoed to the client.
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            LedgerError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
            LedgerError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            LedgerError::InsufficientBalance => {
                (StatusCode::BAD_REQUEST, "insufficient balance".to_string())
            }
            LedgerError::BankRejection(payload) => (StatusCode::BAD_GATEWAY, payload.to_string()),
            LedgerError::Transient => (
                StatusCode::SERVICE_UNAVAILABLE,
                "transient failure, retry the request".to_string(),
            ),
            LedgerError::Conflict => (
                StatusCode::CONFLICT,
                "idempotency key race, retry the request".to_string(),
            ),
            LedgerError::Internal(msg) => {
                error!(error = %msg, "internal error serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(ApiErrorBody::Error { message })).into_response()
    }
}
