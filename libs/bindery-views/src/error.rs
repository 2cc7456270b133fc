use axum::http::StatusCode;
use bindery_api::QueryError;
use bindery_engine::SerializerError;
use serde_json::json;

/// Failure of one view action, mapped to an HTTP status by the boundary.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error(transparent)]
    Serializer(#[from] SerializerError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ViewError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// - validation, malformed request: 400
    /// - not found: 404
    /// - conflict: 409
    /// - everything else (representation, storage rows, missing serializer,
    ///   backend): 500
    pub fn status(&self) -> StatusCode {
        match self {
            ViewError::Serializer(SerializerError::Validation(_)) | ViewError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ViewError::Query(QueryError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ViewError::Query(QueryError::Conflict(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Validation errors are the bare field map; everything else is
    /// `{"message": ...}`.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ViewError::Serializer(SerializerError::Validation(errors)) => {
                serde_json::to_value(errors).unwrap_or_else(|e| json!({ "message": e.to_string() }))
            }
            other => json!({ "message": other.to_string() }),
        }
    }
}
