use axum::response::IntoResponse;
use axum::Json;
use hal_engine::{PreconditionError, RegistryError, ResourceError};
use http::StatusCode;
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a detail message and status code
    pub fn new<S: ToString>(detail: S, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            status_code,
        }
    }

    /// Create new Internal Server Error (500) with a detail message
    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create new Bad Request Error (400) with a detail message
    pub fn bad_request<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_REQUEST)
    }

    /// Create new Not Found Error (404) with a detail message
    pub fn not_found<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::NOT_FOUND)
    }
}

impl From<ResourceError> for ApiError {
    fn from(error: ResourceError) -> Self {
        Self::new(error.to_string(), error.status_code())
    }
}

impl From<PreconditionError> for ApiError {
    fn from(error: PreconditionError) -> Self {
        Self::new(error.to_string(), error.status_code())
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        Self::internal(error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        let status_code = match error {
            StoreError::Conflict(_) | StoreError::AlreadyExists(_) => {
                StatusCode::PRECONDITION_FAILED
            }
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        Self::new(error, status_code)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        if status_code.is_server_error() {
            log::error!("Request failed: {}", self.detail);
        } else {
            log::debug!("Request rejected with {}: {}", status_code, self.detail);
        }
        let body = json!({
            "detail": self.detail,
        });
        (status_code, Json(body)).into_response()
    }
}
