// Shared state, DTOs, and error mapping for the HTTP routes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use solarops_core::{AutomationEngine, AutomationError, StoreError};
use utoipa::ToSchema;

/// App state shared by every route module
#[derive(Clone)]
pub struct AppState {
    pub engine: AutomationEngine,
}

impl AppState {
    pub fn new(engine: AutomationEngine) -> Self {
        Self { engine }
    }
}

/// Response wrapper for list endpoints.
/// All list endpoints return responses wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    /// Array of items returned by the list operation.
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            status,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<AutomationError> for ApiError {
    fn from(e: AutomationError) -> Self {
        let status = match &e {
            AutomationError::Validation(_) => StatusCode::BAD_REQUEST,
            AutomationError::NotFound { .. }
            | AutomationError::Storage(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AutomationError::Storage(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AutomationError::Storage(_) | AutomationError::Notification(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "Request failed");
        } else {
            tracing::debug!(error = %e, status = status.as_u16(), "Request rejected");
        }
        Self::new(status, e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
