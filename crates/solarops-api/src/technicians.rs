// Technician registry HTTP routes

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use solarops_core::{CreateTechnician, Technician};

use crate::common::{ApiError, ApiResult, AppState, ListResponse};

/// Create technician routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/technicians",
            get(list_technicians).post(create_technician),
        )
        .with_state(state)
}

/// GET /v1/technicians - List technicians with their current workload
#[utoipa::path(
    get,
    path = "/v1/technicians",
    responses(
        (status = 200, description = "Technicians", body = ListResponse<Technician>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "technicians"
)]
pub async fn list_technicians(
    State(state): State<AppState>,
) -> ApiResult<Json<ListResponse<Technician>>> {
    let technicians = state.engine.list_technicians().await?;
    Ok(Json(ListResponse::new(technicians)))
}

/// POST /v1/technicians - Register a technician
#[utoipa::path(
    post,
    path = "/v1/technicians",
    request_body = CreateTechnician,
    responses(
        (status = 201, description = "Technician registered", body = Technician),
        (status = 400, description = "Invalid technician", body = ApiError)
    ),
    tag = "technicians"
)]
pub async fn create_technician(
    State(state): State<AppState>,
    Json(req): Json<CreateTechnician>,
) -> ApiResult<(StatusCode, Json<Technician>)> {
    let technician = state.engine.register_technician(req).await?;
    Ok((StatusCode::CREATED, Json(technician)))
}
