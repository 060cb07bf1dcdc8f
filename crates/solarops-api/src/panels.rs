// Panel registry and status transition HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use solarops_core::{CreatePanel, Panel, PanelStatus, PanelStatusChange};
use utoipa::ToSchema;

use crate::common::{ApiError, ApiResult, AppState, ListResponse};

/// Create panel routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/panels", get(list_panels).post(create_panel))
        .route("/v1/panels/:panel_id/status", put(update_panel_status))
        .with_state(state)
}

/// Request to change a panel's status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePanelStatusRequest {
    pub status: PanelStatus,
}

/// GET /v1/panels - List panels
#[utoipa::path(
    get,
    path = "/v1/panels",
    responses(
        (status = 200, description = "Panels", body = ListResponse<Panel>)
    ),
    tag = "panels"
)]
pub async fn list_panels(State(state): State<AppState>) -> ApiResult<Json<ListResponse<Panel>>> {
    Ok(Json(ListResponse::new(state.engine.list_panels().await?)))
}

/// POST /v1/panels - Register a panel
#[utoipa::path(
    post,
    path = "/v1/panels",
    request_body = CreatePanel,
    responses(
        (status = 201, description = "Panel registered", body = Panel),
        (status = 400, description = "Invalid panel", body = ApiError),
        (status = 409, description = "Panel ID already registered", body = ApiError)
    ),
    tag = "panels"
)]
pub async fn create_panel(
    State(state): State<AppState>,
    Json(req): Json<CreatePanel>,
) -> ApiResult<(StatusCode, Json<Panel>)> {
    let panel = state.engine.register_panel(req).await?;
    Ok((StatusCode::CREATED, Json(panel)))
}

/// PUT /v1/panels/{panel_id}/status - Record a status change and sync its row alert
#[utoipa::path(
    put,
    path = "/v1/panels/{panel_id}/status",
    params(
        ("panel_id" = String, Path, description = "Panel identifier, e.g. PNL-A0101")
    ),
    request_body = UpdatePanelStatusRequest,
    responses(
        (status = 200, description = "Status recorded", body = PanelStatusChange),
        (status = 404, description = "Panel not found", body = ApiError)
    ),
    tag = "panels"
)]
pub async fn update_panel_status(
    State(state): State<AppState>,
    Path(panel_id): Path<String>,
    Json(req): Json<UpdatePanelStatusRequest>,
) -> ApiResult<Json<PanelStatusChange>> {
    let change = state
        .engine
        .update_panel_status(&panel_id, req.status)
        .await?;
    Ok(Json(change))
}
