// Incident audit trail HTTP routes

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use solarops_core::AutomationEvent;

use crate::common::{ApiError, ApiResult, AppState, ListResponse};

/// Create incident routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/incidents/:incident_id/events", get(list_incident_events))
        .with_state(state)
}

/// GET /v1/incidents/{incident_id}/events - Automation events for one incident
#[utoipa::path(
    get,
    path = "/v1/incidents/{incident_id}/events",
    params(
        ("incident_id" = String, Path, description = "Incident identifier, e.g. INC-001")
    ),
    responses(
        (status = 200, description = "Events, oldest first", body = ListResponse<AutomationEvent>),
        (status = 404, description = "No events recorded for this incident", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn list_incident_events(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> ApiResult<Json<ListResponse<AutomationEvent>>> {
    let events = state.engine.incident_trail(&incident_id).await?;
    if events.is_empty() {
        return Err(ApiError::not_found(format!(
            "no events for incident {incident_id}"
        )));
    }
    Ok(Json(ListResponse::new(events)))
}
