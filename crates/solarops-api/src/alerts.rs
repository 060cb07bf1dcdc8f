// Row alert HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use solarops_core::{Alert, AlertSyncReport, AlertUpsert, AlertUpsertRequest};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::common::{ApiError, ApiResult, AppState, ListResponse};

/// Create alert routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/alerts", get(list_alerts).put(upsert_alert))
        .route("/v1/alerts/sync", post(sync_alerts))
        .route("/v1/alerts/:alert_id/dismiss", post(dismiss_alert))
        .with_state(state)
}

/// Query parameters for listing alerts
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AlertListQuery {
    /// Include dismissed alerts (default false)
    #[serde(default)]
    pub include_dismissed: bool,
}

/// GET /v1/alerts - List row alerts
#[utoipa::path(
    get,
    path = "/v1/alerts",
    params(AlertListQuery),
    responses(
        (status = 200, description = "Row alerts", body = ListResponse<Alert>)
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertListQuery>,
) -> ApiResult<Json<ListResponse<Alert>>> {
    let alerts = state.engine.list_alerts(query.include_dismissed).await?;
    Ok(Json(ListResponse::new(alerts)))
}

/// PUT /v1/alerts - Create or update the open alert for a row
///
/// A new alert, or an escalation from warning to fault, also runs the
/// fault-ticket workflow; its result is returned under `workflow`.
#[utoipa::path(
    put,
    path = "/v1/alerts",
    request_body = AlertUpsertRequest,
    responses(
        (status = 201, description = "Alert created", body = AlertUpsert),
        (status = 200, description = "Existing alert updated", body = AlertUpsert),
        (status = 400, description = "Invalid row", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn upsert_alert(
    State(state): State<AppState>,
    Json(req): Json<AlertUpsertRequest>,
) -> ApiResult<(StatusCode, Json<AlertUpsert>)> {
    let upsert = state.engine.upsert_row_alert(req).await?;
    let status = if upsert.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(upsert)))
}

/// POST /v1/alerts/sync - Reconcile alerts against live panel status
#[utoipa::path(
    post,
    path = "/v1/alerts/sync",
    responses(
        (status = 200, description = "Sync report", body = AlertSyncReport)
    ),
    tag = "alerts"
)]
pub async fn sync_alerts(State(state): State<AppState>) -> ApiResult<Json<AlertSyncReport>> {
    Ok(Json(state.engine.sync_alerts().await?))
}

/// POST /v1/alerts/{alert_id}/dismiss - Dismiss an alert
#[utoipa::path(
    post,
    path = "/v1/alerts/{alert_id}/dismiss",
    params(
        ("alert_id" = Uuid, Path, description = "Alert ID")
    ),
    responses(
        (status = 200, description = "Alert dismissed", body = Alert),
        (status = 404, description = "Alert not found", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn dismiss_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult<Json<Alert>> {
    Ok(Json(state.engine.dismiss_alert(alert_id).await?))
}
