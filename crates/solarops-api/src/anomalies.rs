// Anomaly ingest HTTP routes
//
// POST /v1/anomalies runs the fault-ticket workflow inline. The deferred
// variant queues it behind the engine's scheduler. Processed anomalies are
// readable from the recent-results cache and streamed live over SSE.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use solarops_core::{AnomalyEvent, IngestRecord, PendingAnomaly, WorkflowResult};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::common::{ApiError, ApiResult, AppState, ListResponse};

const DEFAULT_RECENT_LIMIT: usize = 20;

/// Create anomaly routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/anomalies", post(report_anomaly))
        .route("/v1/anomalies/deferred", post(report_anomaly_deferred))
        .route("/v1/anomalies/pending", get(list_pending))
        .route("/v1/anomalies/pending/:id", delete(cancel_pending))
        .route("/v1/anomalies/recent", get(list_recent))
        .route("/v1/anomalies/stream", get(stream_results))
        .with_state(state)
}

/// POST /v1/anomalies - Run the fault-ticket workflow for one anomaly
#[utoipa::path(
    post,
    path = "/v1/anomalies",
    request_body = AnomalyEvent,
    responses(
        (status = 201, description = "Fault and ticket created", body = WorkflowResult),
        (status = 200, description = "Matched an open ticket in the dedup window", body = WorkflowResult),
        (status = 400, description = "Invalid anomaly", body = ApiError),
        (status = 500, description = "Workflow failed; nothing was persisted", body = ApiError)
    ),
    tag = "anomalies"
)]
pub async fn report_anomaly(
    State(state): State<AppState>,
    Json(event): Json<AnomalyEvent>,
) -> ApiResult<(StatusCode, Json<WorkflowResult>)> {
    let result = state.engine.report_anomaly(event).await?;
    let status = if result.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(result)))
}

/// POST /v1/anomalies/deferred - Queue an anomaly for a delayed workflow run
#[utoipa::path(
    post,
    path = "/v1/anomalies/deferred",
    request_body = AnomalyEvent,
    responses(
        (status = 202, description = "Anomaly queued", body = PendingAnomaly),
        (status = 400, description = "Invalid anomaly", body = ApiError)
    ),
    tag = "anomalies"
)]
pub async fn report_anomaly_deferred(
    State(state): State<AppState>,
    Json(event): Json<AnomalyEvent>,
) -> ApiResult<(StatusCode, Json<PendingAnomaly>)> {
    let pending = state.engine.report_anomaly_deferred(event)?;
    Ok((StatusCode::ACCEPTED, Json(pending)))
}

/// GET /v1/anomalies/pending - List queued anomalies
#[utoipa::path(
    get,
    path = "/v1/anomalies/pending",
    responses(
        (status = 200, description = "Queued anomalies", body = ListResponse<PendingAnomaly>)
    ),
    tag = "anomalies"
)]
pub async fn list_pending(State(state): State<AppState>) -> Json<ListResponse<PendingAnomaly>> {
    Json(ListResponse::new(state.engine.pending_anomalies()))
}

/// DELETE /v1/anomalies/pending/{id} - Cancel a queued anomaly
#[utoipa::path(
    delete,
    path = "/v1/anomalies/pending/{id}",
    params(
        ("id" = Uuid, Path, description = "Pending anomaly ID")
    ),
    responses(
        (status = 204, description = "Cancelled"),
        (status = 404, description = "Nothing pending under this ID", body = ApiError)
    ),
    tag = "anomalies"
)]
pub async fn cancel_pending(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.engine.cancel_pending(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no pending anomaly {id}")))
    }
}

/// Query parameters for the recent-results listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct RecentQuery {
    /// Maximum number of records, newest first (default 20)
    pub limit: Option<usize>,
    /// Only records for this zone
    pub zone: Option<String>,
    /// Only records that failed
    #[serde(default)]
    pub failed: bool,
}

/// GET /v1/anomalies/recent - Recently processed anomalies
#[utoipa::path(
    get,
    path = "/v1/anomalies/recent",
    params(RecentQuery),
    responses(
        (status = 200, description = "Recent ingest records", body = ListResponse<IngestRecord>)
    ),
    tag = "anomalies"
)]
pub async fn list_recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<ListResponse<IngestRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let records = if query.zone.is_none() && !query.failed {
        state.engine.recent_results().recent(limit)
    } else {
        state
            .engine
            .recent_results()
            .query(|record| {
                query
                    .zone
                    .as_deref()
                    .map_or(true, |zone| record.location.zone == zone)
                    && (!query.failed || record.error.is_some())
            })
            .into_iter()
            .take(limit)
            .collect()
    };
    Json(ListResponse::new(records))
}

/// GET /v1/anomalies/stream - Live ingest records (SSE)
#[utoipa::path(
    get,
    path = "/v1/anomalies/stream",
    responses(
        (status = 200, description = "Ingest record stream", content_type = "text/event-stream")
    ),
    tag = "anomalies"
)]
pub async fn stream_results(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.engine.recent_results().subscribe();
    tracing::info!("Starting ingest stream");

    let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(record) => match SseEvent::default().event("ingest").json_data(&record) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode ingest record");
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Ingest stream subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
