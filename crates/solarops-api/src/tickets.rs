// Ticket HTTP routes

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use solarops_core::{ResolvedTicket, Ticket, TicketPatch, TicketUpdate};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::{ApiError, ApiResult, AppState, ListResponse};

/// Create ticket routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/tickets", get(list_tickets))
        .route("/v1/tickets/:ticket_id", get(get_ticket).patch(update_ticket))
        .route("/v1/tickets/:ticket_id/resolve", post(resolve_ticket))
        .with_state(state)
}

/// Request to resolve a ticket
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ResolveTicketRequest {
    /// Free-form notes kept on the returned snapshot
    pub resolution_notes: Option<String>,
}

/// GET /v1/tickets - List open tickets
#[utoipa::path(
    get,
    path = "/v1/tickets",
    responses(
        (status = 200, description = "Open tickets", body = ListResponse<Ticket>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn list_tickets(State(state): State<AppState>) -> ApiResult<Json<ListResponse<Ticket>>> {
    let tickets = state.engine.list_tickets().await?;
    Ok(Json(ListResponse::new(tickets)))
}

/// GET /v1/tickets/{ticket_id} - Get ticket by ID
#[utoipa::path(
    get,
    path = "/v1/tickets/{ticket_id}",
    params(
        ("ticket_id" = Uuid, Path, description = "Ticket ID")
    ),
    responses(
        (status = 200, description = "Ticket found", body = Ticket),
        (status = 404, description = "Ticket not found (or already resolved)", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.get_ticket(ticket_id).await?))
}

/// PATCH /v1/tickets/{ticket_id} - Update status, assignment, priority, or notes
///
/// Moving a ticket to `resolved` or `closed` reverses the assignee's workload
/// and removes the ticket; the response then carries the final snapshot.
#[utoipa::path(
    patch,
    path = "/v1/tickets/{ticket_id}",
    params(
        ("ticket_id" = Uuid, Path, description = "Ticket ID")
    ),
    request_body = TicketPatch,
    responses(
        (status = 200, description = "Ticket updated or resolved", body = TicketUpdate),
        (status = 400, description = "Empty patch", body = ApiError),
        (status = 404, description = "Ticket or technician not found", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn update_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Json(patch): Json<TicketPatch>,
) -> ApiResult<Json<TicketUpdate>> {
    Ok(Json(state.engine.update_ticket(ticket_id, patch).await?))
}

/// POST /v1/tickets/{ticket_id}/resolve - Resolve and remove a ticket
#[utoipa::path(
    post,
    path = "/v1/tickets/{ticket_id}/resolve",
    params(
        ("ticket_id" = Uuid, Path, description = "Ticket ID")
    ),
    request_body = ResolveTicketRequest,
    responses(
        (status = 200, description = "Ticket resolved", body = ResolvedTicket),
        (status = 404, description = "Ticket not found", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn resolve_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    body: Option<Json<ResolveTicketRequest>>,
) -> ApiResult<Json<ResolvedTicket>> {
    let Json(req) = body.unwrap_or_default();
    let resolved = state
        .engine
        .resolve_ticket(ticket_id, req.resolution_notes)
        .await?;
    Ok(Json(resolved))
}
