// SolarOps automation API server
// Decision: One AutomationEngine per process; every route module shares it
// Decision: PostgreSQL when DATABASE_URL is set, in-memory store otherwise (dev mode)

mod alerts;
mod anomalies;
mod common;
mod incidents;
mod panels;
mod technicians;
mod tickets;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use solarops_core::{
    Alert, AlertStatus, AlertSyncReport, AlertUpsert, AlertUpsertRequest, AnomalyEvent,
    AnomalySource, AutomationEngine, AutomationEvent, AutomationStage, CreatePanel,
    CreateTechnician, DedupScope, EngineConfig, FaultRecord, InMemoryAutomationStore, IngestRecord,
    Panel, PanelStatus, PanelStatusChange, PendingAnomaly, ResolvedTicket, RowKey, Severity,
    Technician, TechnicianStatus, Ticket, TicketPatch, TicketPriority, TicketStatus, TicketUpdate,
    WorkflowResult,
};
use solarops_storage::create_pg_automation_store;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::common::{ApiError, AppState, ListResponse};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9300";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage_mode: &'static str,
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    storage_mode: &'static str,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage_mode: state.storage_mode,
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        anomalies::report_anomaly,
        anomalies::report_anomaly_deferred,
        anomalies::list_pending,
        anomalies::cancel_pending,
        anomalies::list_recent,
        anomalies::stream_results,
        tickets::list_tickets,
        tickets::get_ticket,
        tickets::update_ticket,
        tickets::resolve_ticket,
        technicians::list_technicians,
        technicians::create_technician,
        alerts::list_alerts,
        alerts::upsert_alert,
        alerts::sync_alerts,
        alerts::dismiss_alert,
        panels::list_panels,
        panels::create_panel,
        panels::update_panel_status,
        incidents::list_incident_events,
    ),
    components(
        schemas(
            AnomalyEvent, AnomalySource, DedupScope, Severity, RowKey, FaultRecord,
            WorkflowResult, PendingAnomaly, IngestRecord,
            Ticket, TicketStatus, TicketPriority, TicketPatch, TicketUpdate, ResolvedTicket,
            tickets::ResolveTicketRequest,
            Technician, TechnicianStatus, CreateTechnician,
            Alert, AlertStatus, AlertUpsertRequest, AlertUpsert, AlertSyncReport,
            Panel, PanelStatus, CreatePanel, PanelStatusChange,
            panels::UpdatePanelStatusRequest,
            AutomationEvent, AutomationStage,
            ApiError,
            ListResponse<Ticket>,
            ListResponse<Technician>,
            ListResponse<Panel>,
            ListResponse<Alert>,
            ListResponse<AutomationEvent>,
            ListResponse<PendingAnomaly>,
            ListResponse<IngestRecord>,
        )
    ),
    tags(
        (name = "anomalies", description = "Anomaly ingest and recent results"),
        (name = "tickets", description = "Ticket queries and lifecycle"),
        (name = "technicians", description = "Technician registry"),
        (name = "alerts", description = "Row alert aggregation"),
        (name = "panels", description = "Panel registry and status transitions"),
        (name = "incidents", description = "Automation audit trail")
    ),
    info(
        title = "SolarOps Automation API",
        version = "0.1.0",
        description = "Turns solar farm anomalies into fault records, tickets, and technician assignments",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "solarops_api=debug,solarops_core=debug,solarops_storage=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("solarops-api starting...");

    let config = EngineConfig::from_env();
    tracing::info!(
        dedup_window_minutes = config.dedup_window_minutes,
        busy_threshold = config.busy_threshold,
        row_locking = config.row_locking,
        "Engine configured"
    );

    // Select storage backend
    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|s| !s.is_empty());
    let (engine, storage_mode) = match database_url {
        Some(url) => {
            let store = Arc::new(
                create_pg_automation_store(&url)
                    .await
                    .context("Failed to connect to database")?,
            );
            tracing::info!("Connected to database");
            let engine = AutomationEngine::new(store.clone(), store, config)
                .context("Failed to build automation engine")?;
            (engine, "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            let store = Arc::new(InMemoryAutomationStore::new());
            let engine = AutomationEngine::new(store.clone(), store, config)
                .context("Failed to build automation engine")?;
            (engine, "memory")
        }
    };

    // Load API prefix from environment (default: empty)
    // Example: API_PREFIX="/api" results in routes like /api/v1/tickets
    let api_prefix = std::env::var("API_PREFIX").unwrap_or_default();
    if !api_prefix.is_empty() {
        tracing::info!(prefix = %api_prefix, "API prefix configured");
    }

    // Example: CORS_ALLOWED_ORIGINS="https://ops.example.com,https://admin.example.com"
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    let app = build_app(engine.clone(), storage_mode, &api_prefix);

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                ]),
        )
    } else {
        app
    };

    // Add tracing
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let addr = std::env::var("SOLAROPS_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    engine.shutdown();
    tracing::info!("solarops-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Health, prefixed API routes, and Swagger UI
fn build_app(engine: AutomationEngine, storage_mode: &'static str, api_prefix: &str) -> Router {
    let state = AppState::new(engine);
    let api_routes = Router::new()
        .merge(anomalies::routes(state.clone()))
        .merge(tickets::routes(state.clone()))
        .merge(technicians::routes(state.clone()))
        .merge(alerts::routes(state.clone()))
        .merge(panels::routes(state.clone()))
        .merge(incidents::routes(state));

    Router::new()
        .route(
            "/health",
            get(health).with_state(HealthState { storage_mode }),
        )
        .merge(build_router_with_prefix(api_routes, api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_support::{engine, send};
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_routes() -> Router {
        Router::new().route("/v1/test", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn test_api_prefix_empty() {
        let app = build_router_with_prefix(test_routes(), "");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_app_nests_routes_under_prefix() {
        let (engine, _) = engine().await;
        let app = build_app(engine, "memory", "/api");

        let (status, _) = send(&app, Method::GET, "/api/v1/tickets", None).await;
        assert_eq!(status, 200);
        let (status, _) = send(&app, Method::GET, "/v1/tickets", None).await;
        assert_eq!(status, 404);

        let (status, health) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, 200);
        assert_eq!(health["storage_mode"], "memory");
    }

    #[test]
    fn test_openapi_lists_every_route_group() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/anomalies",
            "/v1/tickets/{ticket_id}",
            "/v1/alerts/sync",
            "/v1/panels/{panel_id}/status",
            "/v1/incidents/{incident_id}/events",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
