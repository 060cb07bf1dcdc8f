// Repository layer for database operations
//
// Query functions are generic over the executor so the same SQL runs against
// the pool (read paths) and inside an open transaction (workflow paths).

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tracing::{error, info};
use uuid::Uuid;

use solarops_core::fault::normalize_fault_type;
use solarops_core::{
    Alert, AutomationEvent, FaultRecord, IdentifierKind, Panel, PanelStatus, RecentFaultQuery,
    RowKey, StoreError, StoreResult, Technician, Ticket,
};

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

/// Map a sqlx error, turning unique violations into conflicts
pub(crate) fn db_error(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    error!(error = %e, "Database query failed");
    StoreError::Database(e.to_string())
}

/// LIKE patterns for every prefix of an identifier kind, e.g. `TKT-%`
fn identifier_patterns(kind: IdentifierKind) -> Vec<String> {
    kind.known_prefixes()
        .iter()
        .map(|prefix| format!("{prefix}-%"))
        .collect()
}

// ============================================
// Panels
// ============================================

pub(crate) async fn insert_panel<'e, E: PgExecutor<'e>>(
    exec: E,
    panel: &Panel,
) -> StoreResult<Panel> {
    let row = sqlx::query_as::<_, PanelRow>(
        r#"
        INSERT INTO panels (id, panel_id, zone, row_num, status, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, panel_id, zone, row_num, status, updated_at
        "#,
    )
    .bind(panel.id)
    .bind(&panel.panel_id)
    .bind(&panel.zone)
    .bind(to_i32(panel.row))
    .bind(panel.status.to_string())
    .bind(panel.updated_at)
    .fetch_one(exec)
    .await
    .map_err(db_error)?;

    Ok(row.into())
}

pub(crate) async fn list_panels<'e, E: PgExecutor<'e>>(exec: E) -> StoreResult<Vec<Panel>> {
    let rows = sqlx::query_as::<_, PanelRow>(
        r#"
        SELECT id, panel_id, zone, row_num, status, updated_at
        FROM panels
        ORDER BY zone, row_num, panel_id
        "#,
    )
    .fetch_all(exec)
    .await
    .map_err(db_error)?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn panel_ids_in_row<'e, E: PgExecutor<'e>>(
    exec: E,
    row: &RowKey,
) -> StoreResult<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT panel_id
        FROM panels
        WHERE zone = $1 AND row_num = $2
        ORDER BY panel_id
        "#,
    )
    .bind(&row.zone)
    .bind(to_i32(row.row))
    .fetch_all(exec)
    .await
    .map_err(db_error)
}

pub(crate) async fn update_panel_status<'e, E: PgExecutor<'e>>(
    exec: E,
    panel_id: &str,
    status: PanelStatus,
    now: DateTime<Utc>,
) -> StoreResult<Option<Panel>> {
    let row = sqlx::query_as::<_, PanelRow>(
        r#"
        UPDATE panels
        SET status = $2, updated_at = $3
        WHERE panel_id = $1
        RETURNING id, panel_id, zone, row_num, status, updated_at
        "#,
    )
    .bind(panel_id)
    .bind(status.to_string())
    .bind(now)
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(row.map(Into::into))
}

// ============================================
// Technicians
// ============================================

pub(crate) async fn insert_technician<'e, E: PgExecutor<'e>>(
    exec: E,
    technician: &Technician,
) -> StoreResult<Technician> {
    let row = sqlx::query_as::<_, TechnicianRow>(
        r#"
        INSERT INTO technicians (id, name, skills, status, active_tickets, resolved_tickets,
                                 avg_resolution_time, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, name, skills, status, active_tickets, resolved_tickets,
                  avg_resolution_time, created_at, updated_at
        "#,
    )
    .bind(technician.id)
    .bind(&technician.name)
    .bind(&technician.skills)
    .bind(technician.status.to_string())
    .bind(to_i32(technician.active_tickets))
    .bind(to_i32(technician.resolved_tickets))
    .bind(technician.avg_resolution_time)
    .bind(technician.created_at)
    .bind(technician.updated_at)
    .fetch_one(exec)
    .await
    .map_err(db_error)?;

    Ok(row.into())
}

pub(crate) async fn get_technician<'e, E: PgExecutor<'e>>(
    exec: E,
    id: Uuid,
    for_update: bool,
) -> StoreResult<Option<Technician>> {
    let sql = if for_update {
        r#"
        SELECT id, name, skills, status, active_tickets, resolved_tickets,
               avg_resolution_time, created_at, updated_at
        FROM technicians
        WHERE id = $1
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT id, name, skills, status, active_tickets, resolved_tickets,
               avg_resolution_time, created_at, updated_at
        FROM technicians
        WHERE id = $1
        "#
    };
    let row = sqlx::query_as::<_, TechnicianRow>(sql)
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(db_error)?;

    Ok(row.map(Into::into))
}

/// All technicians in registration order. `for_update` locks the rows so
/// concurrent workflows cannot both read the same workload counters.
pub(crate) async fn list_technicians<'e, E: PgExecutor<'e>>(
    exec: E,
    for_update: bool,
) -> StoreResult<Vec<Technician>> {
    let sql = if for_update {
        r#"
        SELECT id, name, skills, status, active_tickets, resolved_tickets,
               avg_resolution_time, created_at, updated_at
        FROM technicians
        ORDER BY created_at, id
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT id, name, skills, status, active_tickets, resolved_tickets,
               avg_resolution_time, created_at, updated_at
        FROM technicians
        ORDER BY created_at, id
        "#
    };
    let rows = sqlx::query_as::<_, TechnicianRow>(sql)
        .fetch_all(exec)
        .await
        .map_err(db_error)?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn update_technician<'e, E: PgExecutor<'e>>(
    exec: E,
    technician: &Technician,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE technicians
        SET name = $2, skills = $3, status = $4, active_tickets = $5,
            resolved_tickets = $6, avg_resolution_time = $7, updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(technician.id)
    .bind(&technician.name)
    .bind(&technician.skills)
    .bind(technician.status.to_string())
    .bind(to_i32(technician.active_tickets))
    .bind(to_i32(technician.resolved_tickets))
    .bind(technician.avg_resolution_time)
    .bind(technician.updated_at)
    .execute(exec)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "technician",
            id: technician.id.to_string(),
        });
    }
    Ok(())
}

// ============================================
// Faults
// ============================================

pub(crate) async fn insert_fault<'e, E: PgExecutor<'e>>(
    exec: E,
    fault: &FaultRecord,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO fault_records (id, zone, row_num, panel_id, fault_type, fault_type_key,
                                   severity, detected_at, confidence, analysis_text,
                                   recommended_action, image_refs, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(fault.id)
    .bind(&fault.location.zone)
    .bind(to_i32(fault.location.row))
    .bind(&fault.panel_id)
    .bind(&fault.fault_type)
    .bind(normalize_fault_type(&fault.fault_type))
    .bind(&fault.severity)
    .bind(fault.detected_at)
    .bind(fault.confidence)
    .bind(&fault.analysis_text)
    .bind(&fault.recommended_action)
    .bind(&fault.image_refs)
    .bind(fault.created_at)
    .execute(exec)
    .await
    .map_err(db_error)?;

    Ok(())
}

pub(crate) async fn get_fault<'e, E: PgExecutor<'e>>(
    exec: E,
    id: Uuid,
) -> StoreResult<Option<FaultRecord>> {
    let row = sqlx::query_as::<_, FaultRow>(
        r#"
        SELECT id, zone, row_num, panel_id, fault_type, severity, detected_at, confidence,
               analysis_text, recommended_action, image_refs, created_at
        FROM fault_records
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(row.map(Into::into))
}

/// Most recent fault on any of the given panels detected at or after `since`
pub(crate) async fn find_recent_fault<'e, E: PgExecutor<'e>>(
    exec: E,
    query: &RecentFaultQuery,
) -> StoreResult<Option<FaultRecord>> {
    let row = sqlx::query_as::<_, FaultRow>(
        r#"
        SELECT id, zone, row_num, panel_id, fault_type, severity, detected_at, confidence,
               analysis_text, recommended_action, image_refs, created_at
        FROM fault_records
        WHERE panel_id = ANY($1)
          AND detected_at >= $2
          AND ($3::TEXT IS NULL OR fault_type_key = $3)
        ORDER BY detected_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(&query.panel_ids)
    .bind(query.since)
    .bind(&query.fault_type)
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(row.map(Into::into))
}

// ============================================
// Tickets
// ============================================

pub(crate) async fn insert_ticket<'e, E: PgExecutor<'e>>(
    exec: E,
    ticket: &Ticket,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tickets (id, ticket_number, fault_id, zone, row_num, status, priority,
                             assigned_technician_id, notes, resolution_notes,
                             created_at, updated_at, resolved_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(ticket.id)
    .bind(&ticket.ticket_number)
    .bind(ticket.fault_id)
    .bind(&ticket.location.zone)
    .bind(to_i32(ticket.location.row))
    .bind(ticket.status.to_string())
    .bind(ticket.priority.to_string())
    .bind(ticket.assigned_technician_id)
    .bind(&ticket.notes)
    .bind(&ticket.resolution_notes)
    .bind(ticket.created_at)
    .bind(ticket.updated_at)
    .bind(ticket.resolved_at)
    .execute(exec)
    .await
    .map_err(db_error)?;

    Ok(())
}

pub(crate) async fn get_ticket<'e, E: PgExecutor<'e>>(
    exec: E,
    id: Uuid,
) -> StoreResult<Option<Ticket>> {
    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, ticket_number, fault_id, zone, row_num, status, priority,
               assigned_technician_id, notes, resolution_notes, created_at, updated_at, resolved_at
        FROM tickets
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(row.map(Into::into))
}

/// Same as `get_ticket` but holds a row lock until the transaction ends
pub(crate) async fn get_ticket_for_update<'e, E: PgExecutor<'e>>(
    exec: E,
    id: Uuid,
) -> StoreResult<Option<Ticket>> {
    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, ticket_number, fault_id, zone, row_num, status, priority,
               assigned_technician_id, notes, resolution_notes, created_at, updated_at, resolved_at
        FROM tickets
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(row.map(Into::into))
}

pub(crate) async fn list_tickets<'e, E: PgExecutor<'e>>(exec: E) -> StoreResult<Vec<Ticket>> {
    let rows = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, ticket_number, fault_id, zone, row_num, status, priority,
               assigned_technician_id, notes, resolution_notes, created_at, updated_at, resolved_at
        FROM tickets
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(exec)
    .await
    .map_err(db_error)?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn latest_ticket_for_fault<'e, E: PgExecutor<'e>>(
    exec: E,
    fault_id: Uuid,
) -> StoreResult<Option<Ticket>> {
    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, ticket_number, fault_id, zone, row_num, status, priority,
               assigned_technician_id, notes, resolution_notes, created_at, updated_at, resolved_at
        FROM tickets
        WHERE fault_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(fault_id)
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(row.map(Into::into))
}

pub(crate) async fn update_ticket<'e, E: PgExecutor<'e>>(
    exec: E,
    ticket: &Ticket,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE tickets
        SET status = $2, priority = $3, assigned_technician_id = $4, notes = $5,
            resolution_notes = $6, updated_at = $7, resolved_at = $8
        WHERE id = $1
        "#,
    )
    .bind(ticket.id)
    .bind(ticket.status.to_string())
    .bind(ticket.priority.to_string())
    .bind(ticket.assigned_technician_id)
    .bind(&ticket.notes)
    .bind(&ticket.resolution_notes)
    .bind(ticket.updated_at)
    .bind(ticket.resolved_at)
    .execute(exec)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "ticket",
            id: ticket.id.to_string(),
        });
    }
    Ok(())
}

pub(crate) async fn delete_ticket<'e, E: PgExecutor<'e>>(exec: E, id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
        .bind(id)
        .execute(exec)
        .await
        .map_err(db_error)?;

    Ok(result.rows_affected() > 0)
}

// ============================================
// Alerts
// ============================================

pub(crate) async fn find_open_alert<'e, E: PgExecutor<'e>>(
    exec: E,
    row: &RowKey,
) -> StoreResult<Option<Alert>> {
    let alert = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT id, alert_id, zone, row_num, status, message, dismissed, ticket_id, scan_id,
               created_at, updated_at
        FROM alerts
        WHERE zone = $1 AND row_num = $2 AND NOT dismissed
        FOR UPDATE
        "#,
    )
    .bind(&row.zone)
    .bind(to_i32(row.row))
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(alert.map(Into::into))
}

pub(crate) async fn get_alert<'e, E: PgExecutor<'e>>(
    exec: E,
    id: Uuid,
) -> StoreResult<Option<Alert>> {
    let alert = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT id, alert_id, zone, row_num, status, message, dismissed, ticket_id, scan_id,
               created_at, updated_at
        FROM alerts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await
    .map_err(db_error)?;

    Ok(alert.map(Into::into))
}

pub(crate) async fn list_alerts<'e, E: PgExecutor<'e>>(
    exec: E,
    include_dismissed: bool,
) -> StoreResult<Vec<Alert>> {
    let rows = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT id, alert_id, zone, row_num, status, message, dismissed, ticket_id, scan_id,
               created_at, updated_at
        FROM alerts
        WHERE $1 OR NOT dismissed
        ORDER BY created_at, id
        "#,
    )
    .bind(include_dismissed)
    .fetch_all(exec)
    .await
    .map_err(db_error)?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn insert_alert<'e, E: PgExecutor<'e>>(exec: E, alert: &Alert) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO alerts (id, alert_id, zone, row_num, status, message, dismissed, ticket_id,
                            scan_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(alert.id)
    .bind(&alert.alert_id)
    .bind(&alert.zone)
    .bind(to_i32(alert.row))
    .bind(alert.status.to_string())
    .bind(&alert.message)
    .bind(alert.dismissed)
    .bind(alert.ticket_id)
    .bind(&alert.scan_id)
    .bind(alert.created_at)
    .bind(alert.updated_at)
    .execute(exec)
    .await
    .map_err(db_error)?;

    Ok(())
}

pub(crate) async fn update_alert<'e, E: PgExecutor<'e>>(exec: E, alert: &Alert) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE alerts
        SET status = $2, message = $3, dismissed = $4, ticket_id = $5, scan_id = $6,
            updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(alert.id)
    .bind(alert.status.to_string())
    .bind(&alert.message)
    .bind(alert.dismissed)
    .bind(alert.ticket_id)
    .bind(&alert.scan_id)
    .bind(alert.updated_at)
    .execute(exec)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "alert",
            id: alert.id.to_string(),
        });
    }
    Ok(())
}

// ============================================
// Automation events and identifiers
// ============================================

pub(crate) async fn insert_event<'e, E: PgExecutor<'e>>(
    exec: E,
    event: &AutomationEvent,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO automation_events (id, event_type, stage, incident_id, fault_id, ticket_id,
                                       technician_id, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.id)
    .bind(&event.event_type)
    .bind(event.stage.as_str())
    .bind(&event.incident_id)
    .bind(event.fault_id)
    .bind(event.ticket_id)
    .bind(event.technician_id)
    .bind(&event.payload)
    .bind(event.created_at)
    .execute(exec)
    .await
    .map_err(db_error)?;

    Ok(())
}

pub(crate) async fn list_incident_events<'e, E: PgExecutor<'e>>(
    exec: E,
    incident_id: &str,
) -> StoreResult<Vec<AutomationEvent>> {
    let rows = sqlx::query_as::<_, AutomationEventRow>(
        r#"
        SELECT id, event_type, stage, incident_id, fault_id, ticket_id, technician_id,
               payload, created_at
        FROM automation_events
        WHERE incident_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(incident_id)
    .fetch_all(exec)
    .await
    .map_err(db_error)?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Most recently created identifier of `kind`, across all legacy prefixes
pub(crate) async fn latest_identifier<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: IdentifierKind,
) -> StoreResult<Option<String>> {
    let sql = match kind {
        IdentifierKind::Incident => {
            r#"
            SELECT incident_id FROM automation_events
            WHERE UPPER(incident_id) LIKE ANY($1)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        }
        IdentifierKind::Ticket => {
            r#"
            SELECT ticket_number FROM tickets
            WHERE UPPER(ticket_number) LIKE ANY($1)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        }
        IdentifierKind::Alert => {
            r#"
            SELECT alert_id FROM alerts
            WHERE UPPER(alert_id) LIKE ANY($1)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        }
    };

    sqlx::query_scalar::<_, String>(sql)
        .bind(identifier_patterns(kind))
        .fetch_optional(exec)
        .await
        .map_err(db_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_patterns_cover_legacy_prefixes() {
        assert_eq!(
            identifier_patterns(IdentifierKind::Ticket),
            vec!["TKT-%", "TICKET-%", "TK-%"]
        );
        assert_eq!(
            identifier_patterns(IdentifierKind::Alert),
            vec!["ALT-%", "ALERT-%", "ALR-%"]
        );
    }
}
