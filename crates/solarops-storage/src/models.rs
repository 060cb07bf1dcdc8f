// Database models (internal, converted into core domain types)

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use solarops_core::{
    Alert, AlertStatus, AutomationEvent, AutomationStage, FaultRecord, Panel, PanelStatus, RowKey,
    Technician, TechnicianStatus, Ticket, TicketPriority, TicketStatus,
};

// Row numbers and counters are INTEGER columns; negative values never pass the
// CHECK constraints, so clamping only guards against hand-edited data.
pub(crate) fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

pub(crate) fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

// ============================================
// Panels
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct PanelRow {
    pub id: Uuid,
    pub panel_id: String,
    pub zone: String,
    pub row_num: i32,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

impl From<PanelRow> for Panel {
    fn from(row: PanelRow) -> Self {
        Panel {
            id: row.id,
            panel_id: row.panel_id,
            zone: row.zone,
            row: to_u32(row.row_num),
            status: PanelStatus::from(row.status.as_str()),
            updated_at: row.updated_at,
        }
    }
}

// ============================================
// Technicians
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct TechnicianRow {
    pub id: Uuid,
    pub name: String,
    pub skills: Vec<String>,
    pub status: String,
    pub active_tickets: i32,
    pub resolved_tickets: i32,
    pub avg_resolution_time: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TechnicianRow> for Technician {
    fn from(row: TechnicianRow) -> Self {
        Technician {
            id: row.id,
            name: row.name,
            skills: row.skills,
            status: TechnicianStatus::from(row.status.as_str()),
            active_tickets: to_u32(row.active_tickets),
            resolved_tickets: to_u32(row.resolved_tickets),
            avg_resolution_time: row.avg_resolution_time,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================
// Faults
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct FaultRow {
    pub id: Uuid,
    pub zone: String,
    pub row_num: i32,
    pub panel_id: Option<String>,
    pub fault_type: String,
    pub severity: String,
    pub detected_at: DateTime<Utc>,
    pub confidence: Option<f64>,
    pub analysis_text: String,
    pub recommended_action: String,
    pub image_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FaultRow> for FaultRecord {
    fn from(row: FaultRow) -> Self {
        FaultRecord {
            id: row.id,
            location: RowKey::new(row.zone, to_u32(row.row_num)),
            panel_id: row.panel_id,
            fault_type: row.fault_type,
            severity: row.severity,
            detected_at: row.detected_at,
            confidence: row.confidence,
            analysis_text: row.analysis_text,
            recommended_action: row.recommended_action,
            image_refs: row.image_refs,
            created_at: row.created_at,
        }
    }
}

// ============================================
// Tickets
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct TicketRow {
    pub id: Uuid,
    pub ticket_number: String,
    pub fault_id: Uuid,
    pub zone: String,
    pub row_num: i32,
    pub status: String,
    pub priority: String,
    pub assigned_technician_id: Option<Uuid>,
    pub notes: Option<String>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            ticket_number: row.ticket_number,
            fault_id: row.fault_id,
            location: RowKey::new(row.zone, to_u32(row.row_num)),
            status: TicketStatus::from(row.status.as_str()),
            priority: TicketPriority::from(row.priority.as_str()),
            assigned_technician_id: row.assigned_technician_id,
            notes: row.notes,
            resolution_notes: row.resolution_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        }
    }
}

// ============================================
// Alerts
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub alert_id: String,
    pub zone: String,
    pub row_num: i32,
    pub status: String,
    pub message: String,
    pub dismissed: bool,
    pub ticket_id: Option<Uuid>,
    pub scan_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AlertRow> for Alert {
    fn from(row: AlertRow) -> Self {
        Alert {
            id: row.id,
            alert_id: row.alert_id,
            zone: row.zone,
            row: to_u32(row.row_num),
            status: AlertStatus::from(row.status.as_str()),
            message: row.message,
            dismissed: row.dismissed,
            ticket_id: row.ticket_id,
            scan_id: row.scan_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================
// Automation events
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct AutomationEventRow {
    pub id: Uuid,
    pub event_type: String,
    pub stage: String,
    pub incident_id: String,
    pub fault_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub payload: sqlx::types::JsonValue,
    pub created_at: DateTime<Utc>,
}

impl From<AutomationEventRow> for AutomationEvent {
    fn from(row: AutomationEventRow) -> Self {
        AutomationEvent {
            id: row.id,
            event_type: row.event_type,
            stage: AutomationStage::from(row.stage.as_str()),
            incident_id: row.incident_id,
            fault_id: row.fault_id,
            ticket_id: row.ticket_id,
            technician_id: row.technician_id,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}
