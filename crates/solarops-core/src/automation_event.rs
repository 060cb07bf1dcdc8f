// Automation audit trail
//
// Append-only. Every workflow stage transition records exactly one event,
// grouped by the incident id assigned at detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Workflow stage recorded by an automation event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AutomationStage {
    Detected,
    Deduplicated,
    FaultCreated,
    TicketCreated,
    TechnicianAssigned,
    TechnicianUnavailable,
}

impl AutomationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationStage::Detected => "detected",
            AutomationStage::Deduplicated => "deduplicated",
            AutomationStage::FaultCreated => "fault_created",
            AutomationStage::TicketCreated => "ticket_created",
            AutomationStage::TechnicianAssigned => "technician_assigned",
            AutomationStage::TechnicianUnavailable => "technician_unavailable",
        }
    }

    /// Stages after which an incident produces no further events
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            AutomationStage::Deduplicated
                | AutomationStage::TechnicianAssigned
                | AutomationStage::TechnicianUnavailable
        )
    }
}

impl std::fmt::Display for AutomationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AutomationStage {
    fn from(s: &str) -> Self {
        match s {
            "deduplicated" => AutomationStage::Deduplicated,
            "fault_created" => AutomationStage::FaultCreated,
            "ticket_created" => AutomationStage::TicketCreated,
            "technician_assigned" => AutomationStage::TechnicianAssigned,
            "technician_unavailable" => AutomationStage::TechnicianUnavailable,
            _ => AutomationStage::Detected,
        }
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AutomationEvent {
    pub id: Uuid,
    /// Anomaly source that started the incident, e.g. "camera_scan"
    pub event_type: String,
    pub stage: AutomationStage,
    pub incident_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Builder used by the workflow to stamp events for one incident
#[derive(Debug, Clone)]
pub(crate) struct IncidentTrail {
    pub incident_id: String,
    pub event_type: String,
    pub fault_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
}

impl IncidentTrail {
    pub fn new(incident_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            incident_id: incident_id.into(),
            event_type: event_type.into(),
            fault_id: None,
            ticket_id: None,
        }
    }

    pub fn event(
        &self,
        stage: AutomationStage,
        technician_id: Option<Uuid>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> AutomationEvent {
        AutomationEvent {
            id: Uuid::now_v7(),
            event_type: self.event_type.clone(),
            stage,
            incident_id: self.incident_id.clone(),
            fault_id: self.fault_id,
            ticket_id: self.ticket_id,
            technician_id,
            payload,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trail_carries_ids_forward() {
        let mut trail = IncidentTrail::new("INC-001", "camera_scan");
        let detected = trail.event(AutomationStage::Detected, None, json!({}), Utc::now());
        assert_eq!(detected.fault_id, None);

        let fault_id = Uuid::now_v7();
        trail.fault_id = Some(fault_id);
        let created = trail.event(AutomationStage::FaultCreated, None, json!({}), Utc::now());
        assert_eq!(created.fault_id, Some(fault_id));
        assert_eq!(created.incident_id, "INC-001");
        assert_eq!(created.event_type, "camera_scan");
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&AutomationStage::TechnicianUnavailable).unwrap();
        assert_eq!(json, "\"technician_unavailable\"");
        assert!(AutomationStage::Deduplicated.is_final());
        assert!(!AutomationStage::TicketCreated.is_final());
    }
}
