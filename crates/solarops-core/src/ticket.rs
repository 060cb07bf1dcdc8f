// Ticket domain types
//
// Tickets represent open maintenance work. A ticket reaching resolved/closed
// is deleted after its technician's workload has been reversed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::fault::Severity;
use crate::location::RowKey;

/// Ticket status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Resolved and closed end a ticket's life
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Open => write!(f, "open"),
            TicketStatus::InProgress => write!(f, "in_progress"),
            TicketStatus::Resolved => write!(f, "resolved"),
            TicketStatus::Closed => write!(f, "closed"),
        }
    }
}

impl From<&str> for TicketStatus {
    fn from(s: &str) -> Self {
        match s {
            "in_progress" => TicketStatus::InProgress,
            "resolved" => TicketStatus::Resolved,
            "closed" => TicketStatus::Closed,
            _ => TicketStatus::Open,
        }
    }
}

/// Ticket priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    /// critical→critical, high→high, low→low, anything else→medium
    pub fn from_severity(severity: &str) -> Self {
        match Severity::parse(severity) {
            Some(Severity::Critical) => TicketPriority::Critical,
            Some(Severity::High) => TicketPriority::High,
            Some(Severity::Low) => TicketPriority::Low,
            _ => TicketPriority::Medium,
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketPriority::Low => write!(f, "low"),
            TicketPriority::Medium => write!(f, "medium"),
            TicketPriority::High => write!(f, "high"),
            TicketPriority::Critical => write!(f, "critical"),
        }
    }
}

impl From<&str> for TicketPriority {
    fn from(s: &str) -> Self {
        match s {
            "low" => TicketPriority::Low,
            "high" => TicketPriority::High,
            "critical" => TicketPriority::Critical,
            _ => TicketPriority::Medium,
        }
    }
}

/// Maintenance ticket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Ticket {
    pub id: Uuid,
    /// Display identifier, e.g. "TKT-042". Not a uniqueness guarantee.
    pub ticket_number: String,
    pub fault_id: Uuid,
    pub location: RowKey,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_technician_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Partial update for a ticket
///
/// `assigned_technician_id` uses a double option: `None` leaves the assignment
/// untouched, `Some(None)` clears it, `Some(Some(id))` reassigns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TicketPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Uuid>))]
    pub assigned_technician_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TicketPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

impl TicketPatch {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_technician_id.is_none()
            && self.priority.is_none()
            && self.notes.is_none()
            && self.resolution_notes.is_none()
    }
}

/// Distinguishes an explicit JSON `null` from an absent field
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Snapshot of a ticket at the moment it was resolved and deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ResolvedTicket {
    pub ticket: Ticket,
    /// Whether this call performed the workload reversal
    pub workload_reversed: bool,
}

/// Outcome of a ticket update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TicketUpdate {
    /// Ticket remains open; carries the updated record
    Updated { ticket: Ticket },
    /// Ticket reached resolved/closed and was deleted
    Resolved { resolved: ResolvedTicket },
}

impl TicketUpdate {
    pub fn is_resolved(&self) -> bool {
        matches!(self, TicketUpdate::Resolved { .. })
    }

    pub fn ticket(&self) -> &Ticket {
        match self {
            TicketUpdate::Updated { ticket } => ticket,
            TicketUpdate::Resolved { resolved } => &resolved.ticket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_severity() {
        assert_eq!(
            TicketPriority::from_severity("critical"),
            TicketPriority::Critical
        );
        assert_eq!(TicketPriority::from_severity("HIGH"), TicketPriority::High);
        assert_eq!(TicketPriority::from_severity("low"), TicketPriority::Low);
        assert_eq!(
            TicketPriority::from_severity("medium"),
            TicketPriority::Medium
        );
        assert_eq!(
            TicketPriority::from_severity("catastrophic"),
            TicketPriority::Medium
        );
        assert_eq!(TicketPriority::from_severity(""), TicketPriority::Medium);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TicketStatus::Open.is_terminal());
        assert!(!TicketStatus::InProgress.is_terminal());
        assert!(TicketStatus::Resolved.is_terminal());
        assert!(TicketStatus::Closed.is_terminal());
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: TicketPatch = serde_json::from_str(r#"{"notes": "checked"}"#).unwrap();
        assert_eq!(patch.assigned_technician_id, None);

        let patch: TicketPatch =
            serde_json::from_str(r#"{"assigned_technician_id": null}"#).unwrap();
        assert_eq!(patch.assigned_technician_id, Some(None));

        let id = Uuid::now_v7();
        let patch: TicketPatch =
            serde_json::from_str(&format!(r#"{{"assigned_technician_id": "{id}"}}"#)).unwrap();
        assert_eq!(patch.assigned_technician_id, Some(Some(id)));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert_eq!(TicketStatus::from(status.to_string().as_str()), status);
        }
    }
}
