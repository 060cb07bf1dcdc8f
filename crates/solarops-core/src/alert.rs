// Row alert domain types
//
// At most one non-dismissed alert exists per (zone, row).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::location::{PanelStatus, RowKey};

/// Alert status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Warning,
    Fault,
}

impl AlertStatus {
    /// Severity handed to the workflow when this status triggers it
    pub fn severity(&self) -> &'static str {
        match self {
            AlertStatus::Warning => "medium",
            AlertStatus::Fault => "high",
        }
    }

    /// Fault type recorded for alert-triggered faults
    pub fn fault_type(&self) -> &'static str {
        match self {
            AlertStatus::Warning => "row_warning",
            AlertStatus::Fault => "row_fault",
        }
    }

    pub fn from_panel_status(status: PanelStatus) -> Option<Self> {
        match status {
            PanelStatus::Warning => Some(AlertStatus::Warning),
            PanelStatus::Fault => Some(AlertStatus::Fault),
            PanelStatus::Healthy | PanelStatus::Offline => None,
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Warning => write!(f, "warning"),
            AlertStatus::Fault => write!(f, "fault"),
        }
    }
}

impl From<&str> for AlertStatus {
    fn from(s: &str) -> Self {
        match s {
            "fault" => AlertStatus::Fault,
            _ => AlertStatus::Warning,
        }
    }
}

/// Row-level alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Alert {
    pub id: Uuid,
    /// Display identifier, e.g. "ALT-007"
    pub alert_id: String,
    pub zone: String,
    pub row: u32,
    pub status: AlertStatus,
    pub message: String,
    pub dismissed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn row_key(&self) -> RowKey {
        RowKey::new(self.zone.clone(), self.row)
    }
}
