// Physical location types
//
// A row (zone + row number) is the unit of deduplication and alerting.
// Panels are the physical units that belong to a row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::{AutomationError, Result};

/// Location key: a row of panels within a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RowKey {
    pub zone: String,
    pub row: u32,
}

impl RowKey {
    pub fn new(zone: impl Into<String>, row: u32) -> Self {
        Self {
            zone: zone.into(),
            row,
        }
    }

    /// Reject keys that cannot name a physical row
    pub fn validate(&self) -> Result<()> {
        if self.zone.trim().is_empty() {
            return Err(AutomationError::validation("zone must not be empty"));
        }
        if self.row == 0 {
            return Err(AutomationError::validation("row numbers start at 1"));
        }
        Ok(())
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.zone, self.row)
    }
}

/// Live status of a single panel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PanelStatus {
    Healthy,
    Offline,
    Warning,
    Fault,
}

impl PanelStatus {
    /// Warning and fault are the statuses that warrant a row alert
    pub fn is_alerting(&self) -> bool {
        matches!(self, PanelStatus::Warning | PanelStatus::Fault)
    }
}

impl std::fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelStatus::Healthy => write!(f, "healthy"),
            PanelStatus::Offline => write!(f, "offline"),
            PanelStatus::Warning => write!(f, "warning"),
            PanelStatus::Fault => write!(f, "fault"),
        }
    }
}

impl From<&str> for PanelStatus {
    fn from(s: &str) -> Self {
        match s {
            "offline" => PanelStatus::Offline,
            "warning" => PanelStatus::Warning,
            "fault" => PanelStatus::Fault,
            _ => PanelStatus::Healthy,
        }
    }
}

/// A physical solar panel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Panel {
    pub id: Uuid,
    /// Human-facing panel identifier, e.g. "PNL-A0101"
    pub panel_id: String,
    pub zone: String,
    pub row: u32,
    pub status: PanelStatus,
    pub updated_at: DateTime<Utc>,
}

impl Panel {
    pub fn row_key(&self) -> RowKey {
        RowKey::new(self.zone.clone(), self.row)
    }
}

/// Input for registering a panel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CreatePanel {
    pub panel_id: String,
    pub zone: String,
    pub row: u32,
    #[serde(default = "default_panel_status")]
    pub status: PanelStatus,
}

fn default_panel_status() -> PanelStatus {
    PanelStatus::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_key_display() {
        assert_eq!(RowKey::new("A", 3).to_string(), "A-3");
    }

    #[test]
    fn test_row_key_validation() {
        assert!(RowKey::new("A", 3).validate().is_ok());
        assert!(matches!(
            RowKey::new("  ", 3).validate(),
            Err(AutomationError::Validation(_))
        ));
        assert!(matches!(
            RowKey::new("A", 0).validate(),
            Err(AutomationError::Validation(_))
        ));
    }

    #[test]
    fn test_panel_status_ordering_puts_fault_last() {
        let worst = [
            PanelStatus::Warning,
            PanelStatus::Healthy,
            PanelStatus::Fault,
            PanelStatus::Offline,
        ]
        .into_iter()
        .max();
        assert_eq!(worst, Some(PanelStatus::Fault));
        assert!(!PanelStatus::Offline.is_alerting());
    }
}
