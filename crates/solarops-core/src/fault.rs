// Fault domain types
//
// AnomalyEvent is the transient input produced by a source adapter.
// FaultRecord is the persisted root cause of exactly one ticket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::alert::AlertStatus;
use crate::error::{AutomationError, Result};
use crate::location::RowKey;

/// Fault severity as reported by anomaly sources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse; unknown values yield None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn as_upper(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Which adapter produced an anomaly
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AnomalySource {
    CameraScan,
    SensorReading,
    StatusTransition,
    RowAlert,
    Manual,
}

impl AnomalySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySource::CameraScan => "camera_scan",
            AnomalySource::SensorReading => "sensor_reading",
            AnomalySource::StatusTransition => "status_transition",
            AnomalySource::RowAlert => "row_alert",
            AnomalySource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for AnomalySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How broadly an anomaly is matched against recent faults in its row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// Any recent fault in the row counts as a duplicate
    AnyFault,
    /// Only a recent fault of the same type counts
    #[default]
    SameFaultType,
}

/// A raw anomaly signal, consumed once by the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AnomalyEvent {
    pub location: RowKey,
    /// Specific panel that reported the anomaly, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel_id: Option<String>,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_type_hint: Option<String>,
    /// Defaults to the engine clock when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub image_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
    pub source: AnomalySource,
    #[serde(default)]
    pub dedup_scope: DedupScope,
    /// Alert status that triggered this event; used to stamp the open alert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_status: Option<AlertStatus>,
}

impl AnomalyEvent {
    pub fn new(location: RowKey, severity: impl Into<String>, source: AnomalySource) -> Self {
        Self {
            location,
            panel_id: None,
            severity: severity.into(),
            fault_type_hint: None,
            detected_at: None,
            confidence: None,
            image_refs: Vec::new(),
            analysis_text: None,
            recommended_action: None,
            source,
            dedup_scope: DedupScope::default(),
            alert_status: None,
        }
    }

    pub fn with_fault_type(mut self, fault_type: impl Into<String>) -> Self {
        self.fault_type_hint = Some(fault_type.into());
        self
    }

    pub fn with_panel(mut self, panel_id: impl Into<String>) -> Self {
        self.panel_id = Some(panel_id.into());
        self
    }

    pub fn with_detected_at(mut self, detected_at: DateTime<Utc>) -> Self {
        self.detected_at = Some(detected_at);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_image_refs(mut self, image_refs: Vec<String>) -> Self {
        self.image_refs = image_refs;
        self
    }

    pub fn with_dedup_scope(mut self, scope: DedupScope) -> Self {
        self.dedup_scope = scope;
        self
    }

    pub fn with_alert_status(mut self, status: AlertStatus) -> Self {
        self.alert_status = Some(status);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.location.validate()?;
        if let Some(panel_id) = &self.panel_id {
            if panel_id.trim().is_empty() {
                return Err(AutomationError::validation("panel_id must not be empty"));
            }
        }
        if let Some(confidence) = self.confidence {
            if !confidence.is_finite() || confidence < 0.0 {
                return Err(AutomationError::validation(format!(
                    "confidence must be a non-negative number, got {confidence}"
                )));
            }
        }
        Ok(())
    }

    /// The fault type this event is filed under
    pub fn fault_type(&self) -> &str {
        self.fault_type_hint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_FAULT_TYPE)
    }

    /// Fault type filter applied by the dedup window, if any
    pub fn dedup_fault_type(&self) -> Option<&str> {
        match self.dedup_scope {
            DedupScope::AnyFault => None,
            DedupScope::SameFaultType => Some(self.fault_type()),
        }
    }
}

pub const UNKNOWN_FAULT_TYPE: &str = "unknown";

/// Persisted fault; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct FaultRecord {
    pub id: Uuid,
    pub location: RowKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_id: Option<String>,
    pub fault_type: String,
    pub severity: String,
    pub detected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub analysis_text: String,
    pub recommended_action: String,
    #[serde(default)]
    pub image_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fault types match case-insensitively, treating '_' '-' and ' ' alike
pub fn normalize_fault_type(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
