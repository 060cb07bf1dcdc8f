// Technician domain types
//
// Technicians are shared, long-lived resources. Tickets reference them;
// the workflow and ticket lifecycle are the only writers of the workload counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Technician availability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TechnicianStatus {
    Available,
    Busy,
    Offline,
}

impl std::fmt::Display for TechnicianStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TechnicianStatus::Available => write!(f, "available"),
            TechnicianStatus::Busy => write!(f, "busy"),
            TechnicianStatus::Offline => write!(f, "offline"),
        }
    }
}

impl From<&str> for TechnicianStatus {
    fn from(s: &str) -> Self {
        match s {
            "busy" => TechnicianStatus::Busy,
            "offline" => TechnicianStatus::Offline,
            _ => TechnicianStatus::Available,
        }
    }
}

/// Field technician
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Technician {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub status: TechnicianStatus,
    pub active_tickets: u32,
    pub resolved_tickets: u32,
    /// Mean hours from ticket creation to resolution
    pub avg_resolution_time: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Technician {
    /// Record a newly assigned ticket. Returns true when the status flipped to busy.
    pub fn take_assignment(&mut self, busy_threshold: u32, now: DateTime<Utc>) -> bool {
        self.active_tickets += 1;
        self.updated_at = now;
        if self.status == TechnicianStatus::Available && self.active_tickets >= busy_threshold {
            self.status = TechnicianStatus::Busy;
            return true;
        }
        false
    }

    /// Release an assignment without counting it as resolved (reassignment)
    pub fn release_assignment(&mut self, busy_threshold: u32, now: DateTime<Utc>) {
        self.active_tickets = self.active_tickets.saturating_sub(1);
        self.updated_at = now;
        self.relax_status(busy_threshold);
    }

    /// Record a resolved ticket that took `hours` from creation to resolution
    pub fn complete_assignment(&mut self, hours: f64, busy_threshold: u32, now: DateTime<Utc>) {
        let completed = f64::from(self.resolved_tickets);
        self.avg_resolution_time =
            (self.avg_resolution_time * completed + hours.max(0.0)) / (completed + 1.0);
        self.resolved_tickets += 1;
        self.active_tickets = self.active_tickets.saturating_sub(1);
        self.updated_at = now;
        self.relax_status(busy_threshold);
    }

    fn relax_status(&mut self, busy_threshold: u32) {
        if self.status == TechnicianStatus::Busy && self.active_tickets < busy_threshold {
            self.status = TechnicianStatus::Available;
        }
    }
}

/// Input for registering a technician
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CreateTechnician {
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_technician_status")]
    pub status: TechnicianStatus,
    #[serde(default)]
    pub active_tickets: u32,
    #[serde(default)]
    pub resolved_tickets: u32,
    #[serde(default)]
    pub avg_resolution_time: f64,
}

fn default_technician_status() -> TechnicianStatus {
    TechnicianStatus::Available
}

impl CreateTechnician {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skills: Vec::new(),
            status: TechnicianStatus::Available,
            active_tickets: 0,
            resolved_tickets: 0,
            avg_resolution_time: 0.0,
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: TechnicianStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_active_tickets(mut self, active_tickets: u32) -> Self {
        self.active_tickets = active_tickets;
        self
    }

    pub fn with_avg_resolution_time(mut self, hours: f64) -> Self {
        self.avg_resolution_time = hours;
        self
    }
}
