// Core traits for pluggable backends
//
// These traits keep the engine independent of the storage engine:
// - InMemoryAutomationStore for dev mode, examples, and tests
// - PostgresAutomationStore (solarops-storage) for production
//
// Every write the engine performs goes through a StoreTransaction, so a
// workflow run either commits as a whole or leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::alert::Alert;
use crate::automation_event::AutomationEvent;
use crate::error::StoreError;
use crate::fault::FaultRecord;
use crate::identifiers::IdentifierKind;
use crate::location::{CreatePanel, Panel, PanelStatus, RowKey};
use crate::technician::{CreateTechnician, Technician};
use crate::ticket::Ticket;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Query for the most recent fault among a set of panels
#[derive(Debug, Clone)]
pub struct RecentFaultQuery {
    pub panel_ids: Vec<String>,
    /// Normalized fault type; None matches any type
    pub fault_type: Option<String>,
    /// Inclusive lower bound on detected_at
    pub since: DateTime<Utc>,
}

// ============================================================================
// AutomationStore - entry point to persistence
// ============================================================================

/// Persistence for faults, tickets, technicians, alerts, panels, and the audit trail
#[async_trait]
pub trait AutomationStore: Send + Sync + 'static {
    /// Start an atomic unit of work
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    // Read-only queries for callers outside the engine

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>>;

    async fn list_tickets(&self) -> StoreResult<Vec<Ticket>>;

    async fn get_fault(&self, id: Uuid) -> StoreResult<Option<FaultRecord>>;

    async fn get_technician(&self, id: Uuid) -> StoreResult<Option<Technician>>;

    /// Technicians in stable registration order
    async fn list_technicians(&self) -> StoreResult<Vec<Technician>>;

    async fn list_alerts(&self, include_dismissed: bool) -> StoreResult<Vec<Alert>>;

    async fn list_panels(&self) -> StoreResult<Vec<Panel>>;

    /// Events for one incident, oldest first
    async fn list_incident_events(&self, incident_id: &str) -> StoreResult<Vec<AutomationEvent>>;

    // Registry writes (not part of the automation transaction)

    async fn create_technician(&self, input: CreateTechnician) -> StoreResult<Technician>;

    async fn create_panel(&self, input: CreatePanel) -> StoreResult<Panel>;

    /// Returns None if the panel does not exist
    async fn update_panel_status(
        &self,
        panel_id: &str,
        status: PanelStatus,
    ) -> StoreResult<Option<Panel>>;
}

// ============================================================================
// StoreTransaction - one atomic unit of work
// ============================================================================

/// Reads and writes inside one transaction
///
/// Dropping a transaction without calling `commit` rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Serialise concurrent transactions touching the same row until commit
    async fn lock_row(&mut self, row: &RowKey) -> StoreResult<()>;

    /// Most recently created display identifier of the given kind
    async fn latest_identifier(&mut self, kind: IdentifierKind) -> StoreResult<Option<String>>;

    async fn find_recent_fault(&mut self, query: &RecentFaultQuery)
        -> StoreResult<Option<FaultRecord>>;

    async fn latest_ticket_for_fault(&mut self, fault_id: Uuid) -> StoreResult<Option<Ticket>>;

    async fn insert_fault(&mut self, fault: &FaultRecord) -> StoreResult<()>;

    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()>;

    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>>;

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()>;

    /// Returns false if the ticket did not exist
    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<bool>;

    /// Technicians in stable registration order
    async fn list_technicians(&mut self) -> StoreResult<Vec<Technician>>;

    async fn get_technician(&mut self, id: Uuid) -> StoreResult<Option<Technician>>;

    async fn update_technician(&mut self, technician: &Technician) -> StoreResult<()>;

    /// The single non-dismissed alert for a row, if any
    async fn find_open_alert(&mut self, row: &RowKey) -> StoreResult<Option<Alert>>;

    async fn get_alert(&mut self, id: Uuid) -> StoreResult<Option<Alert>>;

    async fn insert_alert(&mut self, alert: &Alert) -> StoreResult<()>;

    async fn update_alert(&mut self, alert: &Alert) -> StoreResult<()>;

    async fn append_event(&mut self, event: &AutomationEvent) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

// ============================================================================
// LocationResolver - row to physical units
// ============================================================================

/// Resolves a row to the panels it contains
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn panels_in_row(&self, row: &RowKey) -> StoreResult<Vec<String>>;
}

// ============================================================================
// Clock - injected time source
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
