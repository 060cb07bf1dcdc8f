// Fault-to-Ticket Automation Engine
//
// Turns anomaly signals from a solar farm (camera scans, sensor readings,
// panel status transitions) into fault records, tickets, and technician
// assignments without duplicating tickets or double-booking technicians.
//
// Key design decisions:
// - Persistence, row resolution, and time are traits (AutomationStore,
//   StoreTransaction, LocationResolver, Clock) so the engine stays DB-agnostic
// - One workflow run is one StoreTransaction; failures leave no partial writes
// - Deduplication is scoped to the row, not the individual panel
// - Duplicates and "no technician available" are results, not errors
// - Resolved tickets are deleted after their workload has been reversed
// - Domain entity types live here for use by both API and storage

// Domain entity types
pub mod alert;
pub mod automation_event;
pub mod fault;
pub mod location;
pub mod technician;
pub mod ticket;

pub mod catalog;
pub mod config;
pub mod error;
pub mod traits;

// Engine components
pub mod alerts;
pub mod dedup;
pub mod identifiers;
pub mod lifecycle;
pub mod selector;
pub mod workflow;

// Runtime services
pub mod cache;
pub mod engine;
pub mod notify;
pub mod retry;
pub mod scheduler;

// In-memory implementations for dev mode and testing
pub mod memory;

// Re-exports for convenience
pub use alert::{Alert, AlertStatus};
pub use alerts::{AlertRowAggregator, AlertSyncReport, AlertUpsert, AlertUpsertRequest};
pub use automation_event::{AutomationEvent, AutomationStage};
pub use cache::RecentResults;
pub use config::{EngineConfig, WebhookConfig};
pub use dedup::{DeduplicationWindow, DuplicateMatch};
pub use engine::{AutomationEngine, IngestRecord, PanelStatusChange, PendingAnomaly};
pub use error::{AutomationError, Result, StoreError};
pub use fault::{AnomalyEvent, AnomalySource, DedupScope, FaultRecord, Severity};
pub use identifiers::{IdentifierGenerator, IdentifierKind};
pub use lifecycle::TicketLifecycle;
pub use location::{CreatePanel, Panel, PanelStatus, RowKey};
pub use memory::InMemoryAutomationStore;
pub use notify::{FaultNotification, FaultNotifier, NotificationOutcome, WebhookNotifier};
pub use retry::RetryPolicy;
pub use scheduler::DeferredScheduler;
pub use selector::{ScoredTechnician, TechnicianSelector};
pub use technician::{CreateTechnician, Technician, TechnicianStatus};
pub use ticket::{ResolvedTicket, Ticket, TicketPatch, TicketPriority, TicketStatus, TicketUpdate};
pub use traits::{
    AutomationStore, Clock, LocationResolver, ManualClock, RecentFaultQuery, StoreResult,
    StoreTransaction, SystemClock,
};
pub use workflow::{FaultTicketWorkflow, WorkflowResult};
