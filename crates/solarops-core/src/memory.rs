// In-memory automation store
//
// Backs dev mode and tests. A transaction holds the state mutex for its whole
// lifetime and works on a copy that replaces the shared state on commit, so
// transactions are fully serialised and a dropped transaction leaves no trace.
//
// Panels live outside the transactional state: the location resolver is
// consulted while a transaction is open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::alert::Alert;
use crate::automation_event::AutomationEvent;
use crate::error::StoreError;
use crate::fault::{normalize_fault_type, FaultRecord};
use crate::identifiers::IdentifierKind;
use crate::location::{CreatePanel, Panel, PanelStatus, RowKey};
use crate::technician::{CreateTechnician, Technician};
use crate::ticket::Ticket;
use crate::traits::{
    AutomationStore, LocationResolver, RecentFaultQuery, StoreResult, StoreTransaction,
};

#[derive(Debug, Default, Clone)]
struct State {
    faults: Vec<FaultRecord>,
    tickets: Vec<Ticket>,
    technicians: Vec<Technician>,
    alerts: Vec<Alert>,
    events: Vec<AutomationEvent>,
}

/// Injected failures for exercising rollback paths
#[derive(Debug, Default)]
struct FailPoints {
    identifier_lookups: AtomicBool,
    technician_updates: AtomicBool,
}

/// In-memory implementation of [`AutomationStore`] and [`LocationResolver`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryAutomationStore {
    state: Arc<Mutex<State>>,
    panels: Arc<RwLock<Vec<Panel>>>,
    fail: Arc<FailPoints>,
}

impl InMemoryAutomationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `latest_identifier` fail inside transactions
    pub fn fail_identifier_lookups(&self, fail: bool) {
        self.fail.identifier_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make `update_technician` fail inside transactions
    pub fn fail_technician_updates(&self, fail: bool) {
        self.fail.technician_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of automation events across all incidents
    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }
}

#[async_trait]
impl AutomationStore for InMemoryAutomationStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            fail: self.fail.clone(),
        }))
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        let state = self.state.lock().await;
        Ok(state.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tickets(&self) -> StoreResult<Vec<Ticket>> {
        Ok(self.state.lock().await.tickets.clone())
    }

    async fn get_fault(&self, id: Uuid) -> StoreResult<Option<FaultRecord>> {
        let state = self.state.lock().await;
        Ok(state.faults.iter().find(|f| f.id == id).cloned())
    }

    async fn get_technician(&self, id: Uuid) -> StoreResult<Option<Technician>> {
        let state = self.state.lock().await;
        Ok(state.technicians.iter().find(|t| t.id == id).cloned())
    }

    async fn list_technicians(&self) -> StoreResult<Vec<Technician>> {
        Ok(self.state.lock().await.technicians.clone())
    }

    async fn list_alerts(&self, include_dismissed: bool) -> StoreResult<Vec<Alert>> {
        let state = self.state.lock().await;
        Ok(state
            .alerts
            .iter()
            .filter(|a| include_dismissed || !a.dismissed)
            .cloned()
            .collect())
    }

    async fn list_panels(&self) -> StoreResult<Vec<Panel>> {
        Ok(self.panels.read().clone())
    }

    async fn list_incident_events(&self, incident_id: &str) -> StoreResult<Vec<AutomationEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.incident_id == incident_id)
            .cloned()
            .collect())
    }

    async fn create_technician(&self, input: CreateTechnician) -> StoreResult<Technician> {
        let now = Utc::now();
        let technician = Technician {
            id: Uuid::now_v7(),
            name: input.name,
            skills: input.skills,
            status: input.status,
            active_tickets: input.active_tickets,
            resolved_tickets: input.resolved_tickets,
            avg_resolution_time: input.avg_resolution_time,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .technicians
            .push(technician.clone());
        Ok(technician)
    }

    async fn create_panel(&self, input: CreatePanel) -> StoreResult<Panel> {
        let mut panels = self.panels.write();
        if panels.iter().any(|p| p.panel_id == input.panel_id) {
            return Err(StoreError::Conflict(format!(
                "panel {} already exists",
                input.panel_id
            )));
        }
        let panel = Panel {
            id: Uuid::now_v7(),
            panel_id: input.panel_id,
            zone: input.zone,
            row: input.row,
            status: input.status,
            updated_at: Utc::now(),
        };
        panels.push(panel.clone());
        Ok(panel)
    }

    async fn update_panel_status(
        &self,
        panel_id: &str,
        status: PanelStatus,
    ) -> StoreResult<Option<Panel>> {
        let mut panels = self.panels.write();
        Ok(panels
            .iter_mut()
            .find(|p| p.panel_id == panel_id)
            .map(|panel| {
                panel.status = status;
                panel.updated_at = Utc::now();
                panel.clone()
            }))
    }
}

#[async_trait]
impl LocationResolver for InMemoryAutomationStore {
    async fn panels_in_row(&self, row: &RowKey) -> StoreResult<Vec<String>> {
        Ok(self
            .panels
            .read()
            .iter()
            .filter(|p| p.zone == row.zone && p.row == row.row)
            .map(|p| p.panel_id.clone())
            .collect())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
    fail: Arc<FailPoints>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_row(&mut self, _row: &RowKey) -> StoreResult<()> {
        // The state mutex already serialises whole transactions
        Ok(())
    }

    async fn latest_identifier(&mut self, kind: IdentifierKind) -> StoreResult<Option<String>> {
        if self.fail.identifier_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::database("identifier lookup failed (injected)"));
        }
        let s = &self.working;
        let latest = match kind {
            IdentifierKind::Incident => s
                .events
                .iter()
                .rev()
                .map(|e| &e.incident_id)
                .find(|id| kind.matches(id)),
            IdentifierKind::Ticket => s
                .tickets
                .iter()
                .rev()
                .map(|t| &t.ticket_number)
                .find(|id| kind.matches(id)),
            IdentifierKind::Alert => s
                .alerts
                .iter()
                .rev()
                .map(|a| &a.alert_id)
                .find(|id| kind.matches(id)),
        };
        Ok(latest.cloned())
    }

    async fn find_recent_fault(
        &mut self,
        query: &RecentFaultQuery,
    ) -> StoreResult<Option<FaultRecord>> {
        Ok(self
            .working
            .faults
            .iter()
            .filter(|f| {
                f.panel_id
                    .as_ref()
                    .is_some_and(|p| query.panel_ids.contains(p))
            })
            .filter(|f| f.detected_at >= query.since)
            .filter(|f| {
                query
                    .fault_type
                    .as_deref()
                    .map_or(true, |t| normalize_fault_type(&f.fault_type) == t)
            })
            .max_by_key(|f| f.detected_at)
            .cloned())
    }

    async fn latest_ticket_for_fault(&mut self, fault_id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self
            .working
            .tickets
            .iter()
            .filter(|t| t.fault_id == fault_id)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn insert_fault(&mut self, fault: &FaultRecord) -> StoreResult<()> {
        self.working.faults.push(fault.clone());
        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        self.working.tickets.push(ticket.clone());
        Ok(())
    }

    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.working.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        let slot = self
            .working
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "ticket",
                id: ticket.id.to_string(),
            })?;
        *slot = ticket.clone();
        Ok(())
    }

    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<bool> {
        let before = self.working.tickets.len();
        self.working.tickets.retain(|t| t.id != id);
        Ok(self.working.tickets.len() != before)
    }

    async fn list_technicians(&mut self) -> StoreResult<Vec<Technician>> {
        Ok(self.working.technicians.clone())
    }

    async fn get_technician(&mut self, id: Uuid) -> StoreResult<Option<Technician>> {
        Ok(self.working.technicians.iter().find(|t| t.id == id).cloned())
    }

    async fn update_technician(&mut self, technician: &Technician) -> StoreResult<()> {
        if self.fail.technician_updates.load(Ordering::SeqCst) {
            return Err(StoreError::database("technician update failed (injected)"));
        }
        let slot = self
            .working
            .technicians
            .iter_mut()
            .find(|t| t.id == technician.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "technician",
                id: technician.id.to_string(),
            })?;
        *slot = technician.clone();
        Ok(())
    }

    async fn find_open_alert(&mut self, row: &RowKey) -> StoreResult<Option<Alert>> {
        Ok(self
            .working
            .alerts
            .iter()
            .find(|a| !a.dismissed && a.zone == row.zone && a.row == row.row)
            .cloned())
    }

    async fn get_alert(&mut self, id: Uuid) -> StoreResult<Option<Alert>> {
        Ok(self.working.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn insert_alert(&mut self, alert: &Alert) -> StoreResult<()> {
        if !alert.dismissed && self.open_alert_conflicts(alert) {
            return Err(StoreError::Conflict(format!(
                "row {} already has an open alert",
                alert.row_key()
            )));
        }
        self.working.alerts.push(alert.clone());
        Ok(())
    }

    async fn update_alert(&mut self, alert: &Alert) -> StoreResult<()> {
        if !alert.dismissed && self.open_alert_conflicts(alert) {
            return Err(StoreError::Conflict(format!(
                "row {} already has an open alert",
                alert.row_key()
            )));
        }
        let slot = self
            .working
            .alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "alert",
                id: alert.id.to_string(),
            })?;
        *slot = alert.clone();
        Ok(())
    }

    async fn append_event(&mut self, event: &AutomationEvent) -> StoreResult<()> {
        self.working.events.push(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

impl InMemoryTransaction {
    /// Another non-dismissed alert already covers this alert's row
    fn open_alert_conflicts(&self, alert: &Alert) -> bool {
        self.working
            .alerts
            .iter()
            .any(|a| a.id != alert.id && !a.dismissed && a.zone == alert.zone && a.row == alert.row)
    }
}
