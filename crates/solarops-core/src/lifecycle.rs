// Ticket lifecycle and workload reversal
//
// Moving a ticket into resolved/closed from an open status reverses the
// assignee's workload exactly once, then deletes the ticket.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AutomationError, Result};
use crate::technician::Technician;
use crate::ticket::{ResolvedTicket, Ticket, TicketPatch, TicketStatus, TicketUpdate};
use crate::traits::{AutomationStore, Clock, StoreTransaction};

#[derive(Clone)]
pub struct TicketLifecycle {
    store: Arc<dyn AutomationStore>,
    clock: Arc<dyn Clock>,
    busy_threshold: u32,
}

impl TicketLifecycle {
    pub fn new(store: Arc<dyn AutomationStore>, clock: Arc<dyn Clock>, busy_threshold: u32) -> Self {
        Self {
            store,
            clock,
            busy_threshold,
        }
    }

    /// Apply a patch; a terminal status resolves and deletes the ticket
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_ticket(&self, id: Uuid, patch: TicketPatch) -> Result<TicketUpdate> {
        if patch.is_empty() {
            return Err(AutomationError::validation(
                "ticket patch must change at least one field",
            ));
        }

        let mut tx = self.store.begin().await?;
        let ticket = tx
            .get_ticket(id)
            .await?
            .ok_or_else(|| AutomationError::not_found("ticket", id))?;
        let update = self.apply(tx.as_mut(), ticket, patch).await?;
        tx.commit().await?;
        Ok(update)
    }

    /// Resolve a ticket, recording optional resolution notes
    pub async fn resolve_ticket(
        &self,
        id: Uuid,
        resolution_notes: Option<String>,
    ) -> Result<ResolvedTicket> {
        let patch = TicketPatch {
            status: Some(TicketStatus::Resolved),
            resolution_notes,
            ..Default::default()
        };
        match self.update_ticket(id, patch).await? {
            TicketUpdate::Resolved { resolved } => Ok(resolved),
            TicketUpdate::Updated { ticket } => Err(AutomationError::validation(format!(
                "ticket {} did not resolve",
                ticket.id
            ))),
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        mut ticket: Ticket,
        patch: TicketPatch,
    ) -> Result<TicketUpdate> {
        let now = self.clock.now();
        let was_terminal = ticket.status.is_terminal();

        if let Some(new_assignee) = patch.assigned_technician_id {
            if new_assignee != ticket.assigned_technician_id {
                self.reassign(tx, &mut ticket, new_assignee, was_terminal)
                    .await?;
            }
        }
        if let Some(priority) = patch.priority {
            ticket.priority = priority;
        }
        if let Some(notes) = patch.notes {
            ticket.notes = Some(notes);
        }
        if let Some(resolution_notes) = patch.resolution_notes {
            ticket.resolution_notes = Some(resolution_notes);
        }
        ticket.updated_at = now;

        let Some(status) = patch.status.filter(TicketStatus::is_terminal) else {
            if let Some(status) = patch.status {
                ticket.status = status;
            }
            tx.update_ticket(&ticket).await?;
            return Ok(TicketUpdate::Updated { ticket });
        };

        // Reversal is keyed on the status read inside this transaction
        let mut workload_reversed = false;
        if !was_terminal {
            if let Some(technician_id) = ticket.assigned_technician_id {
                match tx.get_technician(technician_id).await? {
                    Some(mut technician) => {
                        let hours = (now - ticket.created_at).num_seconds() as f64 / 3600.0;
                        technician.complete_assignment(hours, self.busy_threshold, now);
                        tx.update_technician(&technician).await?;
                        workload_reversed = true;
                    }
                    None => warn!(
                        ticket_id = %ticket.id,
                        technician_id = %technician_id,
                        "Assigned technician no longer exists, skipping workload reversal"
                    ),
                }
            }
        }

        ticket.status = status;
        ticket.resolved_at = Some(now);
        tx.update_ticket(&ticket).await?;
        tx.delete_ticket(ticket.id).await?;

        info!(
            ticket_id = %ticket.id,
            ticket_number = %ticket.ticket_number,
            status = %status,
            workload_reversed,
            "Ticket resolved and removed"
        );
        Ok(TicketUpdate::Resolved {
            resolved: ResolvedTicket {
                ticket,
                workload_reversed,
            },
        })
    }

    /// Move the workload counter from the previous assignee to the new one
    async fn reassign(
        &self,
        tx: &mut dyn StoreTransaction,
        ticket: &mut Ticket,
        new_assignee: Option<Uuid>,
        was_terminal: bool,
    ) -> Result<()> {
        let now = self.clock.now();

        let incoming: Option<Technician> = match new_assignee {
            Some(id) => Some(
                tx.get_technician(id)
                    .await?
                    .ok_or_else(|| AutomationError::not_found("technician", id))?,
            ),
            None => None,
        };

        if !was_terminal {
            if let Some(previous_id) = ticket.assigned_technician_id {
                if let Some(mut previous) = tx.get_technician(previous_id).await? {
                    previous.release_assignment(self.busy_threshold, now);
                    tx.update_technician(&previous).await?;
                }
            }
            if let Some(mut technician) = incoming {
                technician.take_assignment(self.busy_threshold, now);
                tx.update_technician(&technician).await?;
            }
        }

        info!(
            ticket_id = %ticket.id,
            from = ?ticket.assigned_technician_id,
            to = ?new_assignee,
            "Ticket reassigned"
        );
        ticket.assigned_technician_id = new_assignee;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::RowKey;
    use crate::memory::InMemoryAutomationStore;
    use crate::technician::{CreateTechnician, TechnicianStatus};
    use crate::ticket::TicketPriority;
    use crate::traits::ManualClock;
    use chrono::Utc;

    struct Fixture {
        store: Arc<InMemoryAutomationStore>,
        clock: Arc<ManualClock>,
        lifecycle: TicketLifecycle,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryAutomationStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let lifecycle = TicketLifecycle::new(store.clone(), clock.clone(), 4);
        Fixture {
            store,
            clock,
            lifecycle,
        }
    }

    async fn seed_ticket(f: &Fixture, technician: Option<Uuid>) -> Ticket {
        let now = f.clock.now();
        let ticket = Ticket {
            id: Uuid::now_v7(),
            ticket_number: "TKT-001".to_string(),
            fault_id: Uuid::now_v7(),
            location: RowKey::new("A", 3),
            status: TicketStatus::Open,
            priority: TicketPriority::High,
            assigned_technician_id: technician,
            notes: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        let mut tx = f.store.begin().await.unwrap();
        tx.insert_ticket(&ticket).await.unwrap();
        tx.commit().await.unwrap();
        ticket
    }

    #[tokio::test]
    async fn test_resolve_reverses_workload_once() {
        let f = fixture();
        let tech = f
            .store
            .create_technician(CreateTechnician::new("Ana").with_active_tickets(2))
            .await
            .unwrap();
        let ticket = seed_ticket(&f, Some(tech.id)).await;
        f.clock.advance(chrono::Duration::hours(2));

        let resolved = f
            .lifecycle
            .resolve_ticket(ticket.id, Some("cleaned".to_string()))
            .await
            .unwrap();
        assert!(resolved.workload_reversed);
        assert_eq!(resolved.ticket.status, TicketStatus::Resolved);
        assert_eq!(resolved.ticket.resolution_notes.as_deref(), Some("cleaned"));

        let tech = f.store.get_technician(tech.id).await.unwrap().unwrap();
        assert_eq!(tech.active_tickets, 1);
        assert_eq!(tech.resolved_tickets, 1);
        assert!((tech.avg_resolution_time - 2.0).abs() < 1e-9);
        assert!(f.store.get_ticket(ticket.id).await.unwrap().is_none());

        let err = f.lifecycle.resolve_ticket(ticket.id, None).await.unwrap_err();
        assert!(matches!(err, AutomationError::NotFound { .. }));
        let tech = f.store.get_technician(tech.id).await.unwrap().unwrap();
        assert_eq!(tech.active_tickets, 1);
        assert_eq!(tech.resolved_tickets, 1);
    }

    #[tokio::test]
    async fn test_terminal_ticket_is_not_reversed_again() {
        let f = fixture();
        let tech = f
            .store
            .create_technician(CreateTechnician::new("Ana").with_active_tickets(1))
            .await
            .unwrap();
        let mut ticket = seed_ticket(&f, Some(tech.id)).await;
        ticket.status = TicketStatus::Resolved;
        let mut tx = f.store.begin().await.unwrap();
        tx.update_ticket(&ticket).await.unwrap();
        tx.commit().await.unwrap();

        let update = f
            .lifecycle
            .update_ticket(ticket.id, TicketPatch::status(TicketStatus::Closed))
            .await
            .unwrap();
        let TicketUpdate::Resolved { resolved } = update else {
            panic!("expected resolved outcome");
        };
        assert!(!resolved.workload_reversed);
        let tech = f.store.get_technician(tech.id).await.unwrap().unwrap();
        assert_eq!(tech.active_tickets, 1);
        assert_eq!(tech.resolved_tickets, 0);
    }

    #[tokio::test]
    async fn test_non_status_patch_keeps_ticket() {
        let f = fixture();
        let tech = f
            .store
            .create_technician(CreateTechnician::new("Ana").with_active_tickets(1))
            .await
            .unwrap();
        let ticket = seed_ticket(&f, Some(tech.id)).await;

        let patch = TicketPatch {
            status: Some(TicketStatus::InProgress),
            notes: Some("on site".to_string()),
            ..Default::default()
        };
        let update = f.lifecycle.update_ticket(ticket.id, patch).await.unwrap();
        assert!(!update.is_resolved());
        assert_eq!(update.ticket().status, TicketStatus::InProgress);
        assert_eq!(update.ticket().notes.as_deref(), Some("on site"));

        let tech = f.store.get_technician(tech.id).await.unwrap().unwrap();
        assert_eq!(tech.active_tickets, 1);
        assert!(f.store.get_ticket(ticket.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reassignment_moves_counter() {
        let f = fixture();
        let ana = f
            .store
            .create_technician(
                CreateTechnician::new("Ana")
                    .with_active_tickets(4)
                    .with_status(TechnicianStatus::Busy),
            )
            .await
            .unwrap();
        let ben = f
            .store
            .create_technician(CreateTechnician::new("Ben"))
            .await
            .unwrap();
        let ticket = seed_ticket(&f, Some(ana.id)).await;

        let patch = TicketPatch {
            assigned_technician_id: Some(Some(ben.id)),
            ..Default::default()
        };
        let update = f.lifecycle.update_ticket(ticket.id, patch).await.unwrap();
        assert_eq!(update.ticket().assigned_technician_id, Some(ben.id));

        let ana = f.store.get_technician(ana.id).await.unwrap().unwrap();
        let ben = f.store.get_technician(ben.id).await.unwrap().unwrap();
        assert_eq!(ana.active_tickets, 3);
        assert_eq!(ana.status, TechnicianStatus::Available);
        assert_eq!(ben.active_tickets, 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_and_empty_patch() {
        let f = fixture();
        let err = f
            .lifecycle
            .update_ticket(Uuid::now_v7(), TicketPatch::status(TicketStatus::Resolved))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::NotFound { entity: "ticket", .. }));

        let ticket = seed_ticket(&f, None).await;
        let err = f
            .lifecycle
            .update_ticket(ticket.id, TicketPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Validation(_)));

        let patch = TicketPatch {
            assigned_technician_id: Some(Some(Uuid::now_v7())),
            ..Default::default()
        };
        let err = f.lifecycle.update_ticket(ticket.id, patch).await.unwrap_err();
        assert!(matches!(err, AutomationError::NotFound { entity: "technician", .. }));
    }
}
