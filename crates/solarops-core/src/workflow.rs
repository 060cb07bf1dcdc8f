// Fault-to-ticket workflow
//
// detected -> (deduplicated | fault_created -> ticket_created ->
// (technician_assigned | technician_unavailable))
//
// The whole run shares one StoreTransaction. Any storage error drops the
// transaction, so nothing from a failed run is persisted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::automation_event::{AutomationStage, IncidentTrail};
use crate::catalog;
use crate::config::EngineConfig;
use crate::dedup::DeduplicationWindow;
use crate::error::{AutomationError, Result};
use crate::fault::{AnomalyEvent, FaultRecord};
use crate::location::RowKey;
use crate::identifiers::{IdentifierGenerator, IdentifierKind};
use crate::selector::TechnicianSelector;
use crate::ticket::{Ticket, TicketPriority, TicketStatus};
use crate::traits::{AutomationStore, Clock, StoreTransaction};

/// Outcome of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WorkflowResult {
    /// Incident this run recorded its events under
    pub incident_id: String,
    /// True when an existing ticket was reused and nothing was written
    pub deduplicated: bool,
    pub fault_id: Uuid,
    pub ticket_id: Uuid,
    pub ticket_number: String,
    /// None when no technician was available
    pub assigned_technician_id: Option<Uuid>,
}

impl WorkflowResult {
    pub fn is_assigned(&self) -> bool {
        self.assigned_technician_id.is_some()
    }
}

/// Records created by a non-deduplicated run, for post-commit consumers
#[derive(Debug, Clone)]
pub struct CreatedRecords {
    pub fault: FaultRecord,
    pub ticket: Ticket,
}

#[derive(Clone)]
pub struct FaultTicketWorkflow {
    store: Arc<dyn AutomationStore>,
    dedup: DeduplicationWindow,
    selector: TechnicianSelector,
    identifiers: IdentifierGenerator,
    clock: Arc<dyn Clock>,
    busy_threshold: u32,
    row_locking: bool,
}

impl FaultTicketWorkflow {
    pub fn new(
        store: Arc<dyn AutomationStore>,
        dedup: DeduplicationWindow,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            dedup,
            selector: TechnicianSelector::new(),
            identifiers: IdentifierGenerator::new(clock.clone())?,
            clock,
            busy_threshold: config.busy_threshold,
            row_locking: config.row_locking,
        })
    }

    pub(crate) fn identifiers(&self) -> &IdentifierGenerator {
        &self.identifiers
    }

    /// Run the workflow in its own transaction
    pub async fn create_fault_ticket_and_assign(
        &self,
        event: AnomalyEvent,
    ) -> Result<WorkflowResult> {
        let (result, _) = self.run(&event).await?;
        Ok(result)
    }

    /// Run in a new transaction, also returning the records it created
    pub(crate) async fn run(
        &self,
        event: &AnomalyEvent,
    ) -> Result<(WorkflowResult, Option<CreatedRecords>)> {
        event.validate()?;
        // Resolve before begin: a store-backed resolver needs its own connection
        let panels = self.resolve_row(&event.location).await;
        let mut tx = self.store.begin().await?;
        let outcome = self.run_in_tx(tx.as_mut(), event, &panels).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Panels in a row, as the dedup window sees them
    pub async fn resolve_row(&self, row: &RowKey) -> Vec<String> {
        self.dedup.resolve(row).await
    }

    /// Run inside a caller-owned transaction; the caller commits.
    ///
    /// `panels` is the event's row from [`resolve_row`](Self::resolve_row),
    /// looked up before the transaction was opened.
    pub async fn run_in(
        &self,
        tx: &mut dyn StoreTransaction,
        event: &AnomalyEvent,
        panels: &[String],
    ) -> Result<WorkflowResult> {
        event.validate()?;
        let (result, _) = self.run_in_tx(tx, event, panels).await?;
        Ok(result)
    }

    #[tracing::instrument(skip(self, tx, event), fields(row = %event.location, source = %event.source))]
    async fn run_in_tx(
        &self,
        tx: &mut dyn StoreTransaction,
        event: &AnomalyEvent,
        panels: &[String],
    ) -> Result<(WorkflowResult, Option<CreatedRecords>)> {
        let row = &event.location;
        let now = self.clock.now();
        let as_of = event.detected_at.unwrap_or(now);
        let fault_type = event.fault_type().to_string();

        let panel_id = match &event.panel_id {
            Some(panel_id) if !panels.is_empty() && !panels.contains(panel_id) => {
                return Err(AutomationError::validation(format!(
                    "panel {panel_id} is not in row {row}"
                )));
            }
            Some(panel_id) => Some(panel_id.clone()),
            None => panels.first().cloned(),
        };

        if self.row_locking {
            tx.lock_row(row).await?;
        }

        // 1. detected
        let incident_id = self.identifiers.next(tx, IdentifierKind::Incident).await;
        let mut trail = IncidentTrail::new(incident_id.clone(), event.source.as_str());
        tx.append_event(&trail.event(
            AutomationStage::Detected,
            None,
            json!({
                "zone": row.zone,
                "row": row.row,
                "panel_id": panel_id,
                "severity": event.severity,
                "fault_type": fault_type,
                "confidence": event.confidence,
                "image_refs": event.image_refs,
            }),
            now,
        ))
        .await?;

        // 2. dedup
        if let Some(duplicate) = self
            .dedup
            .find_among(tx, panels, event.dedup_fault_type(), as_of)
            .await?
        {
            if let Some(ticket) = duplicate.live_ticket() {
                trail.fault_id = Some(duplicate.fault.id);
                trail.ticket_id = Some(ticket.id);
                tx.append_event(&trail.event(
                    AutomationStage::Deduplicated,
                    ticket.assigned_technician_id,
                    json!({
                        "ticket_number": ticket.ticket_number,
                        "matched_fault_type": duplicate.fault.fault_type,
                        "matched_detected_at": duplicate.fault.detected_at,
                        "window_minutes": self.dedup.window().num_minutes(),
                    }),
                    now,
                ))
                .await?;

                info!(
                    incident_id = %incident_id,
                    ticket_id = %ticket.id,
                    "Anomaly deduplicated against open ticket"
                );
                return Ok((
                    WorkflowResult {
                        incident_id,
                        deduplicated: true,
                        fault_id: duplicate.fault.id,
                        ticket_id: ticket.id,
                        ticket_number: ticket.ticket_number.clone(),
                        assigned_technician_id: ticket.assigned_technician_id,
                    },
                    None,
                ));
            }
            debug!(fault_id = %duplicate.fault.id, "Recent fault has no open ticket");
        }

        // 3. fault_created
        let fault = FaultRecord {
            id: Uuid::now_v7(),
            location: row.clone(),
            panel_id,
            fault_type: fault_type.clone(),
            severity: event.severity.clone(),
            detected_at: as_of,
            confidence: event.confidence,
            analysis_text: event.analysis_text.clone().unwrap_or_else(|| {
                format!(
                    "{} detected in row {} with {} severity",
                    fault_type, row, event.severity
                )
            }),
            recommended_action: event
                .recommended_action
                .clone()
                .unwrap_or_else(|| catalog::recommended_action(&fault_type).to_string()),
            image_refs: event.image_refs.clone(),
            created_at: now,
        };
        tx.insert_fault(&fault).await?;
        trail.fault_id = Some(fault.id);
        tx.append_event(&trail.event(
            AutomationStage::FaultCreated,
            None,
            json!({
                "fault_type": fault.fault_type,
                "severity": fault.severity,
                "recommended_action": fault.recommended_action,
            }),
            now,
        ))
        .await?;

        // 4. ticket_created
        let ticket_number = self.identifiers.next(tx, IdentifierKind::Ticket).await;
        let mut ticket = Ticket {
            id: Uuid::now_v7(),
            ticket_number,
            fault_id: fault.id,
            location: row.clone(),
            status: TicketStatus::Open,
            priority: TicketPriority::from_severity(&event.severity),
            assigned_technician_id: None,
            notes: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        tx.insert_ticket(&ticket).await?;
        trail.ticket_id = Some(ticket.id);
        tx.append_event(&trail.event(
            AutomationStage::TicketCreated,
            None,
            json!({
                "ticket_number": ticket.ticket_number,
                "priority": ticket.priority,
            }),
            now,
        ))
        .await?;

        if let Some(status) = event.alert_status {
            if let Some(mut alert) = tx.find_open_alert(row).await? {
                if alert.status == status {
                    alert.ticket_id = Some(ticket.id);
                    alert.updated_at = now;
                    tx.update_alert(&alert).await?;
                }
            }
        }

        // 5/6. technician selection
        let pool = tx.list_technicians().await?;
        let assigned_technician_id = match self.selector.select(&pool, &fault_type) {
            None => {
                tx.append_event(&trail.event(
                    AutomationStage::TechnicianUnavailable,
                    None,
                    json!({ "candidates": pool.len() }),
                    now,
                ))
                .await?;
                info!(
                    incident_id = %incident_id,
                    ticket_number = %ticket.ticket_number,
                    "Ticket created, no technician available"
                );
                None
            }
            Some(selected) => {
                let mut technician = selected.technician;
                ticket.assigned_technician_id = Some(technician.id);
                ticket.updated_at = now;
                tx.update_ticket(&ticket).await?;

                let became_busy = technician.take_assignment(self.busy_threshold, now);
                tx.update_technician(&technician).await?;

                tx.append_event(&trail.event(
                    AutomationStage::TechnicianAssigned,
                    Some(technician.id),
                    json!({
                        "technician_name": technician.name,
                        "score": selected.score,
                        "active_tickets": technician.active_tickets,
                        "status": technician.status,
                        "became_busy": became_busy,
                    }),
                    now,
                ))
                .await?;
                info!(
                    incident_id = %incident_id,
                    ticket_number = %ticket.ticket_number,
                    technician_id = %technician.id,
                    score = selected.score,
                    "Ticket created and assigned"
                );
                Some(technician.id)
            }
        };

        Ok((
            WorkflowResult {
                incident_id,
                deduplicated: false,
                fault_id: fault.id,
                ticket_id: ticket.id,
                ticket_number: ticket.ticket_number.clone(),
                assigned_technician_id,
            },
            Some(CreatedRecords { fault, ticket }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::AnomalySource;
    use crate::location::{CreatePanel, PanelStatus, RowKey};
    use crate::memory::InMemoryAutomationStore;
    use crate::technician::{CreateTechnician, TechnicianStatus};
    use crate::traits::ManualClock;
    use chrono::Utc;

    struct Fixture {
        store: Arc<InMemoryAutomationStore>,
        clock: Arc<ManualClock>,
        workflow: FaultTicketWorkflow,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryAutomationStore::new());
        for panel in ["PNL-A0301", "PNL-A0302"] {
            store
                .create_panel(CreatePanel {
                    panel_id: panel.to_string(),
                    zone: "A".to_string(),
                    row: 3,
                    status: PanelStatus::Healthy,
                })
                .await
                .unwrap();
        }
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = EngineConfig::default();
        let dedup = DeduplicationWindow::new(config.dedup_window(), store.clone());
        let workflow =
            FaultTicketWorkflow::new(store.clone(), dedup, clock.clone(), &config).unwrap();
        Fixture {
            store,
            clock,
            workflow,
        }
    }

    fn dust_event() -> AnomalyEvent {
        AnomalyEvent::new(RowKey::new("A", 3), "high", AnomalySource::CameraScan)
            .with_fault_type("dust_accumulation")
    }

    #[tokio::test]
    async fn test_creates_ticket_without_technicians() {
        let f = fixture().await;
        let result = f
            .workflow
            .create_fault_ticket_and_assign(dust_event())
            .await
            .unwrap();

        assert!(!result.deduplicated);
        assert_eq!(result.assigned_technician_id, None);
        assert_eq!(result.ticket_number, "TKT-001");

        let ticket = f.store.get_ticket(result.ticket_id).await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.priority, TicketPriority::High);

        let fault = f.store.get_fault(result.fault_id).await.unwrap().unwrap();
        assert_eq!(fault.panel_id.as_deref(), Some("PNL-A0301"));
        assert_eq!(
            fault.recommended_action,
            catalog::recommended_action("dust accumulation")
        );

        let trail = f
            .store
            .list_incident_events(&result.incident_id)
            .await
            .unwrap();
        let stages: Vec<_> = trail.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                AutomationStage::Detected,
                AutomationStage::FaultCreated,
                AutomationStage::TicketCreated,
                AutomationStage::TechnicianUnavailable,
            ]
        );
    }

    #[tokio::test]
    async fn test_assigns_and_increments_workload() {
        let f = fixture().await;
        let tech = f
            .store
            .create_technician(CreateTechnician::new("Ana").with_active_tickets(3))
            .await
            .unwrap();

        let result = f
            .workflow
            .create_fault_ticket_and_assign(dust_event())
            .await
            .unwrap();
        assert_eq!(result.assigned_technician_id, Some(tech.id));

        let tech = f.store.get_technician(tech.id).await.unwrap().unwrap();
        assert_eq!(tech.active_tickets, 4);
        assert_eq!(tech.status, TechnicianStatus::Busy);
    }

    #[tokio::test]
    async fn test_duplicate_within_window_is_noop() {
        let f = fixture().await;
        let tech = f
            .store
            .create_technician(CreateTechnician::new("Ana"))
            .await
            .unwrap();

        let first = f
            .workflow
            .create_fault_ticket_and_assign(dust_event())
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::minutes(5));
        let second = f
            .workflow
            .create_fault_ticket_and_assign(dust_event().with_panel("PNL-A0302"))
            .await
            .unwrap();

        assert!(second.deduplicated);
        assert_eq!(second.ticket_id, first.ticket_id);
        assert_ne!(second.incident_id, first.incident_id);
        assert_eq!(f.store.list_tickets().await.unwrap().len(), 1);
        let tech = f.store.get_technician(tech.id).await.unwrap().unwrap();
        assert_eq!(tech.active_tickets, 1);
    }

    #[tokio::test]
    async fn test_outside_window_creates_new_ticket() {
        let f = fixture().await;
        let first = f
            .workflow
            .create_fault_ticket_and_assign(dust_event())
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::minutes(16));
        let second = f
            .workflow
            .create_fault_ticket_and_assign(dust_event())
            .await
            .unwrap();
        assert!(!second.deduplicated);
        assert_ne!(second.ticket_id, first.ticket_id);
        assert_eq!(second.ticket_number, "TKT-002");
    }

    #[tokio::test]
    async fn test_panel_outside_row_is_rejected() {
        let f = fixture().await;
        let err = f
            .workflow
            .create_fault_ticket_and_assign(dust_event().with_panel("PNL-B0101"))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Validation(_)));
        assert!(f.store.list_tickets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back_everything() {
        let f = fixture().await;
        f.store
            .create_technician(CreateTechnician::new("Ana"))
            .await
            .unwrap();
        f.store.fail_technician_updates(true);

        let err = f
            .workflow
            .create_fault_ticket_and_assign(dust_event())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Storage(_)));
        assert!(f.store.list_tickets().await.unwrap().is_empty());
        assert!(f
            .store
            .list_incident_events("INC-001")
            .await
            .unwrap()
            .is_empty());
    }

    /// Resolver that reads through the store, like a pool-backed one. It
    /// stalls if a transaction already holds the store.
    struct StoreBackedResolver {
        store: Arc<InMemoryAutomationStore>,
    }

    #[async_trait::async_trait]
    impl crate::traits::LocationResolver for StoreBackedResolver {
        async fn panels_in_row(&self, row: &RowKey) -> crate::traits::StoreResult<Vec<String>> {
            tokio::time::timeout(
                std::time::Duration::from_millis(200),
                self.store.list_tickets(),
            )
            .await
            .map_err(|_| crate::error::StoreError::database("resolver starved"))??;
            Ok(self
                .store
                .list_panels()
                .await?
                .into_iter()
                .filter(|p| p.row_key() == *row)
                .map(|p| p.panel_id)
                .collect())
        }
    }

    #[tokio::test]
    async fn test_row_is_resolved_before_transaction_opens() {
        let f = fixture().await;
        let resolver = Arc::new(StoreBackedResolver {
            store: f.store.clone(),
        });
        let config = EngineConfig::default();
        let dedup = DeduplicationWindow::new(config.dedup_window(), resolver);
        let workflow =
            FaultTicketWorkflow::new(f.store.clone(), dedup, f.clock.clone(), &config).unwrap();

        let first = workflow.create_fault_ticket_and_assign(dust_event()).await.unwrap();
        let second = workflow.create_fault_ticket_and_assign(dust_event()).await.unwrap();

        let fault = f.store.get_fault(first.fault_id).await.unwrap().unwrap();
        assert_eq!(fault.panel_id.as_deref(), Some("PNL-A0301"));
        assert!(second.deduplicated);
        assert_eq!(second.ticket_id, first.ticket_id);
    }
}
