// Alert row aggregator
//
// Collapses panel-level status into one open alert per (zone, row).
// A new alert, or an escalation from warning to fault, runs the fault-ticket
// workflow in the same transaction as the alert write.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::alert::{Alert, AlertStatus};
use crate::error::{AutomationError, Result};
use crate::fault::{AnomalyEvent, AnomalySource, DedupScope};
use crate::identifiers::{IdentifierGenerator, IdentifierKind};
use crate::location::{Panel, PanelStatus, RowKey};
use crate::traits::{AutomationStore, Clock, StoreTransaction};
use crate::workflow::{FaultTicketWorkflow, WorkflowResult};

/// Request to create or update the alert for a row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertUpsertRequest {
    pub zone: String,
    pub row: u32,
    pub status: AlertStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
}

impl AlertUpsertRequest {
    pub fn new(row: RowKey, status: AlertStatus, message: impl Into<String>) -> Self {
        Self {
            zone: row.zone,
            row: row.row,
            status,
            message: message.into(),
            scan_id: None,
        }
    }

    pub fn with_scan_id(mut self, scan_id: impl Into<String>) -> Self {
        self.scan_id = Some(scan_id.into());
        self
    }

    pub fn row_key(&self) -> RowKey {
        RowKey::new(self.zone.clone(), self.row)
    }
}

/// Result of an alert upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertUpsert {
    pub alert: Alert,
    pub created: bool,
    pub escalated: bool,
    /// Present when the upsert triggered the workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowResult>,
}

/// Summary of a sync pass over live panel status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertSyncReport {
    pub created: Vec<AlertUpsert>,
    pub updated: Vec<AlertUpsert>,
    pub dismissed: Vec<Alert>,
    pub unchanged: usize,
}

impl AlertSyncReport {
    pub fn workflows(&self) -> impl Iterator<Item = &WorkflowResult> {
        self.created
            .iter()
            .chain(self.updated.iter())
            .filter_map(|u| u.workflow.as_ref())
    }

    fn merge(&mut self, other: AlertSyncReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.dismissed.extend(other.dismissed);
        self.unchanged += other.unchanged;
    }
}

#[derive(Clone)]
pub struct AlertRowAggregator {
    store: Arc<dyn AutomationStore>,
    workflow: FaultTicketWorkflow,
    identifiers: IdentifierGenerator,
    clock: Arc<dyn Clock>,
    row_locking: bool,
}

impl AlertRowAggregator {
    pub fn new(
        store: Arc<dyn AutomationStore>,
        workflow: FaultTicketWorkflow,
        clock: Arc<dyn Clock>,
        row_locking: bool,
    ) -> Self {
        Self {
            store,
            identifiers: workflow.identifiers().clone(),
            workflow,
            clock,
            row_locking,
        }
    }

    /// Create or update the open alert for a row
    #[tracing::instrument(skip(self, request), fields(zone = %request.zone, row = request.row, status = %request.status))]
    pub async fn upsert(&self, request: AlertUpsertRequest) -> Result<AlertUpsert> {
        let row = request.row_key();
        row.validate()?;

        let panels = self.workflow.resolve_row(&row).await;
        let mut tx = self.store.begin().await?;
        if self.row_locking {
            tx.lock_row(&row).await?;
        }
        let upsert = self.upsert_in(tx.as_mut(), request, &panels).await?;
        tx.commit().await?;
        Ok(upsert)
    }

    async fn upsert_in(
        &self,
        tx: &mut dyn StoreTransaction,
        request: AlertUpsertRequest,
        panels: &[String],
    ) -> Result<AlertUpsert> {
        let row = request.row_key();
        let now = self.clock.now();

        let (alert, created, escalated) = match tx.find_open_alert(&row).await? {
            Some(mut alert) => {
                let escalated =
                    alert.status == AlertStatus::Warning && request.status == AlertStatus::Fault;
                alert.status = request.status;
                alert.message = request.message.clone();
                if request.scan_id.is_some() {
                    alert.scan_id = request.scan_id.clone();
                }
                alert.updated_at = now;
                tx.update_alert(&alert).await?;
                (alert, false, escalated)
            }
            None => {
                let alert = Alert {
                    id: Uuid::now_v7(),
                    alert_id: self.identifiers.next(tx, IdentifierKind::Alert).await,
                    zone: row.zone.clone(),
                    row: row.row,
                    status: request.status,
                    message: request.message.clone(),
                    dismissed: false,
                    ticket_id: None,
                    scan_id: request.scan_id.clone(),
                    created_at: now,
                    updated_at: now,
                };
                tx.insert_alert(&alert).await?;
                (alert, true, false)
            }
        };

        if !created && !escalated {
            debug!(alert_id = %alert.alert_id, "Alert updated in place");
            return Ok(AlertUpsert {
                alert,
                created,
                escalated,
                workflow: None,
            });
        }

        // A new alert joins any open ticket for the row. An escalation only
        // matches faults of its own type, so it gets a fresh ticket.
        let scope = if created {
            DedupScope::AnyFault
        } else {
            DedupScope::SameFaultType
        };
        let mut event = AnomalyEvent::new(row, request.status.severity(), AnomalySource::RowAlert)
            .with_fault_type(request.status.fault_type())
            .with_alert_status(request.status)
            .with_dedup_scope(scope);
        event.analysis_text = Some(request.message);
        let result = self.workflow.run_in(tx, &event, panels).await?;

        // The workflow stamps tickets it creates onto the alert
        let mut alert = tx.get_alert(alert.id).await?.unwrap_or(alert);
        if result.deduplicated && alert.ticket_id.is_none() {
            alert.ticket_id = Some(result.ticket_id);
            alert.updated_at = now;
            tx.update_alert(&alert).await?;
        }
        info!(
            alert_id = %alert.alert_id,
            created,
            escalated,
            ticket_id = %result.ticket_id,
            deduplicated = result.deduplicated,
            "Alert triggered fault workflow"
        );
        Ok(AlertUpsert {
            alert,
            created,
            escalated,
            workflow: Some(result),
        })
    }

    /// Reconcile open alerts against live panel status for every known row
    pub async fn sync(&self) -> Result<AlertSyncReport> {
        let panels = self.store.list_panels().await?;
        let mut rows: BTreeMap<RowKey, Vec<Panel>> = BTreeMap::new();
        for panel in panels {
            rows.entry(panel.row_key()).or_default().push(panel);
        }

        let mut report = AlertSyncReport::default();
        for (row, panels) in rows {
            report.merge(self.sync_panels(row, &panels).await?);
        }
        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            dismissed = report.dismissed.len(),
            "Alert sync complete"
        );
        Ok(report)
    }

    /// Reconcile one row
    pub async fn sync_row(&self, row: &RowKey) -> Result<AlertSyncReport> {
        let panels: Vec<Panel> = self
            .store
            .list_panels()
            .await?
            .into_iter()
            .filter(|p| p.row_key() == *row)
            .collect();
        self.sync_panels(row.clone(), &panels).await
    }

    async fn sync_panels(&self, row: RowKey, panels: &[Panel]) -> Result<AlertSyncReport> {
        let mut report = AlertSyncReport::default();
        // Rows without registered panels have no live status to reconcile against
        if panels.is_empty() {
            return Ok(report);
        }

        let desired = row_alert_status(panels);
        let panel_ids: Vec<String> = panels.iter().map(|p| p.panel_id.clone()).collect();

        let mut tx = self.store.begin().await?;
        if self.row_locking {
            tx.lock_row(&row).await?;
        }
        let open = tx.find_open_alert(&row).await?;

        match (open, desired) {
            (None, None) => report.unchanged += 1,
            (Some(mut alert), None) => {
                alert.dismissed = true;
                alert.updated_at = self.clock.now();
                tx.update_alert(&alert).await?;
                info!(alert_id = %alert.alert_id, row = %row, "Row recovered, alert dismissed");
                report.dismissed.push(alert);
            }
            (Some(alert), Some(status)) if alert.status == status => report.unchanged += 1,
            (open, Some(status)) => {
                let message = row_message(&row, status, panels);
                let upsert = self
                    .upsert_in(
                        tx.as_mut(),
                        AlertUpsertRequest::new(row, status, message),
                        &panel_ids,
                    )
                    .await?;
                if open.is_some() {
                    report.updated.push(upsert);
                } else {
                    report.created.push(upsert);
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Dismiss an alert by id
    pub async fn dismiss(&self, id: Uuid) -> Result<Alert> {
        let mut tx = self.store.begin().await?;
        let mut alert = tx
            .get_alert(id)
            .await?
            .ok_or_else(|| AutomationError::not_found("alert", id))?;
        if !alert.dismissed {
            alert.dismissed = true;
            alert.updated_at = self.clock.now();
            tx.update_alert(&alert).await?;
            info!(alert_id = %alert.alert_id, "Alert dismissed");
        }
        tx.commit().await?;
        Ok(alert)
    }
}

fn row_message(row: &RowKey, status: AlertStatus, panels: &[Panel]) -> String {
    let worst: Vec<&str> = panels
        .iter()
        .filter(|p| AlertStatus::from_panel_status(p.status) == Some(status))
        .map(|p| p.panel_id.as_str())
        .collect();
    format!(
        "{} panel(s) in row {} reporting {}: {}",
        worst.len(),
        row,
        status,
        worst.join(", ")
    )
}

/// Worst live status across a row's panels, if any panel is alerting
pub fn row_alert_status(panels: &[Panel]) -> Option<AlertStatus> {
    panels
        .iter()
        .map(|p| p.status)
        .filter(PanelStatus::is_alerting)
        .max()
        .and_then(AlertStatus::from_panel_status)
}
