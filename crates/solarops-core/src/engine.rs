// AutomationEngine - the surface callers use
//
// Owns the workflow, ticket lifecycle, alert aggregator, recent-results
// cache, deferred scheduler, and optional notifier. Ingest adapters and HTTP
// handlers go through this type rather than the components directly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::alert::Alert;
use crate::alerts::{AlertRowAggregator, AlertSyncReport, AlertUpsert, AlertUpsertRequest};
use crate::automation_event::AutomationEvent;
use crate::cache::RecentResults;
use crate::config::EngineConfig;
use crate::dedup::DeduplicationWindow;
use crate::error::{AutomationError, Result};
use crate::fault::{AnomalyEvent, AnomalySource};
use crate::lifecycle::TicketLifecycle;
use crate::location::{CreatePanel, Panel, PanelStatus, RowKey};
use crate::notify::{FaultNotification, FaultNotifier, WebhookNotifier};
use crate::scheduler::DeferredScheduler;
use crate::technician::{CreateTechnician, Technician};
use crate::ticket::{ResolvedTicket, Ticket, TicketPatch, TicketUpdate};
use crate::traits::{AutomationStore, Clock, LocationResolver, SystemClock};
use crate::workflow::{CreatedRecords, FaultTicketWorkflow, WorkflowResult};

/// One processed anomaly, kept in the recent-results cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct IngestRecord {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub source: AnomalySource,
    pub location: RowKey,
    pub severity: String,
    pub fault_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkflowResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestRecord {
    fn new(event: &AnomalyEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            received_at,
            source: event.source,
            location: event.location.clone(),
            severity: event.severity.clone(),
            fault_type: event.fault_type().to_string(),
            result: None,
            error: None,
        }
    }
}

/// An anomaly waiting for its deferred workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PendingAnomaly {
    pub id: Uuid,
    pub event: AnomalyEvent,
    pub received_at: DateTime<Utc>,
    pub run_at: DateTime<Utc>,
}

/// Panel status change and the alert sync it caused
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PanelStatusChange {
    pub panel: Panel,
    pub sync: AlertSyncReport,
}

#[derive(Clone)]
pub struct AutomationEngine {
    store: Arc<dyn AutomationStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    workflow: FaultTicketWorkflow,
    lifecycle: TicketLifecycle,
    alerts: AlertRowAggregator,
    recent: Arc<RecentResults<IngestRecord>>,
    scheduler: DeferredScheduler,
    pending: Arc<RwLock<HashMap<Uuid, PendingAnomaly>>>,
    notifier: Option<Arc<dyn FaultNotifier>>,
}

impl AutomationEngine {
    /// Build an engine on the wall clock. A configured webhook enables notifications.
    pub fn new(
        store: Arc<dyn AutomationStore>,
        resolver: Arc<dyn LocationResolver>,
        config: EngineConfig,
    ) -> Result<Self> {
        Self::with_clock(store, resolver, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn AutomationStore>,
        resolver: Arc<dyn LocationResolver>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dedup = DeduplicationWindow::new(config.dedup_window(), resolver);
        let workflow = FaultTicketWorkflow::new(store.clone(), dedup, clock.clone(), &config)?;
        let lifecycle = TicketLifecycle::new(store.clone(), clock.clone(), config.busy_threshold);
        let alerts = AlertRowAggregator::new(
            store.clone(),
            workflow.clone(),
            clock.clone(),
            config.row_locking,
        );

        let notifier: Option<Arc<dyn FaultNotifier>> = match &config.webhook {
            Some(webhook) => {
                info!(url = %webhook.url, min_severity = %webhook.min_severity, "Fault webhook enabled");
                Some(Arc::new(WebhookNotifier::new(webhook)?))
            }
            None => None,
        };

        Ok(Self {
            store,
            recent: Arc::new(RecentResults::new(config.recent_results_capacity)),
            config,
            clock,
            workflow,
            lifecycle,
            alerts,
            scheduler: DeferredScheduler::new(),
            pending: Arc::new(RwLock::new(HashMap::new())),
            notifier,
        })
    }

    /// Replace the notifier (or install one without a webhook config)
    pub fn with_notifier(mut self, notifier: Arc<dyn FaultNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AutomationStore> {
        &self.store
    }

    pub fn recent_results(&self) -> &Arc<RecentResults<IngestRecord>> {
        &self.recent
    }

    // ------------------------------------------------------------------
    // Anomaly ingest
    // ------------------------------------------------------------------

    /// Turn an anomaly into a ticket, reuse an open one, or record that nobody is available
    pub async fn report_anomaly(&self, event: AnomalyEvent) -> Result<WorkflowResult> {
        event.validate()?;
        let mut record = IngestRecord::new(&event, self.clock.now());

        match self.workflow.run(&event).await {
            Ok((result, created)) => {
                record.result = Some(result.clone());
                self.recent.push(record);
                if let Some(created) = created {
                    self.spawn_notification(created, result.clone());
                }
                Ok(result)
            }
            Err(e) => {
                error!(row = %event.location, error = %e, "Fault workflow failed");
                record.error = Some(e.to_string());
                self.recent.push(record);
                Err(e)
            }
        }
    }

    /// Queue an anomaly to be processed after the configured delay
    pub fn report_anomaly_deferred(&self, event: AnomalyEvent) -> Result<PendingAnomaly> {
        event.validate()?;
        let now = self.clock.now();
        let delay = self.config.deferred_delay();
        let pending = PendingAnomaly {
            id: Uuid::now_v7(),
            event,
            received_at: now,
            run_at: now
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
        };
        self.pending.write().insert(pending.id, pending.clone());

        let engine = self.clone();
        let id = pending.id;
        self.scheduler.schedule(id, delay, async move {
            let Some(pending) = engine.pending.write().remove(&id) else {
                return;
            };
            if let Err(e) = engine.report_anomaly(pending.event).await {
                warn!(pending_id = %id, error = %e, "Deferred anomaly failed");
            }
        });

        debug!(pending_id = %pending.id, delay_secs = delay.as_secs(), "Anomaly deferred");
        Ok(pending)
    }

    /// Drop a deferred anomaly before it runs. Returns false if it is not
    /// pending, including when its run has already started.
    pub fn cancel_pending(&self, id: Uuid) -> bool {
        // A run that has claimed its entry is left to finish
        if self.pending.write().remove(&id).is_none() {
            return false;
        }
        self.scheduler.cancel(id);
        info!(pending_id = %id, "Deferred anomaly cancelled");
        true
    }

    /// Deferred anomalies, oldest first
    pub fn pending_anomalies(&self) -> Vec<PendingAnomaly> {
        let mut pending: Vec<_> = self.pending.read().values().cloned().collect();
        pending.sort_by_key(|p| (p.received_at, p.id));
        pending
    }

    // ------------------------------------------------------------------
    // Tickets
    // ------------------------------------------------------------------

    pub async fn resolve_ticket(
        &self,
        id: Uuid,
        resolution_notes: Option<String>,
    ) -> Result<ResolvedTicket> {
        self.lifecycle.resolve_ticket(id, resolution_notes).await
    }

    pub async fn update_ticket(&self, id: Uuid, patch: TicketPatch) -> Result<TicketUpdate> {
        self.lifecycle.update_ticket(id, patch).await
    }

    pub async fn get_ticket(&self, id: Uuid) -> Result<Ticket> {
        self.store
            .get_ticket(id)
            .await?
            .ok_or_else(|| AutomationError::not_found("ticket", id))
    }

    pub async fn list_tickets(&self) -> Result<Vec<Ticket>> {
        Ok(self.store.list_tickets().await?)
    }

    // ------------------------------------------------------------------
    // Alerts and panels
    // ------------------------------------------------------------------

    pub async fn upsert_row_alert(&self, request: AlertUpsertRequest) -> Result<AlertUpsert> {
        let upsert = self.alerts.upsert(request).await?;
        self.after_alert_workflow(&upsert);
        Ok(upsert)
    }

    pub async fn sync_alerts(&self) -> Result<AlertSyncReport> {
        let report = self.alerts.sync().await?;
        for upsert in report.created.iter().chain(report.updated.iter()) {
            self.after_alert_workflow(upsert);
        }
        Ok(report)
    }

    pub async fn dismiss_alert(&self, id: Uuid) -> Result<Alert> {
        self.alerts.dismiss(id).await
    }

    pub async fn list_alerts(&self, include_dismissed: bool) -> Result<Vec<Alert>> {
        Ok(self.store.list_alerts(include_dismissed).await?)
    }

    /// Record a panel status change and reconcile its row's alert
    pub async fn update_panel_status(
        &self,
        panel_id: &str,
        status: PanelStatus,
    ) -> Result<PanelStatusChange> {
        let panel = self
            .store
            .update_panel_status(panel_id, status)
            .await?
            .ok_or_else(|| AutomationError::not_found("panel", panel_id))?;
        info!(panel_id = %panel.panel_id, status = %status, "Panel status changed");

        let sync = self.alerts.sync_row(&panel.row_key()).await?;
        for upsert in sync.created.iter().chain(sync.updated.iter()) {
            self.after_alert_workflow(upsert);
        }
        Ok(PanelStatusChange { panel, sync })
    }

    pub async fn register_panel(&self, input: CreatePanel) -> Result<Panel> {
        RowKey::new(input.zone.clone(), input.row).validate()?;
        if input.panel_id.trim().is_empty() {
            return Err(AutomationError::validation("panel_id must not be empty"));
        }
        Ok(self.store.create_panel(input).await?)
    }

    pub async fn list_panels(&self) -> Result<Vec<Panel>> {
        Ok(self.store.list_panels().await?)
    }

    // ------------------------------------------------------------------
    // Technicians and audit trail
    // ------------------------------------------------------------------

    pub async fn register_technician(&self, input: CreateTechnician) -> Result<Technician> {
        if input.name.trim().is_empty() {
            return Err(AutomationError::validation("technician name must not be empty"));
        }
        Ok(self.store.create_technician(input).await?)
    }

    pub async fn list_technicians(&self) -> Result<Vec<Technician>> {
        Ok(self.store.list_technicians().await?)
    }

    /// Events recorded for one incident, oldest first
    pub async fn incident_trail(&self, incident_id: &str) -> Result<Vec<AutomationEvent>> {
        Ok(self.store.list_incident_events(incident_id).await?)
    }

    /// Abort every deferred run
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.pending.write().clear();
    }

    // ------------------------------------------------------------------
    // Post-commit fan-out
    // ------------------------------------------------------------------

    fn after_alert_workflow(&self, upsert: &AlertUpsert) {
        let Some(result) = &upsert.workflow else {
            return;
        };
        let status = upsert.alert.status;
        self.recent.push(IngestRecord {
            id: Uuid::now_v7(),
            received_at: self.clock.now(),
            source: AnomalySource::RowAlert,
            location: upsert.alert.row_key(),
            severity: status.severity().to_string(),
            fault_type: status.fault_type().to_string(),
            result: Some(result.clone()),
            error: None,
        });

        if result.deduplicated || self.notifier.is_none() {
            return;
        }
        let store = self.store.clone();
        let engine = self.clone();
        let result = result.clone();
        tokio::spawn(async move {
            let records = match (
                store.get_fault(result.fault_id).await,
                store.get_ticket(result.ticket_id).await,
            ) {
                (Ok(Some(fault)), Ok(Some(ticket))) => CreatedRecords { fault, ticket },
                _ => {
                    debug!(ticket_id = %result.ticket_id, "Ticket gone before notification");
                    return;
                }
            };
            engine.deliver(records, result).await;
        });
    }

    fn spawn_notification(&self, created: CreatedRecords, result: WorkflowResult) {
        if self.notifier.is_none() {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            engine.deliver(created, result).await;
        });
    }

    async fn deliver(&self, created: CreatedRecords, result: WorkflowResult) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let notification = FaultNotification::from_records(&created.fault, &created.ticket, &result);
        if let Err(e) = notifier.notify(&notification).await {
            warn!(ticket_id = %result.ticket_id, error = %e, "Fault notification failed");
        }
    }
}
