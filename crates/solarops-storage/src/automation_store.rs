// Database-backed AutomationStore implementation
//
// PgAutomationStore serves the engine's read paths from the pool and hands
// out PgStoreTransaction for workflow runs. A transaction wraps one sqlx
// transaction; dropping it without commit rolls back.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use solarops_core::{
    Alert, AutomationEvent, AutomationStore, CreatePanel, CreateTechnician, FaultRecord,
    IdentifierKind, LocationResolver, Panel, PanelStatus, RecentFaultQuery, RowKey,
    StoreResult, StoreTransaction, Technician, Ticket,
};

use crate::repositories::{self as repo, db_error, Database};

// ============================================================================
// PgAutomationStore
// ============================================================================

/// PostgreSQL automation store
///
/// Also resolves rows to panel ids, so one instance serves as both the
/// store and the location resolver of an engine.
#[derive(Clone)]
pub struct PgAutomationStore {
    db: Database,
}

impl PgAutomationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Begin a transaction without boxing it
    pub async fn begin_transaction(&self) -> StoreResult<PgStoreTransaction> {
        let tx = self.db.pool().begin().await.map_err(db_error)?;
        Ok(PgStoreTransaction { tx })
    }
}

#[async_trait]
impl AutomationStore for PgAutomationStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(self.begin_transaction().await?))
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        repo::get_ticket(self.db.pool(), id).await
    }

    async fn list_tickets(&self) -> StoreResult<Vec<Ticket>> {
        repo::list_tickets(self.db.pool()).await
    }

    async fn get_fault(&self, id: Uuid) -> StoreResult<Option<FaultRecord>> {
        repo::get_fault(self.db.pool(), id).await
    }

    async fn get_technician(&self, id: Uuid) -> StoreResult<Option<Technician>> {
        repo::get_technician(self.db.pool(), id, false).await
    }

    async fn list_technicians(&self) -> StoreResult<Vec<Technician>> {
        repo::list_technicians(self.db.pool(), false).await
    }

    async fn list_alerts(&self, include_dismissed: bool) -> StoreResult<Vec<Alert>> {
        repo::list_alerts(self.db.pool(), include_dismissed).await
    }

    async fn list_panels(&self) -> StoreResult<Vec<Panel>> {
        repo::list_panels(self.db.pool()).await
    }

    async fn list_incident_events(&self, incident_id: &str) -> StoreResult<Vec<AutomationEvent>> {
        repo::list_incident_events(self.db.pool(), incident_id).await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
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
        let stored = repo::insert_technician(self.db.pool(), &technician).await?;
        debug!(technician_id = %stored.id, "created technician");
        Ok(stored)
    }

    #[instrument(skip(self, input), fields(panel_id = %input.panel_id))]
    async fn create_panel(&self, input: CreatePanel) -> StoreResult<Panel> {
        let panel = Panel {
            id: Uuid::now_v7(),
            panel_id: input.panel_id,
            zone: input.zone,
            row: input.row,
            status: input.status,
            updated_at: Utc::now(),
        };
        repo::insert_panel(self.db.pool(), &panel).await
    }

    async fn update_panel_status(
        &self,
        panel_id: &str,
        status: PanelStatus,
    ) -> StoreResult<Option<Panel>> {
        repo::update_panel_status(self.db.pool(), panel_id, status, Utc::now()).await
    }
}

#[async_trait]
impl LocationResolver for PgAutomationStore {
    async fn panels_in_row(&self, row: &RowKey) -> StoreResult<Vec<String>> {
        repo::panel_ids_in_row(self.db.pool(), row).await
    }
}

// ============================================================================
// PgStoreTransaction
// ============================================================================

/// One engine unit of work on a pooled connection
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgStoreTransaction {
    /// Connection the transaction runs on
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

/// Advisory lock key for a row; the lock is released at commit or rollback
fn row_lock_key(row: &RowKey) -> String {
    format!("row:{row}")
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_row(&mut self, row: &RowKey) -> StoreResult<()> {
        // Transaction-scoped advisory locks are reentrant, so a second call
        // for the same row inside one transaction returns immediately
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(row_lock_key(row))
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        debug!(row = %row, "row lock acquired");
        Ok(())
    }

    async fn latest_identifier(&mut self, kind: IdentifierKind) -> StoreResult<Option<String>> {
        // Callers recover from a failed lookup, so it must not abort the
        // enclosing transaction. Run it under a savepoint.
        let mut savepoint = self.tx.begin().await.map_err(db_error)?;
        match repo::latest_identifier(&mut *savepoint, kind).await {
            Ok(latest) => {
                savepoint.commit().await.map_err(db_error)?;
                Ok(latest)
            }
            Err(e) => {
                savepoint.rollback().await.map_err(db_error)?;
                Err(e)
            }
        }
    }

    async fn find_recent_fault(
        &mut self,
        query: &RecentFaultQuery,
    ) -> StoreResult<Option<FaultRecord>> {
        if query.panel_ids.is_empty() {
            return Ok(None);
        }
        repo::find_recent_fault(&mut *self.tx, query).await
    }

    async fn latest_ticket_for_fault(&mut self, fault_id: Uuid) -> StoreResult<Option<Ticket>> {
        repo::latest_ticket_for_fault(&mut *self.tx, fault_id).await
    }

    async fn insert_fault(&mut self, fault: &FaultRecord) -> StoreResult<()> {
        repo::insert_fault(&mut *self.tx, fault).await
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        repo::insert_ticket(&mut *self.tx, ticket).await
    }

    async fn get_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        repo::get_ticket_for_update(&mut *self.tx, id).await
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        repo::update_ticket(&mut *self.tx, ticket).await
    }

    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<bool> {
        repo::delete_ticket(&mut *self.tx, id).await
    }

    async fn list_technicians(&mut self) -> StoreResult<Vec<Technician>> {
        repo::list_technicians(&mut *self.tx, true).await
    }

    async fn get_technician(&mut self, id: Uuid) -> StoreResult<Option<Technician>> {
        repo::get_technician(&mut *self.tx, id, true).await
    }

    async fn update_technician(&mut self, technician: &Technician) -> StoreResult<()> {
        repo::update_technician(&mut *self.tx, technician).await
    }

    async fn find_open_alert(&mut self, row: &RowKey) -> StoreResult<Option<Alert>> {
        repo::find_open_alert(&mut *self.tx, row).await
    }

    async fn get_alert(&mut self, id: Uuid) -> StoreResult<Option<Alert>> {
        repo::get_alert(&mut *self.tx, id).await
    }

    async fn insert_alert(&mut self, alert: &Alert) -> StoreResult<()> {
        repo::insert_alert(&mut *self.tx, alert).await
    }

    async fn update_alert(&mut self, alert: &Alert) -> StoreResult<()> {
        repo::update_alert(&mut *self.tx, alert).await
    }

    async fn append_event(&mut self, event: &AutomationEvent) -> StoreResult<()> {
        repo::insert_event(&mut *self.tx, event).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(db_error)
    }
}

// ============================================================================
// Factory functions
// ============================================================================

/// Connect, migrate, and wrap a database URL in a store
pub async fn create_pg_automation_store(database_url: &str) -> anyhow::Result<PgAutomationStore> {
    let db = Database::from_url(database_url).await?;
    db.migrate().await?;
    Ok(PgAutomationStore::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lock_key_uses_row_display() {
        assert_eq!(row_lock_key(&RowKey::new("A", 3)), "row:A-3");
    }
}
