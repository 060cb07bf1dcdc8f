// Deduplication window
//
// Scoped to the row, not the panel: several panels in one row reporting
// within the window are treated as one physical problem.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::fault::{normalize_fault_type, FaultRecord};
use crate::location::RowKey;
use crate::ticket::Ticket;
use crate::traits::{LocationResolver, RecentFaultQuery, StoreResult, StoreTransaction};

/// A recent fault in the same row, with its most recent ticket if one still exists
#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub fault: FaultRecord,
    pub ticket: Option<Ticket>,
}

impl DuplicateMatch {
    /// Only a match with a surviving ticket suppresses a new one
    pub fn live_ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }
}

#[derive(Clone)]
pub struct DeduplicationWindow {
    window: chrono::Duration,
    resolver: Arc<dyn LocationResolver>,
}

impl DeduplicationWindow {
    pub fn new(window: chrono::Duration, resolver: Arc<dyn LocationResolver>) -> Self {
        Self { window, resolver }
    }

    pub fn window(&self) -> chrono::Duration {
        self.window
    }

    /// Panels in the row. Resolution failures yield an empty set.
    pub async fn resolve(&self, row: &RowKey) -> Vec<String> {
        match self.resolver.panels_in_row(row).await {
            Ok(panels) => panels,
            Err(e) => {
                warn!(row = %row, error = %e, "Row resolution failed, skipping dedup");
                Vec::new()
            }
        }
    }

    /// Most recent fault for the row within the window ending at `as_of`
    pub async fn find_duplicate(
        &self,
        tx: &mut dyn StoreTransaction,
        row: &RowKey,
        fault_type: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Option<DuplicateMatch>> {
        let panels = self.resolve(row).await;
        self.find_among(tx, &panels, fault_type, as_of).await
    }

    /// Same as [`find_duplicate`](Self::find_duplicate) with the row already resolved
    pub async fn find_among(
        &self,
        tx: &mut dyn StoreTransaction,
        panel_ids: &[String],
        fault_type: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Option<DuplicateMatch>> {
        if panel_ids.is_empty() {
            return Ok(None);
        }

        let query = RecentFaultQuery {
            panel_ids: panel_ids.to_vec(),
            fault_type: fault_type.map(normalize_fault_type),
            since: as_of - self.window,
        };

        let Some(fault) = tx.find_recent_fault(&query).await? else {
            return Ok(None);
        };
        let ticket = tx.latest_ticket_for_fault(fault.id).await?;
        debug!(
            fault_id = %fault.id,
            has_ticket = ticket.is_some(),
            "Recent fault found in row"
        );
        Ok(Some(DuplicateMatch { fault, ticket }))
    }
}
