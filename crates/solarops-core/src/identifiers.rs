// Display identifier generation
//
// Produces human-legible identifiers ("TKT-042") with a numeric suffix one
// greater than the last stored identifier of the same kind. Two concurrent
// generators may read the same last value, so these identifiers are not a
// uniqueness guarantee; records are keyed by UUID.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AutomationError, Result};
use crate::traits::{Clock, StoreTransaction};

/// Kinds of display identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Incident,
    Ticket,
    Alert,
}

impl IdentifierKind {
    /// Prefix used for newly generated identifiers
    pub fn prefix(&self) -> &'static str {
        match self {
            IdentifierKind::Incident => "INC",
            IdentifierKind::Ticket => "TKT",
            IdentifierKind::Alert => "ALT",
        }
    }

    /// Every prefix an identifier of this kind may carry, current one first
    pub fn known_prefixes(&self) -> &'static [&'static str] {
        match self {
            IdentifierKind::Incident => &["INC", "INCIDENT"],
            IdentifierKind::Ticket => &["TKT", "TICKET", "TK"],
            IdentifierKind::Alert => &["ALT", "ALERT", "ALR"],
        }
    }

    /// True if `identifier` carries one of this kind's prefixes
    pub fn matches(&self, identifier: &str) -> bool {
        let upper = identifier.to_ascii_uppercase();
        self.known_prefixes()
            .iter()
            .any(|prefix| upper.starts_with(&format!("{prefix}-")))
    }
}

/// Format `PREFIX-NNN`, zero-padded to three digits
pub fn format_identifier(kind: IdentifierKind, sequence: u64) -> String {
    format!("{}-{:03}", kind.prefix(), sequence)
}

/// Generates display identifiers from the last stored one
#[derive(Clone)]
pub struct IdentifierGenerator {
    clock: Arc<dyn Clock>,
    trailing_number: Regex,
}

impl IdentifierGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Result<Self> {
        let trailing_number = Regex::new(r"(\d+)$").map_err(|e| {
            AutomationError::validation(format!("Invalid identifier pattern: {e}"))
        })?;
        Ok(Self {
            clock,
            trailing_number,
        })
    }

    /// Numeric suffix of an identifier of the given kind
    pub fn parse_sequence(&self, kind: IdentifierKind, identifier: &str) -> Option<u64> {
        if !kind.matches(identifier) {
            return None;
        }
        self.trailing_number
            .captures(identifier)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Next identifier of `kind`. Never fails: a lookup error or an
    /// exhausted sequence falls back to a time-based suffix.
    pub async fn next(&self, tx: &mut dyn StoreTransaction, kind: IdentifierKind) -> String {
        match tx.latest_identifier(kind).await {
            Ok(last) => {
                let sequence = last
                    .as_deref()
                    .and_then(|id| self.parse_sequence(kind, id))
                    .unwrap_or(0);
                match sequence.checked_add(1) {
                    Some(next) => format_identifier(kind, next),
                    None => {
                        warn!(kind = ?kind, sequence, "Identifier sequence exhausted, using time-based suffix");
                        self.fallback(kind)
                    }
                }
            }
            Err(e) => {
                warn!(kind = ?kind, error = %e, "Identifier lookup failed, using time-based suffix");
                self.fallback(kind)
            }
        }
    }

    fn fallback(&self, kind: IdentifierKind) -> String {
        let millis = self.clock.now().timestamp_millis().rem_euclid(1_000_000) as u64;
        format_identifier(kind, millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAutomationStore;
    use crate::traits::{AutomationStore, ManualClock};
    use chrono::{TimeZone, Utc};

    fn generator(now: chrono::DateTime<Utc>) -> IdentifierGenerator {
        IdentifierGenerator::new(Arc::new(ManualClock::new(now))).unwrap()
    }

    #[test]
    fn test_parse_sequence_accepts_legacy_prefixes() {
        let g = generator(Utc::now());
        assert_eq!(g.parse_sequence(IdentifierKind::Ticket, "TKT-041"), Some(41));
        assert_eq!(g.parse_sequence(IdentifierKind::Ticket, "TICKET-7"), Some(7));
        assert_eq!(g.parse_sequence(IdentifierKind::Ticket, "tk-1200"), Some(1200));
        assert_eq!(g.parse_sequence(IdentifierKind::Ticket, "ALT-003"), None);
        assert_eq!(g.parse_sequence(IdentifierKind::Alert, "ALERT-x"), None);
    }

    #[test]
    fn test_format_pads_to_three_digits() {
        assert_eq!(format_identifier(IdentifierKind::Incident, 7), "INC-007");
        assert_eq!(format_identifier(IdentifierKind::Ticket, 1234), "TKT-1234");
    }

    #[tokio::test]
    async fn test_first_identifier_starts_at_one() {
        let store = InMemoryAutomationStore::new();
        let generator = generator(Utc::now());
        let mut tx = store.begin().await.unwrap();
        let id = generator.next(tx.as_mut(), IdentifierKind::Alert).await;
        assert_eq!(id, "ALT-001");
    }

    #[tokio::test]
    async fn test_fallback_uses_clock_millis() {
        let store = InMemoryAutomationStore::new();
        store.fail_identifier_lookups(true);
        let now = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap();
        let generator = generator(now);
        let mut tx = store.begin().await.unwrap();
        let id = generator.next(tx.as_mut(), IdentifierKind::Ticket).await;
        assert_eq!(id, "TKT-123456");
    }

    #[tokio::test]
    async fn test_exhausted_sequence_falls_back_to_clock() {
        use crate::location::RowKey;
        use crate::ticket::{Ticket, TicketPriority, TicketStatus};
        use uuid::Uuid;

        let store = InMemoryAutomationStore::new();
        let now = Utc.timestamp_millis_opt(1_700_000_654_321).unwrap();
        let generator = generator(now);
        let mut tx = store.begin().await.unwrap();
        tx.insert_ticket(&Ticket {
            id: Uuid::now_v7(),
            ticket_number: format!("TKT-{}", u64::MAX),
            fault_id: Uuid::now_v7(),
            location: RowKey::new("A", 1),
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            assigned_technician_id: None,
            notes: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        })
        .await
        .unwrap();

        let id = generator.next(tx.as_mut(), IdentifierKind::Ticket).await;
        assert_eq!(id, "TKT-654321");
    }
}
