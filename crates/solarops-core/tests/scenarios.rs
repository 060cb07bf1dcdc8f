// End-to-end scenarios for the automation engine on the in-memory store

use std::sync::Arc;

use chrono::{Duration, Utc};
use solarops_core::{
    AlertStatus, AlertUpsertRequest, AnomalyEvent, AnomalySource, AutomationEngine,
    AutomationError, AutomationStage, AutomationStore, CreatePanel, CreateTechnician,
    EngineConfig, InMemoryAutomationStore, ManualClock, PanelStatus, RowKey, TechnicianStatus,
    TicketPatch, TicketStatus, TicketUpdate,
};

struct Harness {
    engine: AutomationEngine,
    store: Arc<InMemoryAutomationStore>,
    clock: Arc<ManualClock>,
}

async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

async fn harness_with(config: EngineConfig) -> Harness {
    let store = Arc::new(InMemoryAutomationStore::new());
    for zone in ["A", "B"] {
        for row in 1..=4u32 {
            for unit in 1..=3u32 {
                store
                    .create_panel(CreatePanel {
                        panel_id: format!("PNL-{zone}{row:02}{unit:02}"),
                        zone: zone.to_string(),
                        row,
                        status: PanelStatus::Healthy,
                    })
                    .await
                    .unwrap();
            }
        }
    }
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine =
        AutomationEngine::with_clock(store.clone(), store.clone(), config, clock.clone()).unwrap();
    Harness {
        engine,
        store,
        clock,
    }
}

fn dust(zone: &str, row: u32) -> AnomalyEvent {
    AnomalyEvent::new(RowKey::new(zone, row), "high", AnomalySource::CameraScan)
        .with_fault_type("dust_accumulation")
}

#[tokio::test]
async fn no_technicians_leaves_ticket_unassigned() {
    let h = harness().await;

    let result = h.engine.report_anomaly(dust("A", 3)).await.unwrap();

    assert!(!result.deduplicated);
    assert_eq!(result.assigned_technician_id, None);
    let ticket = h.engine.get_ticket(result.ticket_id).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.assigned_technician_id, None);

    let trail = h.engine.incident_trail(&result.incident_id).await.unwrap();
    assert_eq!(
        trail.last().map(|e| e.stage),
        Some(AutomationStage::TechnicianUnavailable)
    );
}

#[tokio::test]
async fn repeat_report_within_window_is_deduplicated() {
    let h = harness().await;
    let first = h.engine.report_anomaly(dust("A", 3)).await.unwrap();
    let events_before = h.store.event_count().await;

    h.clock.advance(Duration::minutes(5));
    let second = h.engine.report_anomaly(dust("A", 3)).await.unwrap();

    assert!(second.deduplicated);
    assert_eq!(second.ticket_id, first.ticket_id);
    assert_eq!(second.ticket_number, first.ticket_number);

    // The original incident is untouched; the repeat only records detected + deduplicated
    let original = h.engine.incident_trail(&first.incident_id).await.unwrap();
    assert_eq!(original.len(), 4);
    let repeat = h.engine.incident_trail(&second.incident_id).await.unwrap();
    let stages: Vec<_> = repeat.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![AutomationStage::Detected, AutomationStage::Deduplicated]
    );
    assert_eq!(h.store.event_count().await, events_before + 2);
}

#[tokio::test]
async fn dedup_is_idempotent_for_workload() {
    let h = harness().await;
    let tech = h
        .engine
        .register_technician(CreateTechnician::new("Ana").with_skills(["cleaning", "dust"]))
        .await
        .unwrap();

    for unit in 1..=4u32 {
        h.clock.advance(Duration::minutes(3));
        let panel = format!("PNL-A03{:02}", 1 + unit % 3);
        h.engine
            .report_anomaly(dust("A", 3).with_panel(panel))
            .await
            .unwrap();
    }

    assert_eq!(h.engine.list_tickets().await.unwrap().len(), 1);
    let tech = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(tech.active_tickets, 1);
}

#[tokio::test]
async fn concurrent_reports_for_one_row_create_one_ticket() {
    let h = harness().await;
    let tech = h
        .engine
        .register_technician(CreateTechnician::new("Ana"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.report_anomaly(dust("B", 2)).await
        }));
    }
    let mut created = 0;
    for handle in handles {
        if !handle.await.unwrap().unwrap().deduplicated {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(h.engine.list_tickets().await.unwrap().len(), 1);
    let tech = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(tech.active_tickets, 1);
}

#[tokio::test]
async fn different_fault_types_in_one_row_are_separate_tickets() {
    let h = harness().await;
    let dust = h.engine.report_anomaly(dust("A", 1)).await.unwrap();
    let hotspot = h
        .engine
        .report_anomaly(
            AnomalyEvent::new(RowKey::new("A", 1), "critical", AnomalySource::CameraScan)
                .with_fault_type("Hotspot"),
        )
        .await
        .unwrap();
    assert!(!hotspot.deduplicated);
    assert_ne!(dust.ticket_id, hotspot.ticket_id);

    // A broad report matches whichever fault is most recent
    let broad = h
        .engine
        .report_anomaly(
            AnomalyEvent::new(RowKey::new("A", 1), "medium", AnomalySource::SensorReading)
                .with_dedup_scope(solarops_core::DedupScope::AnyFault),
        )
        .await
        .unwrap();
    assert!(broad.deduplicated);
}

#[tokio::test]
async fn selector_prefers_available_over_loaded_busy() {
    let h = harness().await;
    h.engine
        .register_technician(
            CreateTechnician::new("Loaded")
                .with_status(TechnicianStatus::Busy)
                .with_active_tickets(5)
                .with_skills(["dust"]),
        )
        .await
        .unwrap();
    let free = h
        .engine
        .register_technician(CreateTechnician::new("Free").with_skills(["dust"]))
        .await
        .unwrap();

    let result = h.engine.report_anomaly(dust("A", 2)).await.unwrap();
    assert_eq!(result.assigned_technician_id, Some(free.id));
}

#[tokio::test]
async fn offline_technicians_are_never_assigned() {
    let h = harness().await;
    let off = h
        .engine
        .register_technician(
            CreateTechnician::new("Off")
                .with_status(TechnicianStatus::Offline)
                .with_skills(["dust"]),
        )
        .await
        .unwrap();

    let result = h.engine.report_anomaly(dust("A", 2)).await.unwrap();
    assert_eq!(result.assigned_technician_id, None);
    let off = h.store.get_technician(off.id).await.unwrap().unwrap();
    assert_eq!(off.active_tickets, 0);
}

#[tokio::test]
async fn resolution_reverses_workload_exactly_once() {
    let h = harness().await;
    let tech = h
        .engine
        .register_technician(CreateTechnician::new("Ana").with_active_tickets(1))
        .await
        .unwrap();

    let result = h.engine.report_anomaly(dust("A", 4)).await.unwrap();
    assert_eq!(result.assigned_technician_id, Some(tech.id));
    let loaded = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(loaded.active_tickets, 2);

    h.clock.advance(Duration::hours(3));
    let resolved = h
        .engine
        .resolve_ticket(result.ticket_id, Some("panels washed".to_string()))
        .await
        .unwrap();
    assert!(resolved.workload_reversed);

    let after = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(after.active_tickets, 1);
    assert_eq!(after.resolved_tickets, loaded.resolved_tickets + 1);
    assert!(matches!(
        h.engine.get_ticket(result.ticket_id).await,
        Err(AutomationError::NotFound { .. })
    ));

    // A second resolve is rejected and changes nothing
    assert!(h.engine.resolve_ticket(result.ticket_id, None).await.is_err());
    let again = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(again.active_tickets, 1);
    assert_eq!(again.resolved_tickets, after.resolved_tickets);
}

#[tokio::test]
async fn closing_via_patch_returns_resolved_outcome() {
    let h = harness().await;
    h.engine
        .register_technician(CreateTechnician::new("Ana"))
        .await
        .unwrap();
    let result = h.engine.report_anomaly(dust("B", 1)).await.unwrap();

    let update = h
        .engine
        .update_ticket(result.ticket_id, TicketPatch::status(TicketStatus::Closed))
        .await
        .unwrap();
    assert!(matches!(update, TicketUpdate::Resolved { .. }));
    assert!(h.engine.list_tickets().await.unwrap().is_empty());
}

#[tokio::test]
async fn report_after_resolution_opens_new_ticket() {
    let h = harness().await;
    let first = h.engine.report_anomaly(dust("A", 3)).await.unwrap();
    h.engine.resolve_ticket(first.ticket_id, None).await.unwrap();

    h.clock.advance(Duration::minutes(2));
    let second = h.engine.report_anomaly(dust("A", 3)).await.unwrap();
    assert!(!second.deduplicated);
    assert_ne!(second.ticket_id, first.ticket_id);
}

#[tokio::test]
async fn busy_technician_returns_to_available_after_resolution() {
    let h = harness_with(EngineConfig::default().with_busy_threshold(2)).await;
    let tech = h
        .engine
        .register_technician(CreateTechnician::new("Ana").with_active_tickets(1))
        .await
        .unwrap();

    let result = h.engine.report_anomaly(dust("A", 1)).await.unwrap();
    let busy = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(busy.status, TechnicianStatus::Busy);

    h.engine.resolve_ticket(result.ticket_id, None).await.unwrap();
    let relaxed = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(relaxed.status, TechnicianStatus::Available);
    assert_eq!(relaxed.active_tickets, 1);
}

#[tokio::test]
async fn alert_singleton_holds_under_concurrent_upserts() {
    let h = harness().await;
    let mut handles = Vec::new();
    for i in 0..6 {
        let engine = h.engine.clone();
        let status = if i % 2 == 0 {
            AlertStatus::Warning
        } else {
            AlertStatus::Fault
        };
        handles.push(tokio::spawn(async move {
            engine
                .upsert_row_alert(AlertUpsertRequest::new(
                    RowKey::new("B", 4),
                    status,
                    format!("update {i}"),
                ))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let open: Vec<_> = h
        .engine
        .list_alerts(false)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.zone == "B" && a.row == 4)
        .collect();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn escalation_triggers_fresh_workflow() {
    let h = harness().await;
    let warning = h
        .engine
        .upsert_row_alert(AlertUpsertRequest::new(
            RowKey::new("A", 2),
            AlertStatus::Warning,
            "output dropping",
        ))
        .await
        .unwrap();
    let fault = h
        .engine
        .upsert_row_alert(AlertUpsertRequest::new(
            RowKey::new("A", 2),
            AlertStatus::Fault,
            "inverter offline",
        ))
        .await
        .unwrap();

    let first = warning.workflow.unwrap();
    let second = fault.workflow.unwrap();
    assert_ne!(first.incident_id, second.incident_id);
    assert_ne!(first.ticket_id, second.ticket_id);
    assert_eq!(fault.alert.id, warning.alert.id);
    assert_eq!(fault.alert.ticket_id, Some(second.ticket_id));
}

#[tokio::test]
async fn new_row_alert_joins_open_scan_ticket() {
    let h = harness().await;
    let tech = h
        .engine
        .register_technician(CreateTechnician::new("Ana"))
        .await
        .unwrap();

    let scan = h
        .engine
        .report_anomaly(
            AnomalyEvent::new(RowKey::new("A", 3), "high", AnomalySource::CameraScan)
                .with_fault_type("hotspot"),
        )
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(2));
    let upsert = h
        .engine
        .upsert_row_alert(AlertUpsertRequest::new(
            RowKey::new("A", 3),
            AlertStatus::Fault,
            "inverter offline",
        ))
        .await
        .unwrap();

    let workflow = upsert.workflow.unwrap();
    assert!(upsert.created);
    assert!(workflow.deduplicated);
    assert_eq!(workflow.ticket_id, scan.ticket_id);
    assert_eq!(upsert.alert.ticket_id, Some(scan.ticket_id));
    assert_eq!(h.engine.list_tickets().await.unwrap().len(), 1);
    let tech = h.store.get_technician(tech.id).await.unwrap().unwrap();
    assert_eq!(tech.active_tickets, 1);
}

#[tokio::test]
async fn storage_failure_persists_nothing() {
    let h = harness().await;
    h.engine
        .register_technician(CreateTechnician::new("Ana"))
        .await
        .unwrap();
    h.store.fail_technician_updates(true);

    let err = h.engine.report_anomaly(dust("A", 3)).await.unwrap_err();
    assert!(matches!(err, AutomationError::Storage(_)));
    assert!(h.engine.list_tickets().await.unwrap().is_empty());
    assert_eq!(h.store.event_count().await, 0);

    let recent = h.engine.recent_results().recent(1);
    assert!(recent[0].error.is_some());

    h.store.fail_technician_updates(false);
    let retried = h.engine.report_anomaly(dust("A", 3)).await.unwrap();
    assert!(!retried.deduplicated);
}

#[tokio::test]
async fn identifiers_increment_per_kind() {
    let h = harness().await;
    let a = h.engine.report_anomaly(dust("A", 1)).await.unwrap();
    let b = h.engine.report_anomaly(dust("A", 2)).await.unwrap();
    assert_eq!(a.ticket_number, "TKT-001");
    assert_eq!(b.ticket_number, "TKT-002");
    assert_eq!(a.incident_id, "INC-001");
    assert_eq!(b.incident_id, "INC-002");
}
