//! Integration tests for schedule enforcement across the two processes.
//!
//! The main process and the monitor process are simulated by separate
//! component instances that share nothing but a data directory: the SQLite
//! bridge file and the restriction scope file.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use focuslock_core::{
    BlockPolicyStore, BlockingContext, BridgeTriggerRegistry, Clock, Collaborators, Config, Database,
    FileCapability, FocusEngine, InMemoryCapability, ManualClock, MonitorHost, MonitorOutcome,
    RecurrenceRule, RestrictionCapability, RestrictionSet, ScheduleDraft, ScriptedEntitlements,
    SharedStateBridge, SqliteBridge, TimeRange,
};

fn main_process(dir: &Path, clock: Arc<ManualClock>) -> FocusEngine {
    let bridge: Arc<dyn SharedStateBridge> = Arc::new(SqliteBridge::open_in_dir(dir).unwrap());
    let collaborators = Collaborators {
        capability: Arc::new(FileCapability::in_dir(dir)),
        triggers: Arc::new(BridgeTriggerRegistry::new(bridge.clone())),
        bridge,
        entitlements: Arc::new(ScriptedEntitlements::approve_all()),
        clock,
    };
    let db = Arc::new(Database::open_in_dir(dir).unwrap());
    FocusEngine::new(&Config::default(), db, collaborators).unwrap()
}

fn monitor_process(dir: &Path, clock: Arc<dyn Clock>) -> MonitorHost {
    let bridge: Arc<dyn SharedStateBridge> = Arc::new(SqliteBridge::open_in_dir(dir).unwrap());
    let store = Arc::new(BlockPolicyStore::new(Arc::new(FileCapability::in_dir(dir))));
    MonitorHost::new(store, bridge, clock, 100)
}

fn morning_focus() -> ScheduleDraft {
    ScheduleDraft {
        name: "Morning Focus".into(),
        recurrence: RecurrenceRule::daily(TimeRange::hm(9, 0, 10, 0).unwrap()),
        restrictions: RestrictionSet::new().with_apps(["appX"]),
        is_strict_mode: false,
    }
}

#[test]
fn test_schedule_enforced_while_main_process_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()));

    {
        let engine = main_process(dir.path(), clock.clone());
        engine.policy().request_authorization();
        engine.schedules().create(morning_focus()).unwrap();
    }

    clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
    let monitor = monitor_process(dir.path(), clock.clone());
    let outcomes = monitor.poll().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(&outcomes[0], MonitorOutcome::Applied { activity, .. } if activity == "Morning Focus"));

    // The OS scope now holds appX, visible to any later process.
    let scope = FileCapability::in_dir(dir.path());
    assert!(scope.current(BlockingContext::Schedule).unwrap().contains_app("appX"));

    clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap());
    let monitor = monitor_process(dir.path(), clock.clone());
    let outcomes = monitor.poll().unwrap();
    assert!(matches!(&outcomes[0], MonitorOutcome::Removed { .. }));
    assert!(scope.current(BlockingContext::Schedule).unwrap().is_empty());

    let log = monitor.monitor().diagnostic_log().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].event, "intervalDidStart");
    assert_eq!(log[1].event, "intervalDidEnd");
}

#[test]
fn test_main_process_sees_monitor_restrictions_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()));
    {
        let engine = main_process(dir.path(), clock.clone());
        engine.policy().request_authorization();
        engine.schedules().create(morning_focus()).unwrap();
    }

    clock.advance(Duration::minutes(90));
    monitor_process(dir.path(), clock.clone()).poll().unwrap();

    let engine = main_process(dir.path(), clock.clone());
    assert!(engine.policy().is_active(BlockingContext::Schedule));
    let status = engine.status().unwrap();
    assert_eq!(status.running_schedules, vec!["Morning Focus".to_string()]);
    assert!(status.effective_policy.contains_app("appX"));
}

#[test]
fn test_disabled_schedule_is_not_applied() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()));
    let engine = main_process(dir.path(), clock.clone());
    engine.policy().request_authorization();
    let schedule = engine.schedules().create(morning_focus()).unwrap();
    engine.schedules().set_enabled(&schedule.id, false).unwrap();

    clock.advance(Duration::minutes(70));
    let monitor = monitor_process(dir.path(), clock.clone());
    assert!(monitor.poll().unwrap().is_empty());
    // A stray boundary for the stale name applies nothing.
    assert!(matches!(
        monitor.monitor().interval_did_start("Morning Focus"),
        MonitorOutcome::SnapshotMissing { .. }
    ));
    assert!(engine.policy().effective_policy().is_empty());
}

#[test]
fn test_contexts_compose_without_interference() {
    let store = BlockPolicyStore::new(Arc::new(InMemoryCapability::granted()));
    store
        .apply_context(BlockingContext::Timer, &RestrictionSet::new().with_apps(["appX"]))
        .unwrap();
    store
        .apply_context(BlockingContext::Schedule, &RestrictionSet::new().with_apps(["appY"]))
        .unwrap();
    store.remove_context(BlockingContext::Timer);

    let effective = store.effective_policy();
    assert!(effective.contains_app("appY"));
    assert!(!effective.contains_app("appX"));
}

#[test]
fn test_revoked_authorization_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let capability = Arc::new(FileCapability::in_dir(dir.path()));
    let store = BlockPolicyStore::new(capability.clone());
    store.request_authorization();
    store
        .apply_context(BlockingContext::Timer, &RestrictionSet::new().with_apps(["appX"]))
        .unwrap();

    capability.revoke().unwrap();
    let err = store
        .apply_context(BlockingContext::Schedule, &RestrictionSet::new().with_apps(["appY"]))
        .unwrap_err();
    assert!(matches!(err, focuslock_core::CoreError::AuthorizationRequired { .. }));

    // Earlier restrictions are not retracted.
    assert!(store.effective_policy().contains_app("appX"));
    assert!(!store.is_active(BlockingContext::Schedule));
}
