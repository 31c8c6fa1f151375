//! Schedule interval callbacks, run in the independently launched monitor
//! process.
//!
//! The monitor shares no memory with the main process. Everything it knows
//! about a schedule comes from the published snapshot table, and everything
//! it does is an apply or remove of the `schedule` context.

use std::fmt;
use std::sync::Arc;

use super::diagnostics::{self, DiagnosticEntry};
use super::snapshot::{self, SnapshotLookup};
use super::trigger::TriggerEvent;
use crate::bridge::SharedStateBridge;
use crate::clock::Clock;
use crate::error::{BridgeError, CoreError};
use crate::policy::{ApplyReport, BlockPolicyStore, BlockingContext};

/// What a callback did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Applied { activity: String, report: ApplyReport },
    /// No snapshot published under this name; nothing applied.
    SnapshotMissing { activity: String },
    SnapshotUnreadable { activity: String, reason: String },
    NotAuthorized { activity: String },
    ApplyFailed { activity: String, reason: String },
    Removed { activity: String },
}

impl MonitorOutcome {
    pub fn activity(&self) -> &str {
        match self {
            MonitorOutcome::Applied { activity, .. }
            | MonitorOutcome::SnapshotMissing { activity }
            | MonitorOutcome::SnapshotUnreadable { activity, .. }
            | MonitorOutcome::NotAuthorized { activity }
            | MonitorOutcome::ApplyFailed { activity, .. }
            | MonitorOutcome::Removed { activity } => activity,
        }
    }

    fn summary(&self) -> String {
        match self {
            MonitorOutcome::Applied { report, .. } if report.is_complete() => "applied".into(),
            MonitorOutcome::Applied { report, .. } => format!(
                "partially applied ({} facet(s) failed)",
                report.failed.len()
            ),
            MonitorOutcome::SnapshotMissing { .. } => "snapshot missing".into(),
            MonitorOutcome::SnapshotUnreadable { reason, .. } => format!("snapshot unreadable: {reason}"),
            MonitorOutcome::NotAuthorized { .. } => "not authorized".into(),
            MonitorOutcome::ApplyFailed { reason, .. } => format!("apply failed: {reason}"),
            MonitorOutcome::Removed { .. } => "removed".into(),
        }
    }
}

impl fmt::Display for MonitorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.activity(), self.summary())
    }
}

pub struct Monitor {
    store: Arc<BlockPolicyStore>,
    bridge: Arc<dyn SharedStateBridge>,
    clock: Arc<dyn Clock>,
    log_cap: usize,
}

impl Monitor {
    pub fn new(
        store: Arc<BlockPolicyStore>,
        bridge: Arc<dyn SharedStateBridge>,
        clock: Arc<dyn Clock>,
        log_cap: usize,
    ) -> Self {
        Self {
            store,
            bridge,
            clock,
            log_cap,
        }
    }

    /// Apply the snapshot published for `activity`.
    ///
    /// A missing or unreadable snapshot applies nothing and is not retried.
    pub fn interval_did_start(&self, activity: &str) -> MonitorOutcome {
        let outcome = match snapshot::lookup(self.bridge.as_ref(), activity) {
            SnapshotLookup::Missing => {
                tracing::warn!(activity, "no snapshot published for activity");
                MonitorOutcome::SnapshotMissing {
                    activity: activity.to_string(),
                }
            }
            SnapshotLookup::Unreadable(reason) => {
                tracing::warn!(activity, reason = %reason, "snapshot could not be read");
                MonitorOutcome::SnapshotUnreadable {
                    activity: activity.to_string(),
                    reason,
                }
            }
            SnapshotLookup::Found(snapshot) => match snapshot.restriction_set() {
                Err(reason) => {
                    tracing::warn!(activity, reason = %reason, "snapshot tokens could not be decoded");
                    MonitorOutcome::SnapshotUnreadable {
                        activity: activity.to_string(),
                        reason,
                    }
                }
                Ok(set) => self.apply(activity, &set),
            },
        };
        self.record("intervalDidStart", &outcome);
        outcome
    }

    /// Remove the `schedule` context. Repeated ends are no-ops.
    pub fn interval_did_end(&self, activity: &str) -> MonitorOutcome {
        self.store.remove_context(BlockingContext::Schedule);
        tracing::info!(activity, "schedule interval ended");
        let outcome = MonitorOutcome::Removed {
            activity: activity.to_string(),
        };
        self.record("intervalDidEnd", &outcome);
        outcome
    }

    pub fn handle(&self, event: &TriggerEvent) -> MonitorOutcome {
        match event {
            TriggerEvent::IntervalDidStart(activity) => self.interval_did_start(activity),
            TriggerEvent::IntervalDidEnd(activity) => self.interval_did_end(activity),
        }
    }

    pub fn diagnostic_log(&self) -> Result<Vec<DiagnosticEntry>, BridgeError> {
        diagnostics::read(self.bridge.as_ref())
    }

    pub fn clear_diagnostic_log(&self) -> Result<(), BridgeError> {
        diagnostics::clear(self.bridge.as_ref())
    }

    fn apply(&self, activity: &str, set: &crate::policy::RestrictionSet) -> MonitorOutcome {
        match self.store.apply_context(BlockingContext::Schedule, set) {
            Ok(report) => {
                tracing::info!(activity, applied = ?report.applied, "schedule interval started");
                MonitorOutcome::Applied {
                    activity: activity.to_string(),
                    report,
                }
            }
            Err(CoreError::AuthorizationRequired { .. }) => {
                tracing::warn!(activity, "schedule not applied: authorization required");
                MonitorOutcome::NotAuthorized {
                    activity: activity.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!(activity, error = %e, "schedule apply failed");
                MonitorOutcome::ApplyFailed {
                    activity: activity.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn record(&self, event: &str, outcome: &MonitorOutcome) {
        let entry = DiagnosticEntry {
            timestamp: self.clock.now(),
            activity: outcome.activity().to_string(),
            event: event.to_string(),
            outcome: outcome.summary(),
        };
        if let Err(e) = diagnostics::append(self.bridge.as_ref(), self.log_cap, entry) {
            tracing::warn!(error = %e, "failed to write monitor diagnostic entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{keys, MemoryBridge};
    use crate::clock::ManualClock;
    use crate::policy::{AuthorizationStatus, InMemoryCapability, RestrictionSet};
    use crate::schedule::snapshot::{build_table, publish_table};
    use crate::schedule::{RecurrenceRule, Schedule, ScheduleDraft};
    use crate::time::TimeRange;
    use chrono::Utc;

    struct Fixture {
        monitor: Monitor,
        store: Arc<BlockPolicyStore>,
        bridge: Arc<MemoryBridge>,
        capability: Arc<InMemoryCapability>,
    }

    fn fixture() -> Fixture {
        let capability = Arc::new(InMemoryCapability::granted());
        let store = Arc::new(BlockPolicyStore::new(capability.clone()));
        let bridge = Arc::new(MemoryBridge::new());
        let monitor = Monitor::new(store.clone(), bridge.clone(), Arc::new(ManualClock::new(Utc::now())), 100);
        Fixture {
            monitor,
            store,
            bridge,
            capability,
        }
    }

    fn publish(bridge: &MemoryBridge, name: &str, apps: &[&str]) {
        let schedule = Schedule::from_draft(
            ScheduleDraft {
                name: name.into(),
                recurrence: RecurrenceRule::daily(TimeRange::hm(9, 0, 10, 0).unwrap()),
                restrictions: RestrictionSet::new().with_apps(apps.iter().copied()),
                is_strict_mode: false,
            },
            Utc::now(),
        );
        publish_table(bridge, &build_table([&schedule]).unwrap()).unwrap();
    }

    #[test]
    fn start_applies_snapshot_and_end_removes() {
        let f = fixture();
        publish(&f.bridge, "Morning Focus", &["appX"]);

        let outcome = f.monitor.interval_did_start("Morning Focus");
        assert!(matches!(outcome, MonitorOutcome::Applied { .. }));
        assert!(f.store.effective_policy().contains_app("appX"));

        // repeated start reapplies the same set
        f.monitor.interval_did_start("Morning Focus");
        assert_eq!(f.store.slot(BlockingContext::Schedule).unwrap().len(), 1);

        f.monitor.interval_did_end("Morning Focus");
        f.monitor.interval_did_end("Morning Focus");
        assert!(f.store.effective_policy().is_empty());

        let log = f.monitor.diagnostic_log().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].outcome, "applied");
        assert_eq!(log[3].event, "intervalDidEnd");
    }

    #[test]
    fn missing_snapshot_applies_nothing() {
        let f = fixture();
        publish(&f.bridge, "Other", &["appY"]);
        assert_eq!(
            f.monitor.interval_did_start("Morning Focus"),
            MonitorOutcome::SnapshotMissing {
                activity: "Morning Focus".into()
            }
        );
        assert!(f.store.effective_policy().is_empty());
    }

    #[test]
    fn corrupt_table_applies_nothing() {
        let f = fixture();
        f.bridge.write(keys::SCHEDULE_SNAPSHOTS, b"{oops").unwrap();
        assert!(matches!(
            f.monitor.interval_did_start("Morning Focus"),
            MonitorOutcome::SnapshotUnreadable { .. }
        ));
        assert!(f.store.effective_policy().is_empty());
    }

    #[test]
    fn unauthorized_start_is_reported() {
        let f = fixture();
        publish(&f.bridge, "Morning Focus", &["appX"]);
        f.capability.set_status(AuthorizationStatus::Denied);
        assert!(matches!(
            f.monitor.interval_did_start("Morning Focus"),
            MonitorOutcome::NotAuthorized { .. }
        ));
        assert_eq!(f.monitor.diagnostic_log().unwrap()[0].outcome, "not authorized");

        f.monitor.clear_diagnostic_log().unwrap();
        assert!(f.monitor.diagnostic_log().unwrap().is_empty());
    }
}
