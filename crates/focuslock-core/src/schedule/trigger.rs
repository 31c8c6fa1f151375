//! Recurring trigger service: the OS facility that wakes the monitor
//! process at schedule boundaries.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use super::RecurrenceRule;
use crate::bridge::{keys, read_json, write_json, SharedStateBridge};
use crate::error::Result;
use crate::lock;

/// Registers recurring intervals by activity name.
///
/// Registering an already registered name replaces its rule.
pub trait RecurringTriggerService: Send + Sync {
    fn register(&self, activity: &str, rule: &RecurrenceRule) -> Result<()>;

    /// Deregistering an unknown name is a no-op.
    fn deregister(&self, activity: &str) -> Result<()>;

    fn registered(&self) -> Result<BTreeMap<String, RecurrenceRule>>;
}

/// Boundary callback delivered to the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "activity", rename_all = "camelCase")]
pub enum TriggerEvent {
    IntervalDidStart(String),
    IntervalDidEnd(String),
}

impl TriggerEvent {
    pub fn activity(&self) -> &str {
        match self {
            TriggerEvent::IntervalDidStart(name) | TriggerEvent::IntervalDidEnd(name) => name,
        }
    }
}

/// In-process trigger service that only records registrations.
#[derive(Debug, Default)]
pub struct InMemoryTriggerService {
    rules: Mutex<BTreeMap<String, RecurrenceRule>>,
}

impl InMemoryTriggerService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecurringTriggerService for InMemoryTriggerService {
    fn register(&self, activity: &str, rule: &RecurrenceRule) -> Result<()> {
        lock(&self.rules).insert(activity.to_string(), *rule);
        Ok(())
    }

    fn deregister(&self, activity: &str) -> Result<()> {
        lock(&self.rules).remove(activity);
        Ok(())
    }

    fn registered(&self) -> Result<BTreeMap<String, RecurrenceRule>> {
        Ok(lock(&self.rules).clone())
    }
}

/// Trigger service kept in the shared state bridge.
///
/// The main process registers rules; the monitor process calls [`poll`]
/// periodically and receives the boundary events that occurred since its
/// last poll. The set of activities currently inside their interval is
/// stored alongside the rules so consecutive polls from separate monitor
/// runs agree.
///
/// [`poll`]: BridgeTriggerRegistry::poll
pub struct BridgeTriggerRegistry {
    bridge: Arc<dyn SharedStateBridge>,
}

impl BridgeTriggerRegistry {
    pub fn new(bridge: Arc<dyn SharedStateBridge>) -> Self {
        Self { bridge }
    }

    /// Boundary events at `now`, ends before starts.
    ///
    /// An activity that was deregistered while inside its interval gets an
    /// end event.
    pub fn poll(&self, now: DateTime<FixedOffset>) -> Result<Vec<TriggerEvent>> {
        let rules = self.rules()?;
        let previously: BTreeSet<String> =
            read_json(self.bridge.as_ref(), keys::TRIGGER_ACTIVE)?.unwrap_or_default();
        let active: BTreeSet<String> = rules
            .iter()
            .filter(|(_, rule)| rule.is_active_at(now))
            .map(|(name, _)| name.clone())
            .collect();

        let mut events: Vec<TriggerEvent> = previously
            .difference(&active)
            .cloned()
            .map(TriggerEvent::IntervalDidEnd)
            .collect();
        events.extend(active.difference(&previously).cloned().map(TriggerEvent::IntervalDidStart));

        if !events.is_empty() {
            write_json(self.bridge.as_ref(), keys::TRIGGER_ACTIVE, &active)?;
            tracing::debug!(count = events.len(), "trigger boundaries crossed");
        }
        Ok(events)
    }

    fn rules(&self) -> Result<BTreeMap<String, RecurrenceRule>> {
        Ok(read_json(self.bridge.as_ref(), keys::TRIGGER_REGISTRY)?.unwrap_or_default())
    }
}

impl RecurringTriggerService for BridgeTriggerRegistry {
    fn register(&self, activity: &str, rule: &RecurrenceRule) -> Result<()> {
        let mut rules = self.rules()?;
        rules.insert(activity.to_string(), *rule);
        write_json(self.bridge.as_ref(), keys::TRIGGER_REGISTRY, &rules)?;
        tracing::debug!(activity, "trigger registered");
        Ok(())
    }

    fn deregister(&self, activity: &str) -> Result<()> {
        let mut rules = self.rules()?;
        if rules.remove(activity).is_some() {
            write_json(self.bridge.as_ref(), keys::TRIGGER_REGISTRY, &rules)?;
            tracing::debug!(activity, "trigger deregistered");
        }
        Ok(())
    }

    fn registered(&self) -> Result<BTreeMap<String, RecurrenceRule>> {
        self.rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBridge;
    use crate::time::TimeRange;
    use chrono::{TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap().fixed_offset()
    }

    #[test]
    fn poll_reports_each_boundary_once() {
        let registry = BridgeTriggerRegistry::new(Arc::new(MemoryBridge::new()));
        registry
            .register("Morning Focus", &RecurrenceRule::daily(TimeRange::hm(9, 0, 10, 0).unwrap()))
            .unwrap();

        assert!(registry.poll(at(8, 59)).unwrap().is_empty());
        assert_eq!(
            registry.poll(at(9, 0)).unwrap(),
            vec![TriggerEvent::IntervalDidStart("Morning Focus".into())]
        );
        assert!(registry.poll(at(9, 30)).unwrap().is_empty());
        assert_eq!(
            registry.poll(at(10, 0)).unwrap(),
            vec![TriggerEvent::IntervalDidEnd("Morning Focus".into())]
        );
    }

    #[test]
    fn deregistering_active_activity_ends_it() {
        let registry = BridgeTriggerRegistry::new(Arc::new(MemoryBridge::new()));
        registry
            .register("Evening", &RecurrenceRule::daily(TimeRange::hm(18, 0, 20, 0).unwrap()))
            .unwrap();
        registry.poll(at(18, 30)).unwrap();

        registry.deregister("Evening").unwrap();
        registry.deregister("Evening").unwrap();
        assert!(registry.registered().unwrap().is_empty());
        assert_eq!(
            registry.poll(at(18, 45)).unwrap(),
            vec![TriggerEvent::IntervalDidEnd("Evening".into())]
        );
    }

    #[test]
    fn in_memory_replaces_rule() {
        let triggers = InMemoryTriggerService::new();
        triggers
            .register("a", &RecurrenceRule::daily(TimeRange::hm(1, 0, 2, 0).unwrap()))
            .unwrap();
        let later = RecurrenceRule::daily(TimeRange::hm(3, 0, 4, 0).unwrap());
        triggers.register("a", &later).unwrap();
        assert_eq!(triggers.registered().unwrap()["a"], later);
    }
}
