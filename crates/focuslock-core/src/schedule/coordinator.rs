use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use super::snapshot::{build_table, publish_table};
use super::trigger::RecurringTriggerService;
use super::{Schedule, ScheduleDraft};
use crate::bridge::SharedStateBridge;
use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::lock;
use crate::storage::Database;

/// Owns the schedule table in the main process.
///
/// Every mutation runs in the same order: persist locally, publish the full
/// snapshot table to the bridge, then register or deregister with the
/// trigger service. The snapshot is therefore durable before the trigger
/// service can fire a boundary for it.
pub struct ScheduleCoordinator {
    db: Arc<Database>,
    bridge: Arc<dyn SharedStateBridge>,
    triggers: Arc<dyn RecurringTriggerService>,
    clock: Arc<dyn Clock>,
    schedules: Mutex<Vec<Schedule>>,
}

impl ScheduleCoordinator {
    pub fn open(
        db: Arc<Database>,
        bridge: Arc<dyn SharedStateBridge>,
        triggers: Arc<dyn RecurringTriggerService>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let schedules = db.list_schedules()?;
        tracing::debug!(count = schedules.len(), "schedules loaded");
        Ok(Self {
            db,
            bridge,
            triggers,
            clock,
            schedules: Mutex::new(schedules),
        })
    }

    pub fn list(&self) -> Vec<Schedule> {
        lock(&self.schedules).clone()
    }

    pub fn get(&self, id: &str) -> Option<Schedule> {
        lock(&self.schedules).iter().find(|s| s.id == id).cloned()
    }

    /// Find by id, or by exact name.
    pub fn resolve(&self, key: &str) -> Option<Schedule> {
        let schedules = lock(&self.schedules);
        schedules
            .iter()
            .find(|s| s.id == key)
            .or_else(|| schedules.iter().find(|s| s.name == key))
            .cloned()
    }

    /// Enabled schedules inside their interval right now.
    pub fn running(&self) -> Vec<Schedule> {
        let now = self.clock.local_now();
        lock(&self.schedules)
            .iter()
            .filter(|s| s.is_running_at(now))
            .cloned()
            .collect()
    }

    pub fn create(&self, draft: ScheduleDraft) -> Result<Schedule> {
        draft.validate()?;
        let mut schedules = lock(&self.schedules);
        ensure_unique_name(&schedules, draft.name.trim(), None)?;

        let schedule = Schedule::from_draft(draft, self.clock.now());
        self.db.upsert_schedule(&schedule)?;
        schedules.push(schedule.clone());

        self.publish(&schedules)?;
        self.triggers.register(&schedule.name, &schedule.recurrence)?;
        tracing::info!(id = %schedule.id, name = %schedule.name, "schedule created");
        Ok(schedule)
    }

    /// Replace a schedule's definition, keeping its id and enabled flag.
    pub fn update(&self, id: &str, draft: ScheduleDraft) -> Result<Schedule> {
        draft.validate()?;
        let mut schedules = lock(&self.schedules);
        let index = position(&schedules, id)?;
        self.ensure_unlocked(&schedules[index])?;
        ensure_unique_name(&schedules, draft.name.trim(), Some(id))?;

        let previous = schedules[index].clone();
        let updated = Schedule {
            name: draft.name.trim().to_string(),
            recurrence: draft.recurrence,
            restrictions: draft.restrictions,
            is_strict_mode: draft.is_strict_mode,
            updated_at: self.clock.now(),
            ..previous.clone()
        };
        self.db.upsert_schedule(&updated)?;
        schedules[index] = updated.clone();

        self.publish(&schedules)?;
        if previous.name != updated.name {
            self.triggers.deregister(&previous.name)?;
        }
        if updated.is_enabled {
            self.triggers.register(&updated.name, &updated.recurrence)?;
        }
        tracing::info!(id, name = %updated.name, "schedule updated");
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<Schedule> {
        let mut schedules = lock(&self.schedules);
        let index = position(&schedules, id)?;
        self.ensure_unlocked(&schedules[index])?;

        self.db.delete_schedule(id)?;
        let removed = schedules.remove(index);

        self.publish(&schedules)?;
        self.triggers.deregister(&removed.name)?;
        tracing::info!(id, name = %removed.name, "schedule deleted");
        Ok(removed)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Schedule> {
        let mut schedules = lock(&self.schedules);
        let index = position(&schedules, id)?;
        if schedules[index].is_enabled == enabled {
            return Ok(schedules[index].clone());
        }
        if !enabled {
            self.ensure_unlocked(&schedules[index])?;
        }

        let mut updated = schedules[index].clone();
        updated.is_enabled = enabled;
        updated.updated_at = self.clock.now();
        self.db.upsert_schedule(&updated)?;
        schedules[index] = updated.clone();

        self.publish(&schedules)?;
        if enabled {
            self.triggers.register(&updated.name, &updated.recurrence)?;
        } else {
            self.triggers.deregister(&updated.name)?;
        }
        tracing::info!(id, enabled, "schedule toggled");
        Ok(updated)
    }

    /// Rewrite the snapshot table and trigger registrations from the local
    /// schedule table. Used at startup to repair state left behind by an
    /// interrupted mutation.
    ///
    /// Returns the number of enabled schedules published.
    pub fn republish(&self) -> Result<usize> {
        let schedules = lock(&self.schedules);
        let table = self.publish(&schedules)?;

        let enabled: BTreeSet<&str> = schedules.iter().filter(|s| s.is_enabled).map(|s| s.name.as_str()).collect();
        for stale in self.triggers.registered()?.keys().filter(|name| !enabled.contains(name.as_str())) {
            self.triggers.deregister(stale)?;
        }
        for schedule in schedules.iter().filter(|s| s.is_enabled) {
            self.triggers.register(&schedule.name, &schedule.recurrence)?;
        }
        tracing::info!(count = table, "schedule snapshots republished");
        Ok(table)
    }

    fn publish(&self, schedules: &[Schedule]) -> Result<usize> {
        let table = build_table(schedules)?;
        publish_table(self.bridge.as_ref(), &table)?;
        Ok(table.len())
    }

    /// Strict-mode schedules are frozen while their interval is running.
    fn ensure_unlocked(&self, schedule: &Schedule) -> Result<()> {
        if schedule.is_strict_mode && schedule.is_running_at(self.clock.local_now()) {
            tracing::warn!(name = %schedule.name, "strict schedule change refused while active");
            return Err(CoreError::ScheduleLocked(schedule.name.clone()));
        }
        Ok(())
    }
}

fn position(schedules: &[Schedule], id: &str) -> Result<usize> {
    schedules
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| CoreError::ScheduleNotFound(id.to_string()))
}

fn ensure_unique_name(schedules: &[Schedule], name: &str, except_id: Option<&str>) -> Result<()> {
    let taken = schedules
        .iter()
        .any(|s| s.name == name && Some(s.id.as_str()) != except_id);
    if taken {
        return Err(ValidationError::DuplicateName(name.to_string()).into());
    }
    Ok(())
}
