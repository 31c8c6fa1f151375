use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::policy::RestrictionSet;
use crate::time::{TimeRange, WeekdaySet};

/// When a schedule's interval runs: a local time range on a set of weekdays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub weekdays: WeekdaySet,
    pub range: TimeRange,
}

impl RecurrenceRule {
    pub fn new(weekdays: WeekdaySet, range: TimeRange) -> Result<Self, ValidationError> {
        if weekdays.is_empty() {
            return Err(ValidationError::NoWeekdays);
        }
        Ok(Self { weekdays, range })
    }

    pub fn daily(range: TimeRange) -> Self {
        Self {
            weekdays: WeekdaySet::EVERY_DAY,
            range,
        }
    }

    /// Whether `at` is inside one of this rule's intervals.
    pub fn is_active_at(&self, at: DateTime<FixedOffset>) -> bool {
        self.range.is_active_on(self.weekdays, at)
    }
}

/// A recurring blocking schedule.
///
/// The name doubles as the activity name registered with the OS trigger
/// service, so it is unique across schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub recurrence: RecurrenceRule,
    pub restrictions: RestrictionSet,
    pub is_enabled: bool,
    pub is_strict_mode: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Build an enabled schedule from a validated draft.
    pub fn from_draft(draft: ScheduleDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name.trim().to_string(),
            recurrence: draft.recurrence,
            restrictions: draft.restrictions,
            is_enabled: true,
            is_strict_mode: draft.is_strict_mode,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the schedule is enabled and inside an interval at `at`.
    pub fn is_running_at(&self, at: DateTime<FixedOffset>) -> bool {
        self.is_enabled && self.recurrence.is_active_at(at)
    }
}

/// User-supplied fields for creating or replacing a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDraft {
    pub name: String,
    pub recurrence: RecurrenceRule,
    pub restrictions: RestrictionSet,
    #[serde(default)]
    pub is_strict_mode: bool,
}

impl ScheduleDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.recurrence.weekdays.is_empty() {
            return Err(ValidationError::NoWeekdays);
        }
        if self.recurrence.range.start == self.recurrence.range.end {
            return Err(ValidationError::EmptyTimeRange);
        }
        if self.restrictions.is_empty() {
            return Err(ValidationError::EmptyRestrictions);
        }
        Ok(())
    }
}
