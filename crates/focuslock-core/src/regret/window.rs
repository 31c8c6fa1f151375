use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::time::{TimeRange, WeekdaySet};

/// Repetition of a custom window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CustomRepeat {
    /// A single occurrence starting on `date`.
    Once { date: NaiveDate },
    Weekly { weekdays: WeekdaySet },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WindowKind {
    /// Every selected weekday, e.g. 23:00-06:00.
    Recurring { range: TimeRange, weekdays: WeekdaySet },
    /// Fixed countdown from the moment a focus session completes.
    PostSession { duration_minutes: u32 },
    Custom { range: TimeRange, repeat: CustomRepeat },
}

impl WindowKind {
    /// Lower wins when several windows match at once.
    pub fn priority(&self) -> u8 {
        match self {
            WindowKind::Recurring { .. } => 0,
            WindowKind::Custom { .. } => 1,
            WindowKind::PostSession { .. } => 2,
        }
    }

    pub fn is_time_window(&self) -> bool {
        !matches!(self, WindowKind::PostSession { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            WindowKind::Recurring { .. } => "recurring",
            WindowKind::PostSession { .. } => "post-session",
            WindowKind::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowKind::Recurring { range, weekdays } => write!(f, "recurring {range} {weekdays}"),
            WindowKind::PostSession { duration_minutes } => {
                write!(f, "post-session {duration_minutes}m")
            }
            WindowKind::Custom {
                range,
                repeat: CustomRepeat::Once { date },
            } => write!(f, "custom {range} on {date}"),
            WindowKind::Custom {
                range,
                repeat: CustomRepeat::Weekly { weekdays },
            } => write!(f, "custom {range} {weekdays}"),
        }
    }
}

/// A protection window. Matching activates the `regretPrevention` context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegretWindow {
    pub id: String,
    pub kind: WindowKind,
    pub is_enabled: bool,
    /// Shown to the user while the window protects them.
    pub message: String,
}

/// A window matching the current moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowMatch {
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RegretWindow {
    pub fn new(kind: WindowKind, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            is_enabled: true,
            message: message.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.kind {
            WindowKind::PostSession { duration_minutes: 0 } => Err(ValidationError::InvalidValue {
                field: "duration_minutes".into(),
                message: "post-session protection must last at least a minute".into(),
            }),
            WindowKind::Recurring { weekdays, .. }
            | WindowKind::Custom {
                repeat: CustomRepeat::Weekly { weekdays },
                ..
            } if weekdays.is_empty() => Err(ValidationError::NoWeekdays),
            _ => Ok(()),
        }
    }

    /// Whether the window covers `at`, given the last session completion.
    pub(crate) fn match_at(
        &self,
        at: DateTime<FixedOffset>,
        last_completion: Option<DateTime<Utc>>,
    ) -> Option<WindowMatch> {
        match self.kind {
            WindowKind::Recurring { range, weekdays }
            | WindowKind::Custom {
                range,
                repeat: CustomRepeat::Weekly { weekdays },
            } => {
                let date = range.occurrence_date(at)?;
                weekdays.contains(date.weekday()).then_some(())?;
                occurrence_start(date, range, at).map(|started_at| WindowMatch {
                    started_at,
                    expires_at: None,
                })
            }
            WindowKind::Custom {
                range,
                repeat: CustomRepeat::Once { date },
            } => {
                (range.occurrence_date(at)? == date).then_some(())?;
                occurrence_start(date, range, at).map(|started_at| WindowMatch {
                    started_at,
                    expires_at: None,
                })
            }
            WindowKind::PostSession { duration_minutes } => {
                let completed = last_completion?;
                let expires_at = completed + Duration::minutes(i64::from(duration_minutes));
                let now = at.with_timezone(&Utc);
                (now >= completed && now < expires_at).then_some(WindowMatch {
                    started_at: completed,
                    expires_at: Some(expires_at),
                })
            }
        }
    }
}

fn occurrence_start(date: NaiveDate, range: TimeRange, at: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    date.and_time(range.start)
        .and_local_timezone(*at.offset())
        .single()
        .map(|local| local.with_timezone(&Utc))
}
