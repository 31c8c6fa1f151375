//! Local wall-clock ranges and weekday sets shared by schedules and
//! protection windows.
//!
//! A [`TimeRange`] whose end is not after its start crosses midnight: the
//! occurrence that begins at 23:00 on Monday ends at 06:00 on Tuesday and
//! belongs to Monday for weekday matching.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// A set of weekdays, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);
    pub const EVERY_DAY: WeekdaySet = WeekdaySet(0b111_1111);
    pub const WEEKDAYS: WeekdaySet = WeekdaySet(0b001_1111);
    pub const WEEKEND: WeekdaySet = WeekdaySet(0b110_0000);

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in calendar order starting on Monday.
    pub fn days(self) -> Vec<Weekday> {
        ALL_WEEKDAYS
            .iter()
            .copied()
            .filter(|d| self.contains(*d))
            .collect()
    }

    /// Parse `"mon,wed,fri"`, `"weekdays"`, `"weekend"` or `"daily"`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "daily" | "every-day" | "all" => return Ok(Self::EVERY_DAY),
            "weekdays" => return Ok(Self::WEEKDAYS),
            "weekend" | "weekends" => return Ok(Self::WEEKEND),
            _ => {}
        }
        let mut set = Self::EMPTY;
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let day = part
                .parse::<Weekday>()
                .map_err(|_| ValidationError::InvalidValue {
                    field: "weekdays".into(),
                    message: format!("unknown weekday '{part}'"),
                })?;
            set.insert(day);
        }
        if set.is_empty() {
            return Err(ValidationError::NoWeekdays);
        }
        Ok(set)
    }
}

impl From<Vec<Weekday>> for WeekdaySet {
    fn from(days: Vec<Weekday>) -> Self {
        let mut set = WeekdaySet::EMPTY;
        for day in days {
            set.insert(day);
        }
        set
    }
}

impl From<WeekdaySet> for Vec<Weekday> {
    fn from(set: WeekdaySet) -> Self {
        set.days()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            WeekdaySet::EVERY_DAY => write!(f, "daily"),
            WeekdaySet::WEEKDAYS => write!(f, "weekdays"),
            WeekdaySet::WEEKEND => write!(f, "weekend"),
            set => {
                let names: Vec<String> = set.days().iter().map(|d| d.to_string()).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

/// A local wall-clock range, half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if start == end {
            return Err(ValidationError::EmptyTimeRange);
        }
        Ok(Self { start, end })
    }

    /// Build from hour/minute pairs, e.g. `hm(23, 0, 6, 0)`.
    pub fn hm(start_h: u32, start_m: u32, end_h: u32, end_m: u32) -> Result<Self, ValidationError> {
        let start = NaiveTime::from_hms_opt(start_h, start_m, 0).ok_or_else(|| invalid_time(start_h, start_m))?;
        let end = NaiveTime::from_hms_opt(end_h, end_m, 0).ok_or_else(|| invalid_time(end_h, end_m))?;
        Self::new(start, end)
    }

    /// Parse `"HH:MM-HH:MM"`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let (start, end) = input.split_once('-').ok_or_else(|| ValidationError::InvalidValue {
            field: "range".into(),
            message: format!("expected HH:MM-HH:MM, got '{input}'"),
        })?;
        Self::new(parse_hm(start)?, parse_hm(end)?)
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self) -> Duration {
        let raw = self.end - self.start;
        if self.crosses_midnight() {
            raw + Duration::days(1)
        } else {
            raw
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.crosses_midnight() {
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }

    /// Date on which the occurrence containing `at` started, if any.
    pub fn occurrence_date(&self, at: DateTime<FixedOffset>) -> Option<NaiveDate> {
        let time = at.time();
        let date = at.date_naive();
        if !self.contains(time) {
            return None;
        }
        if self.crosses_midnight() && time < self.end {
            date.pred_opt()
        } else {
            Some(date)
        }
    }

    /// Whether `at` falls inside an occurrence that started on one of `days`.
    pub fn is_active_on(&self, days: WeekdaySet, at: DateTime<FixedOffset>) -> bool {
        self.occurrence_date(at)
            .map(|date| days.contains(date.weekday()))
            .unwrap_or(false)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_hm(input: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").map_err(|_| ValidationError::InvalidValue {
        field: "time".into(),
        message: format!("expected HH:MM, got '{}'", input.trim()),
    })
}

fn invalid_time(hour: u32, minute: u32) -> ValidationError {
    ValidationError::InvalidValue {
        field: "time".into(),
        message: format!("{hour:02}:{minute:02} is not a valid time of day"),
    }
}
