use clap::Subcommand;
use focuslock_core::{RecurrenceRule, Schedule, ScheduleDraft, TimeRange, WeekdaySet};

use super::{open_engine, print_json, RestrictionArgs};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Create a schedule
    Create {
        /// Unique schedule name
        name: String,
        /// Local time range, e.g. "09:00-10:00" or "23:00-06:00"
        #[arg(long)]
        range: String,
        /// Weekdays, e.g. "mon,wed,fri", "weekdays" or "daily"
        #[arg(long, default_value = "daily")]
        days: String,
        /// Refuse edits while the schedule is running
        #[arg(long)]
        strict: bool,
        #[command(flatten)]
        restrictions: RestrictionArgs,
    },
    /// Replace a schedule's settings
    Update {
        /// Schedule ID or name
        schedule: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        range: Option<String>,
        #[arg(long)]
        days: Option<String>,
        #[arg(long)]
        strict: Option<bool>,
        /// Replace the restriction set when any of these is given
        #[command(flatten)]
        restrictions: RestrictionArgs,
    },
    /// Delete a schedule
    Delete {
        /// Schedule ID or name
        schedule: String,
    },
    /// Enable a schedule
    Enable {
        schedule: String,
    },
    /// Disable a schedule
    Disable {
        schedule: String,
    },
    /// List schedules
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the published snapshot table and OS registrations
    Republish,
}

fn print_schedule(schedule: &Schedule, running: bool) {
    let mut flags = Vec::new();
    if !schedule.is_enabled {
        flags.push("disabled");
    }
    if schedule.is_strict_mode {
        flags.push("strict");
    }
    if running {
        flags.push("running");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    println!(
        "{}  {}  {} {}  ({}){flags}",
        schedule.id,
        schedule.name,
        schedule.recurrence.range,
        schedule.recurrence.weekdays,
        schedule.restrictions
    );
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let schedules = engine.schedules();

    let find = |key: &str| {
        schedules
            .resolve(key)
            .ok_or_else(|| format!("schedule not found: {key}"))
    };

    match action {
        ScheduleAction::Create {
            name,
            range,
            days,
            strict,
            restrictions,
        } => {
            let draft = ScheduleDraft {
                name,
                recurrence: RecurrenceRule::new(WeekdaySet::parse(&days)?, TimeRange::parse(&range)?)?,
                restrictions: restrictions.to_set(),
                is_strict_mode: strict,
            };
            let schedule = schedules.create(draft)?;
            println!("Schedule created: {}", schedule.id);
        }
        ScheduleAction::Update {
            schedule,
            name,
            range,
            days,
            strict,
            restrictions,
        } => {
            let current = find(&schedule)?;
            let weekdays = match days {
                Some(days) => WeekdaySet::parse(&days)?,
                None => current.recurrence.weekdays,
            };
            let range = match range {
                Some(range) => TimeRange::parse(&range)?,
                None => current.recurrence.range,
            };
            let draft = ScheduleDraft {
                name: name.unwrap_or(current.name),
                recurrence: RecurrenceRule::new(weekdays, range)?,
                restrictions: if restrictions.is_empty() {
                    current.restrictions
                } else {
                    restrictions.to_set()
                },
                is_strict_mode: strict.unwrap_or(current.is_strict_mode),
            };
            let updated = schedules.update(&current.id, draft)?;
            println!("Schedule updated: {}", updated.id);
        }
        ScheduleAction::Delete { schedule } => {
            let current = find(&schedule)?;
            let deleted = schedules.delete(&current.id)?;
            println!("Schedule deleted: {}", deleted.name);
        }
        ScheduleAction::Enable { schedule } => {
            let current = find(&schedule)?;
            schedules.set_enabled(&current.id, true)?;
            println!("Schedule enabled: {}", current.name);
        }
        ScheduleAction::Disable { schedule } => {
            let current = find(&schedule)?;
            schedules.set_enabled(&current.id, false)?;
            println!("Schedule disabled: {}", current.name);
        }
        ScheduleAction::List { json } => {
            let all = schedules.list();
            if json {
                return print_json(&all);
            }
            if all.is_empty() {
                println!("No schedules");
            }
            let running: Vec<String> = schedules.running().into_iter().map(|s| s.id).collect();
            for schedule in &all {
                print_schedule(schedule, running.contains(&schedule.id));
            }
        }
        ScheduleAction::Republish => {
            let count = schedules.republish()?;
            println!("Published {count} schedule(s)");
        }
    }
    Ok(())
}
