use chrono::NaiveDate;
use clap::{Args, Subcommand};
use focuslock_core::{
    data_dir, AuthorizationStatus, Config, CustomRepeat, ProtectionState, RegretWindow, TimeRange, WeekdaySet,
    WindowKind,
};

use super::{format_duration, open_engine, print_json, run_every};

/// Window shape. `--post-session` wins; otherwise `--range` is required.
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Countdown in minutes after each completed focus session
    #[arg(long, conflicts_with_all = ["range", "on", "custom"])]
    post_session: Option<u32>,
    /// Local time range, e.g. "23:00-06:00"
    #[arg(long)]
    range: Option<String>,
    /// Weekdays for recurring and weekly custom windows
    #[arg(long, default_value = "daily")]
    days: String,
    /// Custom window on a single date (YYYY-MM-DD)
    #[arg(long)]
    on: Option<NaiveDate>,
    /// Treat the range as a custom weekly window
    #[arg(long)]
    custom: bool,
}

impl WindowArgs {
    fn to_kind(&self) -> Result<WindowKind, Box<dyn std::error::Error>> {
        if let Some(duration_minutes) = self.post_session {
            return Ok(WindowKind::PostSession { duration_minutes });
        }
        let range = self
            .range
            .as_deref()
            .ok_or("either --post-session or --range is required")?;
        let range = TimeRange::parse(range)?;
        let kind = match self.on {
            Some(date) => WindowKind::Custom {
                range,
                repeat: CustomRepeat::Once { date },
            },
            None if self.custom => WindowKind::Custom {
                range,
                repeat: CustomRepeat::Weekly {
                    weekdays: WeekdaySet::parse(&self.days)?,
                },
            },
            None => WindowKind::Recurring {
                range,
                weekdays: WeekdaySet::parse(&self.days)?,
            },
        };
        Ok(kind)
    }
}

#[derive(Subcommand)]
pub enum RegretAction {
    /// Add a protection window
    Add {
        #[command(flatten)]
        window: WindowArgs,
        /// Message shown while the window protects you
        #[arg(long, default_value = "")]
        message: String,
    },
    /// List protection windows
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a window's shape and message
    Update {
        id: String,
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        message: Option<String>,
    },
    /// Enable a window
    Enable {
        id: String,
    },
    /// Disable a window
    Disable {
        id: String,
    },
    /// Remove a window
    Remove {
        id: String,
    },
    /// Re-evaluate windows now and show the protection state
    Check {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a completed focus session
    Complete,
    /// End post-session protection early
    End,
    /// Acknowledge the current protection message
    Ack,
    /// Keep re-evaluating windows until interrupted
    Watch,
}

fn print_window(window: &RegretWindow) {
    let state = if window.is_enabled { "" } else { " [disabled]" };
    if window.message.is_empty() {
        println!("{}  {}{state}", window.id, window.kind);
    } else {
        println!("{}  {}  \"{}\"{state}", window.id, window.kind, window.message);
    }
}

/// Why a tracked protection is not blocking anything.
fn unenforced_cause(authorization: AuthorizationStatus, has_restrictions: bool) -> &'static str {
    if !authorization.is_granted() {
        "restriction authorization not granted (run `focuslock policy authorize`)"
    } else if !has_restrictions {
        "no regret restrictions configured"
    } else {
        "regret restrictions could not be applied"
    }
}

struct Enforcement {
    authorization: AuthorizationStatus,
    has_restrictions: bool,
}

fn print_protection(protection: Option<&ProtectionState>, now: chrono::DateTime<chrono::Utc>, enforcement: &Enforcement) {
    let Some(protection) = protection else {
        println!("No regret protection active");
        return;
    };
    let remaining = protection
        .remaining(now)
        .map(format_duration)
        .unwrap_or_else(|| "until the window ends".to_string());
    println!("Protected ({}, {remaining})", protection.reason);
    if !protection.message.is_empty() {
        println!("{}", protection.message);
    }
    if !protection.enforced {
        let cause = unenforced_cause(enforcement.authorization, enforcement.has_restrictions);
        eprintln!("warning: {cause}; nothing is blocked");
    }
}

pub fn run(action: RegretAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_from(&data_dir()?)?;
    let engine = open_engine()?;
    let guard = engine.regret();
    let now = engine.clock().now();
    let enforcement = || Enforcement {
        authorization: engine.policy().authorization_status(),
        has_restrictions: !config.regret.restriction_set().is_empty(),
    };

    match action {
        RegretAction::Add { window, message } => {
            let added = guard.add_window(window.to_kind()?, &message)?;
            println!("Window added: {}", added.id);
        }
        RegretAction::List { json } => {
            let windows = guard.windows();
            if json {
                return print_json(&windows);
            }
            if windows.is_empty() {
                println!("No regret windows");
            }
            for window in &windows {
                print_window(window);
            }
        }
        RegretAction::Update { id, window, message } => {
            let current = guard.window(&id).ok_or_else(|| format!("regret window not found: {id}"))?;
            let message = message.unwrap_or(current.message);
            let updated = guard.update_window(&id, window.to_kind()?, &message)?;
            print_window(&updated);
        }
        RegretAction::Enable { id } => {
            print_window(&guard.set_window_enabled(&id, true)?);
        }
        RegretAction::Disable { id } => {
            print_window(&guard.set_window_enabled(&id, false)?);
        }
        RegretAction::Remove { id } => {
            guard.remove_window(&id)?;
            println!("Window removed: {id}");
        }
        RegretAction::Check { json } => {
            let protection = engine.tick()?;
            if json {
                return print_json(&protection);
            }
            print_protection(protection.as_ref(), now, &enforcement());
        }
        RegretAction::Complete => {
            let protection = guard.on_session_completed()?;
            print_protection(protection.as_ref(), now, &enforcement());
        }
        RegretAction::End => {
            guard.end_protection_early()?;
            print_protection(guard.protection().as_ref(), now, &enforcement());
        }
        RegretAction::Ack => {
            let protection = guard.acknowledge()?;
            println!("Acknowledged window {}", protection.window_id);
        }
        RegretAction::Watch => {
            let period = std::time::Duration::from_secs(config.regret.check_interval_secs);
            let mut active: Option<(String, bool)> = None;
            run_every(period, || {
                let protection = engine.tick()?;
                let current = protection.as_ref().map(|p| (p.window_id.clone(), p.enforced));
                if current != active {
                    print_protection(protection.as_ref(), engine.clock().now(), &enforcement());
                    active = current;
                }
                Ok(())
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unenforced_cause_names_missing_authorization_first() {
        for status in [AuthorizationStatus::NotDetermined, AuthorizationStatus::Denied] {
            assert!(unenforced_cause(status, true).contains("authorization not granted"));
            assert!(unenforced_cause(status, false).contains("authorization not granted"));
        }
        assert_eq!(
            unenforced_cause(AuthorizationStatus::Approved, false),
            "no regret restrictions configured"
        );
        assert!(unenforced_cause(AuthorizationStatus::Approved, true).contains("could not be applied"));
    }
}
