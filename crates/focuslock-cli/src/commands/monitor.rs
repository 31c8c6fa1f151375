//! Monitor process entry points.
//!
//! These commands never open the schedule database. They see only what the
//! main process published to the shared state bridge.

use clap::Subcommand;
use focuslock_core::{data_dir, Config, MonitorHost, MonitorOutcome};

use super::{print_json, run_every};

#[derive(Subcommand)]
pub enum MonitorAction {
    /// Deliver an interval start callback for an activity
    Start {
        /// Activity (schedule) name
        activity: String,
    },
    /// Deliver an interval end callback for an activity
    End {
        activity: String,
    },
    /// Deliver every boundary crossed since the last poll
    Poll,
    /// Keep polling until interrupted
    Run {
        /// Seconds between polls
        #[arg(long, default_value = "30")]
        interval: u64,
    },
    /// Show the diagnostic log
    Log {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the diagnostic log
    Clear,
}

fn open_host() -> Result<MonitorHost, Box<dyn std::error::Error>> {
    let dir = data_dir()?;
    // A broken config file must not stop enforcement.
    let config = Config::load_or_default(&dir);
    Ok(MonitorHost::open_local(&dir, &config)?)
}

fn report(outcome: &MonitorOutcome) {
    match outcome {
        MonitorOutcome::Applied { .. } | MonitorOutcome::Removed { .. } => println!("{outcome}"),
        _ => eprintln!("warning: {outcome}"),
    }
}

pub fn run(action: MonitorAction) -> Result<(), Box<dyn std::error::Error>> {
    let host = open_host()?;
    match action {
        MonitorAction::Start { activity } => report(&host.monitor().interval_did_start(&activity)),
        MonitorAction::End { activity } => report(&host.monitor().interval_did_end(&activity)),
        MonitorAction::Poll => {
            for outcome in host.poll()? {
                report(&outcome);
            }
        }
        MonitorAction::Run { interval } => {
            if interval == 0 {
                return Err("interval must be greater than zero".into());
            }
            run_every(std::time::Duration::from_secs(interval), || {
                for outcome in host.poll()? {
                    report(&outcome);
                }
                Ok(())
            })?;
        }
        MonitorAction::Log { json } => {
            let entries = host.monitor().diagnostic_log()?;
            if json {
                return print_json(&entries);
            }
            for entry in &entries {
                println!(
                    "{}  {}  {}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.event,
                    entry.activity,
                    entry.outcome
                );
            }
        }
        MonitorAction::Clear => {
            host.monitor().clear_diagnostic_log()?;
            println!("Diagnostic log cleared");
        }
    }
    Ok(())
}
