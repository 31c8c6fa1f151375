use clap::Subcommand;
use focuslock_core::commitment::format_price;
use focuslock_core::CommitmentTier;

use super::{format_duration, open_engine, print_json, RestrictionArgs};

#[derive(Subcommand)]
pub enum CommitmentAction {
    /// Show or change commitment settings
    Config {
        /// Offer paid emergency exits
        #[arg(long)]
        enabled: Option<bool>,
        /// Minimum focus before an exit: 5m, 10m, 15m, 30m, 60m or never
        #[arg(long)]
        tier: Option<CommitmentTier>,
    },
    /// Start a committed session
    Begin {
        /// Planned length in minutes
        #[arg(long)]
        minutes: i64,
        /// Session ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        #[command(flatten)]
        restrictions: RestrictionArgs,
    },
    /// Show the current session
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Buy an emergency exit from the current session
    Exit {
        session_id: String,
    },
    /// Mark a session as run to completion
    Complete {
        session_id: String,
    },
    /// Show emergency exit history
    History {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rate how you felt about an exit, 1 to 5
    Rate {
        /// Exit number as shown by `history`
        exit_id: i64,
        rating: u8,
    },
    /// Show the price of the next emergency exit
    Price,
}

pub fn run(action: CommitmentAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let guard = engine.commitment();
    let now = engine.clock().now();

    match action {
        CommitmentAction::Config { enabled, tier } => {
            let current = guard.config();
            let config = if enabled.is_some() || tier.is_some() {
                guard.update_config(
                    enabled.unwrap_or(current.is_enabled),
                    tier.unwrap_or(current.minimum_tier),
                )?
            } else {
                current
            };
            println!("Exits enabled: {}", config.is_enabled);
            println!("Minimum focus: {}", config.minimum_tier);
            println!(
                "Exits this month ({}): {}",
                config.last_reset_month, config.exits_used_this_month
            );
        }
        CommitmentAction::Begin {
            minutes,
            id,
            restrictions,
        } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let session = guard.begin_session(&id, chrono::Duration::minutes(minutes), &restrictions.to_set())?;
            println!("Session started: {}", session.session_id);
            println!("Ends at: {}", session.ends_at.format("%Y-%m-%d %H:%M:%S UTC"));
            match session.time_until_exit(now) {
                Some(wait) => println!("Emergency exit available in {}", format_duration(wait)),
                _ => println!("No emergency exit for this session"),
            }
        }
        CommitmentAction::Status { json } => {
            let session = guard.session()?;
            if json {
                return print_json(&session);
            }
            let Some(session) = session else {
                println!("No commitment session");
                return Ok(());
            };
            let phase = session.phase_at(now);
            println!("Session: {}", session.session_id);
            println!("Phase: {phase}");
            if !phase.is_terminal() {
                println!("Remaining: {}", format_duration(session.remaining(now)));
                if let Some(wait) = session.time_until_exit(now) {
                    println!("Exit unlocks in: {}", format_duration(wait));
                }
            }
        }
        CommitmentAction::Exit { session_id } => {
            let session = guard
                .session()?
                .filter(|s| s.session_id == session_id)
                .ok_or_else(|| format!("no commitment session with id {session_id}"))?;
            let receipt = guard.request_emergency_exit(
                &session_id,
                session.elapsed(now),
                session.remaining(now),
            )?;
            println!(
                "Exit #{} after {} for {} (transaction {})",
                receipt.record.id,
                format_duration(receipt.record.focused()),
                format_price(receipt.record.price_paid_cents),
                receipt.transaction_id
            );
            println!("Next exit this month: {}", format_price(receipt.next_price_cents));
            if let Some(warning) = guard.pattern_warning()? {
                eprintln!("{warning}");
            }
        }
        CommitmentAction::Complete { session_id } => {
            let protection = engine.focus_session_completed(&session_id)?;
            println!("Session {session_id} completed");
            if let Some(protection) = protection {
                println!("Regret protection active: {}", protection.message);
            }
        }
        CommitmentAction::History { json } => {
            let history = guard.history()?;
            if json {
                return print_json(&history);
            }
            if history.is_empty() {
                println!("No emergency exits");
            }
            for record in history.iter().rev() {
                let rating = record
                    .rating
                    .map_or_else(|| "-".to_string(), |r| format!("{r}/5"));
                println!(
                    "#{}  {}  {}  focused {}  left {}  {}  {rating}",
                    record.id,
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    record.session_id,
                    format_duration(record.focused()),
                    format_duration(record.remaining()),
                    format_price(record.price_paid_cents),
                );
            }
        }
        CommitmentAction::Rate { exit_id, rating } => {
            guard.rate_exit(exit_id, rating)?;
            println!("ok");
        }
        CommitmentAction::Price => {
            let cents = guard.current_price()?;
            println!("{}  ({})", format_price(cents), guard.product_id_for(cents));
        }
    }
    Ok(())
}
