use clap::Subcommand;
use focuslock_core::{data_dir, AuthorizationStatus, BlockingContext, FileCapability};

use super::{open_engine, print_json, RestrictionArgs};

#[derive(Subcommand)]
pub enum PolicyAction {
    /// Request restriction authorization
    Authorize,
    /// Withdraw restriction authorization (existing restrictions stay)
    Revoke,
    /// Replace the restrictions of one blocking context
    Apply {
        /// Context: timer, schedule, regret-prevention, commitment, accountability
        context: BlockingContext,
        #[command(flatten)]
        restrictions: RestrictionArgs,
    },
    /// Clear one blocking context
    Remove {
        context: BlockingContext,
    },
    /// Show the active contexts and the effective policy
    Show {
        /// Only this context
        #[arg(long)]
        context: Option<BlockingContext>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: PolicyAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PolicyAction::Authorize => {
            let engine = open_engine()?;
            let status = engine.policy().request_authorization();
            println!("Authorization: {status}");
            if status != AuthorizationStatus::Approved {
                return Err("authorization was not granted".into());
            }
        }
        PolicyAction::Revoke => {
            FileCapability::in_dir(&data_dir()?).revoke()?;
            println!("Authorization revoked");
        }
        PolicyAction::Apply {
            context,
            restrictions,
        } => {
            if restrictions.is_empty() {
                return Err("nothing to apply; pass --app, --category or --domain".into());
            }
            let engine = open_engine()?;
            let report = engine.policy().apply_context(context, &restrictions.to_set())?;
            for failure in &report.failed {
                eprintln!("warning: {} not applied: {}", failure.facet, failure.reason);
            }
            println!("Applied {context}: {}", engine.policy().slot(context).unwrap_or_default());
        }
        PolicyAction::Remove { context } => {
            let engine = open_engine()?;
            if engine.policy().remove_context(context) {
                println!("Removed {context}");
            } else {
                println!("{context} was not active");
            }
        }
        PolicyAction::Show { context, json } => {
            let engine = open_engine()?;
            let policy = engine.policy();
            let set = match context {
                Some(context) => policy.slot(context).unwrap_or_default(),
                None => policy.effective_policy(),
            };
            if json {
                return print_json(&set);
            }
            if context.is_none() {
                for active in policy.active_contexts() {
                    println!("{active}: {}", policy.slot(active).unwrap_or_default());
                }
            }
            println!("{}: {set}", context.map_or("effective".to_string(), |c| c.to_string()));
        }
    }
    Ok(())
}
