use focuslock_core::commitment::format_price;

use super::{format_duration, open_engine, print_json};

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let status = engine.status()?;
    if json {
        return print_json(&status);
    }

    println!("Authorization: {}", status.authorization);
    if status.active_contexts.is_empty() {
        println!("Active contexts: none");
    } else {
        let names: Vec<String> = status.active_contexts.iter().map(|c| c.to_string()).collect();
        println!("Active contexts: {}", names.join(", "));
    }
    println!("Effective policy: {}", status.effective_policy);
    if !status.running_schedules.is_empty() {
        println!("Running schedules: {}", status.running_schedules.join(", "));
    }
    match status.commitment_phase {
        Some(phase) => println!("Commitment session: {phase}"),
        None => println!("Commitment session: none"),
    }
    println!("Next emergency exit: {}", format_price(status.next_exit_price_cents));
    if let Some(protection) = &status.protection {
        let remaining = protection
            .remaining(engine.clock().now())
            .map(format_duration)
            .unwrap_or_else(|| "until the window ends".to_string());
        println!("Regret protection: {} ({remaining})", protection.reason);
    }
    Ok(())
}
