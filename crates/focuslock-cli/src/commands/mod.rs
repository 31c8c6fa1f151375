pub mod commitment;
pub mod config;
pub mod monitor;
pub mod policy;
pub mod regret;
pub mod schedule;
pub mod status;

use clap::Args;
use focuslock_core::{data_dir, Config, FocusEngine, RestrictionSet};

/// Restriction flags shared by every command that takes a restriction set.
#[derive(Args, Debug, Clone, Default)]
pub struct RestrictionArgs {
    /// App token to block (repeatable)
    #[arg(long = "app")]
    pub apps: Vec<String>,
    /// Category token to block (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<String>,
    /// Web domain to block (repeatable)
    #[arg(long = "domain")]
    pub domains: Vec<String>,
}

impl RestrictionArgs {
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty() && self.categories.is_empty() && self.domains.is_empty()
    }

    pub fn to_set(&self) -> RestrictionSet {
        RestrictionSet::new()
            .with_apps(self.apps.iter().cloned())
            .with_categories(self.categories.iter().cloned())
            .with_domains(self.domains.iter().cloned())
    }
}

/// Open the main-process engine on the data directory.
pub fn open_engine() -> Result<FocusEngine, Box<dyn std::error::Error>> {
    let dir = data_dir()?;
    let config = Config::load_from(&dir)?;
    Ok(FocusEngine::open_local(&dir, &config)?)
}

/// `1h 05m`, `12m 30s`, `45s`.
pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Call `tick` every `period` until it fails or Ctrl-C arrives.
pub fn run_every<F>(period: std::time::Duration, mut tick: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnMut() -> Result<(), Box<dyn std::error::Error>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = tick() {
                        return Err(e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, stopping");
                    return Ok(());
                }
            }
        }
    })
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_picks_largest_units() {
        assert_eq!(format_duration(chrono::Duration::seconds(45)), "45s");
        assert_eq!(format_duration(chrono::Duration::seconds(750)), "12m 30s");
        assert_eq!(format_duration(chrono::Duration::minutes(65)), "1h 05m");
        assert_eq!(format_duration(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn restriction_args_build_a_set() {
        let args = RestrictionArgs {
            apps: vec!["appX".into()],
            categories: vec![],
            domains: vec!["News.Example.com".into()],
        };
        let set = args.to_set();
        assert!(set.contains_app("appX"));
        assert!(set.contains_domain("news.example.com"));
        assert!(!args.is_empty());
    }
}
