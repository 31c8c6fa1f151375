use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "focuslock", version, about = "focuslock focus enforcement CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summary of authorization, contexts, schedules and guards
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Blocking contexts and authorization
    Policy {
        #[command(subcommand)]
        action: commands::policy::PolicyAction,
    },
    /// Recurring blocking schedules
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Schedule interval callbacks (monitor process)
    Monitor {
        #[command(subcommand)]
        action: commands::monitor::MonitorAction,
    },
    /// Committed sessions and emergency exits
    Commitment {
        #[command(subcommand)]
        action: commands::commitment::CommitmentAction,
    },
    /// Regret prevention windows
    Regret {
        #[command(subcommand)]
        action: commands::regret::RegretAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FOCUSLOCK_LOG")
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status { json } => commands::status::run(json),
        Commands::Policy { action } => commands::policy::run(action),
        Commands::Schedule { action } => commands::schedule::run(action),
        Commands::Monitor { action } => commands::monitor::run(action),
        Commands::Commitment { action } => commands::commitment::run(action),
        Commands::Regret { action } => commands::regret::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
