use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "footprint", version, about = "Recurring carbon-footprint ledger")]
struct Cli {
    /// Reconcile against this date instead of the local date (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Settle absences and bring every active rule up to date
    Sweep,
    /// Linked entities (homes, vehicles, food items)
    Ref {
        #[command(subcommand)]
        action: commands::reference::RefAction,
    },
    /// Recurring events
    Rule {
        #[command(subcommand)]
        action: commands::rule::RuleAction,
    },
    /// Absences that pause a rule
    Absence {
        #[command(subcommand)]
        action: commands::absence::AbsenceAction,
    },
    /// Dated ledger entries
    Ledger {
        #[command(subcommand)]
        action: commands::ledger::LedgerAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOOTPRINT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let today = commands::today(cli.today);
    let result = match cli.command {
        Commands::Sweep => commands::sweep::run(today),
        Commands::Ref { action } => commands::reference::run(action),
        Commands::Rule { action } => commands::rule::run(action, today),
        Commands::Absence { action } => commands::absence::run(action, today),
        Commands::Ledger { action } => commands::ledger::run(action, today),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
