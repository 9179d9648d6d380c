mod cmd;
mod git;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    budget::BudgetSubcommand, config::ConfigSubcommand, policy::PolicySubcommand,
    waiver::WaiverSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "caws",
    about = "Quality gates for AI-assisted development — risk-tier budgets, policies, and waivers",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .caws/ or .git/)
    #[arg(long, global = true, env = "CAWS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .caws/ with a default policy and an empty waiver directory
    Init,

    /// Inspect and validate the budget policy
    Policy {
        #[command(subcommand)]
        subcommand: PolicySubcommand,
    },

    /// Author, list, and revoke waivers
    Waiver {
        #[command(subcommand)]
        subcommand: WaiverSubcommand,
    },

    /// Check a change against its risk-tier budget
    Budget {
        #[command(subcommand)]
        subcommand: BudgetSubcommand,
    },

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Policy { subcommand } => cmd::policy::run(&root, subcommand, cli.json),
        Commands::Waiver { subcommand } => cmd::waiver::run(&root, subcommand, cli.json),
        Commands::Budget { subcommand } => cmd::budget::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
