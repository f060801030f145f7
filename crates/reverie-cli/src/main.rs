use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod bootstrap;
mod commands;

#[derive(Parser)]
#[command(name = "reverie")]
#[command(about = "Reverie - offline self-improvement for robot behaviors", long_about = None)]
struct Cli {
    /// Directory holding recorded sessions (overrides config and platform default)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect recorded sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Show failure statistics across all sessions
    Stats,
    /// Run one dreaming cycle for a behavior file
    Dream {
        /// Path to the behavior file
        behavior: PathBuf,
        /// Write the best variant back when it clears the threshold
        #[arg(long)]
        auto_apply: bool,
        /// Minimum improvement in percent for auto-apply (inclusive)
        #[arg(long)]
        threshold: Option<f64>,
        /// Maximum number of generations
        #[arg(long)]
        generations: Option<u32>,
    },
    /// Dream about several behaviors in turn, skipping those without enough failures
    Schedule {
        #[arg(required = true)]
        behaviors: Vec<PathBuf>,
    },
    /// Store an externally recorded session (JSON)
    Import {
        session: PathBuf,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List sessions, most recent first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List finalized sessions with failures, most recent first
    Failed {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let services = bootstrap::Services::build(cli.data_dir, cli.config).await?;

    match cli.command {
        Commands::Sessions { action } => match action {
            SessionsAction::List { limit } => commands::sessions::list(&services, limit).await?,
            SessionsAction::Failed { limit } => commands::sessions::failed(&services, limit).await?,
        },
        Commands::Stats => commands::stats::show(&services).await?,
        Commands::Dream {
            behavior,
            auto_apply,
            threshold,
            generations,
        } => {
            let overrides = commands::dream::DreamOverrides {
                auto_apply,
                threshold,
                generations,
            };
            commands::dream::run(&services, behavior, overrides).await?
        }
        Commands::Schedule { behaviors } => commands::schedule::run(&services, &behaviors).await?,
        Commands::Import { session } => commands::import::run(&services, &session).await?,
    }

    Ok(())
}
