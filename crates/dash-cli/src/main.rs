use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dash_engine::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "dashq")]
#[command(author, version, about = "Inspect dashboard query definitions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every query definition and report problems
    Check {
        /// Query definitions directory (overrides the config file)
        #[arg(short, long)]
        queries: Option<PathBuf>,
    },

    /// Print one query definition
    Show {
        /// Query id (file name without extension)
        id: String,

        /// Query definitions directory (overrides the config file)
        #[arg(short, long)]
        queries: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Check { queries } => {
            let dir = queries.unwrap_or(config.queries_dir);
            commands::check(&dir)?;
        }
        Commands::Show { id, queries } => {
            let dir = queries.unwrap_or(config.queries_dir);
            commands::show(&dir, &id)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "dashq=debug,dash_core=debug,dash_cache=debug,dash_engine=debug"
    } else {
        "dashq=info,dash_core=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
