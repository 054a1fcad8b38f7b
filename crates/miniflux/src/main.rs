mod commands;

use clap::{Parser, Subcommand};
use commands::{Context, SecretArgs, SettingsArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "miniflux")]
#[command(about = "Provision a Miniflux deployment as one composite resource", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long, global = true, env = "MINIFLUX_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a deployment
    Up {
        /// Deployment name
        name: String,
        #[command(flatten)]
        secrets: SecretArgs,
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Show what `up` (or `down` with --destroy) would change
    Plan {
        /// Deployment name
        name: String,
        #[command(flatten)]
        secrets: SecretArgs,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Preview a teardown instead
        #[arg(long)]
        destroy: bool,
    },
    /// Print the endpoint of a deployment
    Output {
        /// Deployment name
        name: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile recorded state with what exists in the cloud
    Refresh {
        /// Deployment name
        name: String,
        #[command(flatten)]
        secrets: SecretArgs,
    },
    /// Delete every resource of a deployment
    Down {
        /// Deployment name
        name: String,
        #[command(flatten)]
        secrets: SecretArgs,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the recorded state of a deployment
    State {
        /// Deployment name
        name: String,
        /// Print the raw state file
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("miniflux {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if let Some(dir) = &cli.project_dir {
        std::env::set_current_dir(dir)?;
    }
    let ctx = Context::load()?;

    match cli.command {
        Commands::Up {
            name,
            secrets,
            settings,
        } => commands::up::handle(&ctx, &name, secrets, settings).await,
        Commands::Plan {
            name,
            secrets,
            settings,
            destroy,
        } => commands::plan::handle(&ctx, &name, secrets, settings, destroy).await,
        Commands::Output { name, json } => commands::output::handle(&ctx, &name, json).await,
        Commands::Refresh { name, secrets } => commands::refresh::handle(&ctx, &name, secrets).await,
        Commands::Down { name, secrets, yes } => {
            commands::down::handle(&ctx, &name, secrets, yes).await
        }
        Commands::State { name, json } => commands::state::handle(&ctx, &name, json).await,
        Commands::Version => Ok(()),
    }
}
