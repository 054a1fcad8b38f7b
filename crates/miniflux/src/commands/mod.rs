pub mod down;
pub mod output;
pub mod plan;
pub mod refresh;
pub mod state;
pub mod up;

use clap::Args;
use colored::Colorize;
use miniflux_cloud::{Action, ActionLog, ActionType, ResourceStatus, RetryConfig, StateManager};
use miniflux_cloud_local::LocalCloud;
use miniflux_config::Config;
use miniflux_service::{
    CancelHandle, MinifluxService, OrchestratorConfig, ServiceRequest, ServiceSettings,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Secrets for a deployment; read from the environment when not given
#[derive(Args)]
pub struct SecretArgs {
    /// Miniflux administrator password
    #[arg(long, env = "MINIFLUX_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: String,

    /// Database password
    #[arg(long, env = "MINIFLUX_DB_PASSWORD", hide_env_values = true)]
    db_password: String,
}

impl SecretArgs {
    /// Validated request; the raw secrets are moved into handles
    pub fn into_request(self, name: &str, settings: ServiceSettings) -> anyhow::Result<ServiceRequest> {
        let request =
            ServiceRequest::new(name, self.admin_password, self.db_password)?.with_settings(settings)?;
        Ok(request)
    }
}

/// Overrides for the application settings
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Container image
    #[arg(long)]
    image: Option<String>,

    /// Port the container listens on
    #[arg(long)]
    port: Option<u16>,

    /// CPU units per task
    #[arg(long)]
    cpu: Option<u32>,

    /// Memory per task in MiB
    #[arg(long = "memory")]
    memory_mb: Option<u32>,

    /// Number of tasks to keep running
    #[arg(long)]
    desired_count: Option<u32>,

    /// Database engine
    #[arg(long)]
    engine: Option<String>,
}

impl SettingsArgs {
    pub fn into_settings(self) -> ServiceSettings {
        let defaults = ServiceSettings::default();
        ServiceSettings {
            image: self.image.unwrap_or(defaults.image),
            container_port: self.port.unwrap_or(defaults.container_port),
            cpu: self.cpu.unwrap_or(defaults.cpu),
            memory_mb: self.memory_mb.unwrap_or(defaults.memory_mb),
            desired_count: self.desired_count.unwrap_or(defaults.desired_count),
            database_engine: self.engine.unwrap_or(defaults.database_engine),
        }
    }
}

/// Everything a command needs from the environment
pub struct Context {
    pub project_root: PathBuf,
    pub config: Config,
    pub states: StateManager,
}

impl Context {
    pub fn load() -> anyhow::Result<Self> {
        let project_root = std::env::current_dir()?;
        let config = miniflux_config::load_config()?;
        if let Some(source) = &config.source {
            tracing::debug!(path = %source.display(), "Using config file");
        }
        let states = StateManager::with_state_dir(config.state_dir(&project_root));
        Ok(Self {
            project_root,
            config,
            states,
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let retry = &self.config.retry;
        OrchestratorConfig {
            retry: RetryConfig {
                max_attempts: retry.max_attempts,
                initial_delay: retry.initial_delay(),
                max_delay: retry.max_delay(),
                backoff_multiplier: retry.backoff_multiplier,
            },
            max_concurrency: self.config.max_concurrency,
        }
    }

    pub async fn service(&self) -> anyhow::Result<MinifluxService> {
        let inventory = self.config.inventory_file(&self.project_root);
        let cloud = Arc::new(LocalCloud::open(&inventory).await?);
        Ok(MinifluxService::new(cloud).with_config(self.orchestrator_config()))
    }
}

/// Stop starting new child operations on Ctrl-C
pub fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "Interrupted; waiting for running operations to finish...".yellow()
            );
            handle.cancel();
        }
    });
}

pub fn action_symbol(action_type: ActionType) -> colored::ColoredString {
    match action_type {
        ActionType::Create => "+".green(),
        ActionType::Update => "~".yellow(),
        ActionType::Delete => "-".red(),
        ActionType::Read | ActionType::NoOp => "=".dimmed(),
    }
}

pub fn print_action(action: &Action) {
    println!(
        "  {} {} ({}) {}",
        action_symbol(action.action_type),
        action.node.cyan(),
        action.kind,
        action.action_type.to_string().dimmed()
    );
}

pub fn print_log(log: &ActionLog) {
    for action in &log.succeeded {
        if action.action_type != ActionType::NoOp {
            println!("  ✓ {} {}", action.action_type, action.node.cyan());
        }
    }
    for (action, error) in &log.failed {
        println!("  ✗ {} {}: {}", action.action_type, action.node.cyan(), error.red());
    }
    for node in &log.skipped {
        println!("  {} {} (not started)", "-".dimmed(), node.cyan());
    }
    println!("{}", format!("  {} ({} ms)", log.summary(), log.duration_ms).dimmed());
}

pub fn status_label(status: ResourceStatus) -> colored::ColoredString {
    match status {
        ResourceStatus::Ready => "ready".green(),
        ResourceStatus::Pending => "pending".yellow(),
        ResourceStatus::Failed => "failed".red(),
        ResourceStatus::Deleted => "deleted".dimmed(),
    }
}
