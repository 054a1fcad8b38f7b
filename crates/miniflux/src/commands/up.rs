use super::{Context, SecretArgs, SettingsArgs};
use colored::Colorize;
use miniflux_service::{ComponentResource, Intent};

pub async fn handle(
    ctx: &Context,
    name: &str,
    secrets: SecretArgs,
    settings: SettingsArgs,
) -> anyhow::Result<()> {
    let request = secrets.into_request(name, settings.into_settings())?;
    let service = ctx.service().await?;
    let plan = service.build_plan(&request)?;

    println!("{}", format!("Provisioning '{}'...", name).yellow());

    let lock = ctx.states.acquire_lock(name, "up").await?;
    let previous = ctx.states.load(name).await?;
    super::cancel_on_ctrl_c(service.cancel_handle());

    let outcome = service.apply(&plan, previous, Intent::Converge).await;
    let (state, log, result) = match outcome {
        Ok(applied) => (applied.state, applied.log, Ok(applied.result)),
        Err(failure) => (failure.state, failure.log, Err(failure.error)),
    };

    // Partial progress is recorded even when the run failed
    ctx.states.save(&state).await?;
    lock.release().await?;
    super::print_log(&log);

    match result {
        Ok(Some(output)) => {
            println!();
            println!("{}", "✓ Deployment ready".green().bold());
            println!("  endpoint: {}", output.endpoint.cyan());
            println!("  url:      {}", output.url());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(error) => {
            println!();
            println!("{}", "✗ Provisioning stopped".red().bold());
            if error.is_recoverable() {
                println!("  Run `miniflux up {}` again to continue.", name);
            }
            Err(error.into())
        }
    }
}
