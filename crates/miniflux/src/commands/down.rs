use super::{Context, SecretArgs, SettingsArgs};
use colored::Colorize;
use miniflux_cloud::ActionType;
use miniflux_service::{ComponentResource, Intent, preview_destroy};
use std::io::Write;

pub async fn handle(
    ctx: &Context,
    name: &str,
    secrets: SecretArgs,
    yes: bool,
) -> anyhow::Result<()> {
    let request = secrets.into_request(name, SettingsArgs::default().into_settings())?;
    let service = ctx.service().await?;
    let plan = service.build_plan(&request)?;

    let lock = ctx.states.acquire_lock(name, "down").await?;
    let previous = ctx.states.load(name).await?;

    let deletions: Vec<_> = preview_destroy(&plan, &previous)
        .into_iter()
        .filter(|a| a.action_type == ActionType::Delete)
        .collect();
    if deletions.is_empty() {
        lock.release().await?;
        println!("{}", format!("Nothing to delete for '{}'", name).green());
        return Ok(());
    }

    println!("{}", format!("Deleting '{}':", name).yellow());
    for action in &deletions {
        super::print_action(action);
    }

    if !yes && !confirm("Continue?")? {
        lock.release().await?;
        println!("Cancelled");
        return Ok(());
    }

    super::cancel_on_ctrl_c(service.cancel_handle());
    let outcome = service.apply(&plan, previous, Intent::Delete).await;
    let (state, log, result) = match outcome {
        Ok(applied) => (applied.state, applied.log, Ok(())),
        Err(failure) => (failure.state, failure.log, Err(failure.error)),
    };

    ctx.states.save(&state).await?;
    lock.release().await?;
    super::print_log(&log);

    match result {
        Ok(()) => {
            println!();
            println!("{}", "✓ Deployment removed".green().bold());
            Ok(())
        }
        Err(error) => {
            println!();
            println!("{}", "✗ Teardown stopped".red().bold());
            Err(error.into())
        }
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
