use super::{Context, SecretArgs, SettingsArgs};
use colored::Colorize;
use miniflux_cloud::ResourceStatus;

pub async fn handle(ctx: &Context, name: &str, secrets: SecretArgs) -> anyhow::Result<()> {
    let request = secrets.into_request(name, SettingsArgs::default().into_settings())?;
    let service = ctx.service().await?;

    let lock = ctx.states.acquire_lock(name, "refresh").await?;
    let previous = ctx.states.load(name).await?;

    let outcome = service.refresh(&request, previous).await;
    let (state, result) = match outcome {
        Ok(applied) => (applied.state, Ok(())),
        Err(failure) => (failure.state, Err(failure.error)),
    };
    ctx.states.save(&state).await?;
    lock.release().await?;

    println!("{}", format!("State of '{}' after refresh:", name).bold());
    for (node, record) in &state.resources {
        println!("  {} {}", node.cyan(), super::status_label(record.status));
    }

    let vanished = state
        .resources
        .values()
        .any(|r| r.status == ResourceStatus::Deleted && r.id.is_some());
    if vanished {
        println!();
        println!(
            "{}",
            format!("Some resources are gone; run `miniflux up {}` to recreate them.", name)
                .yellow()
        );
    }

    result.map_err(Into::into)
}
