use super::{Context, SecretArgs, SettingsArgs};
use colored::Colorize;
use miniflux_cloud::PlanSummary;
use miniflux_service::{graph, preview, preview_destroy};

pub async fn handle(
    ctx: &Context,
    name: &str,
    secrets: SecretArgs,
    settings: SettingsArgs,
    destroy: bool,
) -> anyhow::Result<()> {
    let request = secrets.into_request(name, settings.into_settings())?;
    let plan = graph::build(&request)?;
    let state = ctx.states.load(name).await?;

    let actions = if destroy {
        preview_destroy(&plan, &state)
    } else {
        preview(&plan, &state)
    };

    println!("{}", format!("Plan for '{}':", name).bold());
    for action in &actions {
        super::print_action(action);
    }

    let summary = PlanSummary::from_actions(actions.iter());
    println!();
    if summary.has_changes() {
        println!("{}", summary.to_string().yellow());
    } else {
        println!("{}", summary.to_string().green());
    }
    Ok(())
}
