use super::Context;
use colored::Colorize;

pub async fn handle(ctx: &Context, name: &str, json: bool) -> anyhow::Result<()> {
    let state = ctx.states.load(name).await?;

    if json {
        println!("{}", state.to_json()?);
        return Ok(());
    }

    if state.resources.is_empty() {
        println!("{}", format!("No state recorded for '{}'", name).dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "State of '{}' (updated {})",
            name,
            state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .bold()
    );
    for (node, record) in &state.resources {
        println!();
        println!(
            "  {} ({}) {}",
            node.cyan().bold(),
            record.kind,
            super::status_label(record.status)
        );
        if let Some(id) = &record.id {
            println!("    id: {}", id);
        }
        for (key, value) in &record.outputs {
            println!("    {}: {}", key, value);
        }
        if let Some(error) = &record.error {
            println!("    error: {}", error.red());
        }
    }
    Ok(())
}
