use super::Context;
use colored::Colorize;
use miniflux_service::compose;

pub async fn handle(ctx: &Context, name: &str, json: bool) -> anyhow::Result<()> {
    let state = ctx.states.load(name).await?;
    let output = compose(&state)?;

    if json {
        let value = serde_json::json!({
            "name": name,
            "endpoint": output.endpoint,
            "url": output.url(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", output.endpoint.cyan());
    }
    Ok(())
}
