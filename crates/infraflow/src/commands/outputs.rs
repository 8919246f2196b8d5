use crate::project::{GlobalOptions, Project};
use crate::utils;
use colored::Colorize;

/// 直近の適用で記録された出力を表示
pub async fn handle(options: &GlobalOptions, json: bool) -> anyhow::Result<()> {
    let project = Project::load()?;
    let state = project.state_manager(options).load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.outputs)?);
        return Ok(());
    }

    if state.outputs.is_empty() {
        println!("{}", "No outputs recorded. Run `infra up` first.".yellow());
        return Ok(());
    }
    utils::print_outputs(&state.outputs);
    Ok(())
}
