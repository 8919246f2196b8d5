use crate::project::{GlobalOptions, Project};
use crate::utils;

pub async fn handle(options: &GlobalOptions) -> anyhow::Result<()> {
    let project = Project::load()?;
    project.print_header();

    let state = project.state_manager(options).load().await?;
    let (_, engine) = project.engine(options).await?;
    let plan = engine.plan(&project.loaded.stack, &state)?;

    println!();
    utils::print_plan(&plan);
    Ok(())
}
