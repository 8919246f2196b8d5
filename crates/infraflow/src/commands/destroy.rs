use crate::project::{GlobalOptions, Project};
use crate::utils;
use colored::Colorize;

/// 記録済みリソースを依存元から順に削除
pub async fn handle(options: &GlobalOptions, yes: bool) -> anyhow::Result<()> {
    let project = Project::load()?;
    project.print_header();

    let manager = project.state_manager(options);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    if state.is_empty() {
        println!("{}", "Nothing to destroy.".green());
        lock.release().await?;
        return Ok(());
    }

    let (_, engine) = project.engine(options).await?;
    let plan = engine.destroy_plan(&state)?;
    println!();
    utils::print_plan(&plan);

    if !yes {
        println!();
        println!(
            "{}",
            "⚠ Warning: every resource above will be deleted".red().bold()
        );
        println!("  Pass --yes to destroy them.");
        lock.release().await?;
        return Ok(());
    }

    println!();
    let result = engine.destroy(&mut state).await;
    manager.save(&state).await?;
    lock.release().await?;
    let result = result?;

    utils::print_apply_result(&result);
    if !result.is_success() {
        anyhow::bail!("destroy failed: {} resource(s) remain", state.resources.len());
    }

    println!();
    println!("{}", "✓ Destroy complete".green().bold());
    Ok(())
}
