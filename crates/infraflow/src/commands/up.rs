use crate::project::{GlobalOptions, Project};
use crate::utils;
use colored::Colorize;
use infraflow_cloud::CloudProvider;

/// プランを表示し、`--yes` 指定時に適用
pub async fn handle(options: &GlobalOptions, yes: bool) -> anyhow::Result<()> {
    let project = Project::load()?;
    project.print_header();

    let manager = project.state_manager(options);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;
    let (provider, engine) = project.engine(options).await?;

    let auth = engine.provider().check_auth().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "{} is not ready: {}",
            provider.display_name(),
            auth.error.unwrap_or_default()
        );
    }

    let plan = engine.plan(&project.loaded.stack, &state)?;
    println!();
    utils::print_plan(&plan);

    if plan.has_changes && !yes {
        println!();
        println!("Pass --yes to apply these changes");
        lock.release().await?;
        return Ok(());
    }

    if plan.has_changes {
        println!();
        println!(
            "{}",
            format!("Applying with {}...", provider.display_name()).blue()
        );
    }

    let report = engine.apply(&project.loaded.stack, &mut state).await;
    // 失敗前に適用した分もステートに残す
    manager.save(&state).await?;
    lock.release().await?;
    let report = report?;

    utils::print_apply_result(&report.result);
    for name in &report.skipped {
        println!("  {} {} {}", "·".dimmed(), name, "(inputs unchanged)".dimmed());
    }
    if !report.not_attempted.is_empty() {
        println!(
            "  {} not attempted: {}",
            "!".yellow(),
            report.not_attempted.join(", ")
        );
    }

    println!();
    utils::print_outputs(&report.outputs);

    if !report.is_success() {
        anyhow::bail!(
            "apply failed: {} action(s) failed; run `infra up --yes` again after fixing the cause",
            report.result.failed.len()
        );
    }

    if plan.has_changes {
        println!();
        println!("{}", "✓ Apply complete".green().bold());
    }
    Ok(())
}
