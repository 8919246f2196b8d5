use crate::project::Project;
use colored::Colorize;

/// 依存グラフをレベルごとに表示
pub async fn handle() -> anyhow::Result<()> {
    let project = Project::load()?;
    project.print_header();
    let graph = &project.loaded.graph;

    println!();
    for (index, level) in graph.levels().iter().enumerate() {
        println!("{}", format!("Level {}", index).bold());
        for name in level {
            let kind = project
                .loaded
                .stack
                .get(name)
                .map(|r| r.kind.to_string())
                .unwrap_or_default();
            let dependencies: Vec<String> = graph.dependencies_of(name).into_iter().collect();
            if dependencies.is_empty() {
                println!("  {} {}", name.cyan(), format!("({})", kind).dimmed());
            } else {
                println!(
                    "  {} {} ← {}",
                    name.cyan(),
                    format!("({})", kind).dimmed(),
                    dependencies.join(", ")
                );
            }
        }
    }

    Ok(())
}
