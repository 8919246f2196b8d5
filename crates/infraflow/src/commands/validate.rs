use crate::project::Project;
use colored::Colorize;
use std::collections::BTreeMap;

pub async fn handle() -> anyhow::Result<()> {
    println!("{}", "Validating stack...".blue());

    let project = match Project::load() {
        Ok(project) => project,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Stack error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let stack = &project.loaded.stack;
    println!(
        "Project root: {}",
        project.root.display().to_string().cyan()
    );
    println!("{}", "✓ Stack is valid".green().bold());
    println!();
    println!("Summary:");

    let mut by_kind: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for resource in &stack.resources {
        by_kind
            .entry(resource.kind.to_string())
            .or_default()
            .push(resource.name.as_str());
    }
    println!("  Resources: {}", stack.resources.len());
    for (kind, names) in &by_kind {
        println!("    - {} ({})", kind.cyan(), names.join(", "));
    }
    println!("  Apply levels: {}", project.loaded.graph.levels().len());
    if !stack.outputs.is_empty() {
        let names: Vec<&str> = stack.outputs.keys().map(String::as_str).collect();
        println!("  Outputs: {}", names.join(", "));
    }

    Ok(())
}
