use colored::Colorize;
use infraflow_cloud::{ActionType, ApplyResult, Plan};
use std::collections::BTreeMap;

/// アクションの色付き記号
pub fn action_symbol(action_type: ActionType) -> colored::ColoredString {
    let symbol = action_type.symbol();
    match action_type {
        ActionType::Create => symbol.green(),
        ActionType::Update => symbol.yellow(),
        ActionType::Replace => symbol.magenta(),
        ActionType::Delete => symbol.red(),
        ActionType::NoOp => symbol.dimmed(),
    }
}

/// プランを表示（変更ごとに1行）
pub fn print_plan(plan: &Plan) {
    if !plan.has_changes {
        println!("{}", "No changes. Infrastructure is up to date.".green());
        return;
    }

    println!("{}", "Planned actions:".bold());
    for action in plan.actions.iter().filter(|a| a.is_change()) {
        println!(
            "  {} {} {}",
            action_symbol(action.action_type),
            action.resource.cyan(),
            format!("({})", action.kind).dimmed()
        );
        let changed = action.changed_properties();
        if !changed.is_empty() {
            println!("      changed: {}", changed.join(", "));
        }
        if let Some(forced) = action.details.get("forces_replacement").and_then(|f| f.as_array())
            && !forced.is_empty()
        {
            let names: Vec<String> = forced.iter().map(format_value).collect();
            println!("      {} {}", "forces replacement:".magenta(), names.join(", "));
        }
        if let Some(replaced) = action
            .details
            .get("replaced_upstream")
            .and_then(|r| r.as_array())
        {
            let names: Vec<String> = replaced.iter().map(format_value).collect();
            println!("      {} {}", "replaced with:".magenta(), names.join(", "));
        }
        if let Some(upstream) = action.details.get("upstream").and_then(|u| u.as_array()) {
            let names: Vec<String> = upstream.iter().map(format_value).collect();
            println!("      {}", format!("depends on changed: {}", names.join(", ")).dimmed());
        }
    }
    println!();
    println!("Plan: {}", plan.summary());
}

/// プロバイダー呼び出しの結果を表示
pub fn print_apply_result(result: &ApplyResult) {
    for success in &result.succeeded {
        println!("  {} {}", "✓".green(), success.message);
    }
    for failure in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
}

/// JSON値をユーザーが書いた形で表示（文字列は引用符なし）
pub fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "(unknown)".to_string(),
        other => other.to_string(),
    }
}

pub fn print_outputs(outputs: &BTreeMap<String, serde_json::Value>) {
    if outputs.is_empty() {
        return;
    }
    println!("{}", "Outputs:".bold());
    for (key, value) in outputs {
        println!("  {} = {}", key.cyan(), format_value(value));
    }
}
