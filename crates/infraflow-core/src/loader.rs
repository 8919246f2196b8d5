//! プロジェクトローダー
//!
//! ファイル検出、テンプレート展開、パース、依存関係の解決を
//! ひとまとめにします。

use crate::discovery::{DiscoveredFiles, discover_files, find_project_root};
use crate::error::{Result, StackError};
use crate::graph::DependencyGraph;
use crate::model::Stack;
use crate::parser::parse_kdl_string;
use crate::template::{TemplateProcessor, Variables, extract_variables};
use std::path::Path;
use tracing::{debug, info, instrument};

/// スタックと解決済みの依存グラフ
#[derive(Debug, Clone)]
pub struct LoadedStack {
    pub stack: Stack,
    pub graph: DependencyGraph,
}

/// カレントディレクトリを含むプロジェクトを読み込む
#[instrument]
pub fn load_project() -> Result<LoadedStack> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    load_project_from_root(&project_root)
}

/// プロジェクトルートからプロジェクトを読み込む
///
/// 処理フロー:
/// 1. ファイル検出
/// 2. 変数収集
/// 3. テンプレート展開
/// 4. KDLパース
/// 5. 依存グラフの解決（循環や未定義の参照はここで失敗）
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path) -> Result<LoadedStack> {
    debug!("Step 1: Discovering files");
    let discovered = discover_files(project_root)?;
    if discovered.root.is_none() {
        return Err(StackError::ProjectRootNotFound(project_root.to_path_buf()));
    }

    debug!("Step 2: Preparing template processor");
    let mut processor = prepare_template_processor(&discovered, project_root)?;

    debug!("Step 3: Expanding templates");
    let shared_files: Vec<_> = discovered
        .root
        .iter()
        .chain(discovered.resources.iter())
        .collect();
    let expanded = processor.render_files(&shared_files)?;
    info!(content_size = expanded.len(), "Template expansion complete");

    debug!("Step 4: Parsing KDL");
    let name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let mut stack = parse_kdl_string(&expanded, name)?;

    if let Some(local_file) = &discovered.local_override {
        debug!(file = %local_file.display(), "Applying local override");
        let expanded = processor.render_file(local_file)?;
        let overrides = parse_kdl_string(&expanded, stack.name.clone())?;
        stack.apply_override(overrides);
    }

    debug!("Step 5: Resolving dependencies");
    let graph = DependencyGraph::build(&stack)?;
    info!(
        stack = %stack.name,
        resources = stack.resources.len(),
        "Project loaded successfully"
    );

    Ok(LoadedStack { stack, graph })
}

/// 単一のスタック文字列を読み込む（検出なし、テンプレートは展開）
pub fn load_stack_str(content: &str, default_name: &str) -> Result<LoadedStack> {
    let mut processor = TemplateProcessor::new();
    processor.add_builtin_variables(Path::new("."));
    processor.add_rendered_variables(extract_variables(content)?)?;

    let expanded = processor.render_str(content)?;
    let stack = parse_kdl_string(&expanded, default_name.to_string())?;
    let graph = DependencyGraph::build(&stack)?;
    Ok(LoadedStack { stack, graph })
}

/// テンプレートプロセッサを準備
///
/// 優先順位（低い順）: 組み込み変数、.env、環境変数、variablesブロック
fn prepare_template_processor(
    discovered: &DiscoveredFiles,
    project_root: &Path,
) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();
    processor.add_builtin_variables(project_root);

    if let Some(env_file) = &discovered.env_file {
        processor.add_env_file_variables(env_file)?;
    }

    processor.add_env_variables();

    let mut all_variables = Variables::new();
    for file in discovered.stack_files() {
        let content = std::fs::read_to_string(&file).map_err(|e| StackError::IoError {
            path: file.clone(),
            message: e.to_string(),
        })?;
        all_variables.extend(extract_variables(&content)?);
    }

    debug!(vars = ?all_variables, "Adding collected variables to processor");
    processor.add_rendered_variables(all_variables)?;

    Ok(processor)
}
