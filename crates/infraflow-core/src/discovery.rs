//! ファイル自動検出
//!
//! 規約ベースのレイアウトからプロジェクトのスタックファイルを検出します。

use crate::error::{Result, StackError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// ステートと代替スタックファイルを置くプロジェクトディレクトリ
pub const PROJECT_DIR: &str = ".infraflow";

/// ルートスタックファイル名
pub const STACK_FILE: &str = "stack.kdl";

/// ローカルオーバーライドファイル名
pub const LOCAL_OVERRIDE_FILE: &str = "stack.local.kdl";

/// 検出されたファイル群
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// ルートファイル (stack.kdl)
    pub root: Option<PathBuf>,
    /// リソース定義ファイル (resources/**/*.kdl)
    pub resources: Vec<PathBuf>,
    /// ローカルオーバーライドファイル (stack.local.kdl)
    pub local_override: Option<PathBuf>,
    /// 環境変数ファイル (.env)
    pub env_file: Option<PathBuf>,
}

impl DiscoveredFiles {
    /// 読み込み順の全スタックファイル
    pub fn stack_files(&self) -> Vec<PathBuf> {
        self.root
            .iter()
            .chain(self.resources.iter())
            .chain(self.local_override.iter())
            .cloned()
            .collect()
    }
}

/// プロジェクトルートを検出
///
/// 検索順序:
/// 1. 環境変数 `INFRAFLOW_PROJECT_ROOT`
/// 2. カレントディレクトリから上に向かって:
///    - stack.kdl
///    - .infraflow/stack.kdl
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("INFRAFLOW_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking INFRAFLOW_PROJECT_ROOT");
        if has_stack_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// `start_dir` から上に向かってスタックファイルを探す
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if has_stack_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }

        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(StackError::ProjectRootNotFound(start_dir.to_path_buf()))
}

fn has_stack_file(dir: &Path) -> bool {
    dir.join(STACK_FILE).exists() || dir.join(PROJECT_DIR).join(STACK_FILE).exists()
}

/// プロジェクトのファイルを検出
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path) -> Result<DiscoveredFiles> {
    debug!("Starting file discovery");
    let mut discovered = DiscoveredFiles::default();

    discovered.root = first_existing(project_root, STACK_FILE);
    if let Some(root) = &discovered.root {
        debug!(file = %root.display(), "Found root file");
    }

    // resources/**/*.kdl
    let resources_dir = project_root.join("resources");
    if resources_dir.is_dir() {
        discovered.resources = discover_kdl_files(&resources_dir)?;
        info!(
            resource_file_count = discovered.resources.len(),
            "Discovered resource files"
        );
    }

    discovered.local_override = first_existing(project_root, LOCAL_OVERRIDE_FILE);
    discovered.env_file = first_existing(project_root, ".env");

    Ok(discovered)
}

/// `<root>/<name>` または `<root>/.infraflow/<name>` のうち先に見つかった方
fn first_existing(project_root: &Path, name: &str) -> Option<PathBuf> {
    [
        project_root.join(name),
        project_root.join(PROJECT_DIR).join(name),
    ]
    .into_iter()
    .find(|p| p.exists())
}

/// .kdlファイルを再帰的に検出（アルファベット順）
fn discover_kdl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();

    visit_dir(dir, &mut files, &mut visited)?;
    files.sort();

    Ok(files)
}

fn visit_dir(dir: &Path, files: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    // 正規化パスでシンボリックリンクのループを検出
    let canonical_dir = dir.canonicalize().map_err(|e| StackError::DiscoveryError {
        path: dir.to_path_buf(),
        message: format!("failed to canonicalize path: {}", e),
    })?;

    if !visited.insert(canonical_dir.clone()) {
        warn!(dir = %canonical_dir.display(), "Symlink loop detected, skipping");
        return Ok(());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| StackError::DiscoveryError {
        path: dir.to_path_buf(),
        message: format!("failed to read directory: {}", e),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| StackError::DiscoveryError {
            path: dir.to_path_buf(),
            message: format!("failed to read directory entry: {}", e),
        })?;
        let path = entry.path();

        if path.is_dir() {
            visit_dir(&path, files, visited)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("kdl") {
            files.push(path);
        }
    }

    Ok(())
}
