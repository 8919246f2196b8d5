pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// スタックファイルを直接指定する環境変数
pub const STACK_PATH_ENV: &str = "INFRAFLOW_STACK_PATH";

/// スタックファイルを置けるプロジェクトディレクトリ
pub const PROJECT_DIR: &str = ".infraflow";

/// 候補ファイル名（優先順）
const CANDIDATES: [&str; 4] = [
    "stack.local.kdl",
    ".stack.local.kdl",
    "stack.kdl",
    ".stack.kdl",
];

/// InfraFlowのユーザー設定ディレクトリを取得（なければ作成）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("infraflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// カレントディレクトリのスタックファイルを検索
///
/// 検索順序:
/// 1. `INFRAFLOW_STACK_PATH`（直接パス指定）
/// 2. カレントディレクトリ: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. ./.infraflow/ 配下（同じ順序）
/// 4. ~/.config/infraflow/stack.kdl（グローバル）
pub fn find_stack_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_stack_file_from(&current_dir)
}

/// カレントディレクトリの代わりに `dir` から [`find_stack_file`] を実行
pub fn find_stack_file_from(dir: &Path) -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var(STACK_PATH_ENV) {
        let path = PathBuf::from(&stack_path);
        if !path.is_file() {
            return Err(ConfigError::StackPathMissing(stack_path));
        }
        tracing::debug!(path = %path.display(), "Using stack file from environment");
        return Ok(path);
    }

    if let Some(path) = first_candidate(dir) {
        return Ok(path);
    }

    let project_dir = dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = first_candidate(&project_dir)
    {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("infraflow").join("stack.kdl");
        if global.exists() {
            tracing::debug!(path = %global.display(), "Using global stack file");
            return Ok(global);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

fn first_candidate(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// `stack_file` のプロジェクトルート（そのディレクトリ、または `.infraflow/` の親）
pub fn project_root_of(stack_file: &Path) -> PathBuf {
    let dir = stack_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    if dir.file_name().is_some_and(|name| name == PROJECT_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("infraflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// test").unwrap();

        let stack_file = find_stack_file_from(temp_dir.path()).unwrap();
        assert_eq!(stack_file, temp_dir.path().join("stack.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("stack.local.kdl"), "// local").unwrap();

        let result = find_stack_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with("stack.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_hidden_local_beats_visible_shared() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(".stack.local.kdl"), "// hidden local").unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// visible").unwrap();

        let result = find_stack_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with(".stack.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(".infraflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("stack.kdl"), "// in project dir").unwrap();

        let result = find_stack_file_from(temp_dir.path()).unwrap();
        assert!(result.ends_with(".infraflow/stack.kdl"));
        assert_eq!(project_root_of(&result), temp_dir.path());
    }

    #[test]
    #[serial]
    fn test_current_dir_lookup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join(".stack.kdl"), "// hidden").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_stack_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".stack.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let stack_path = temp_dir.path().join("custom.kdl");
        fs::write(&stack_path, "// custom").unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// ignored").unwrap();

        unsafe {
            std::env::set_var(STACK_PATH_ENV, stack_path.to_str().unwrap());
        }
        let result = find_stack_file_from(temp_dir.path());
        unsafe {
            std::env::remove_var(STACK_PATH_ENV);
        }

        assert_eq!(result.unwrap(), stack_path);
    }

    #[test]
    #[serial]
    fn test_env_var_missing_file() {
        unsafe {
            std::env::set_var(STACK_PATH_ENV, "/nonexistent/stack.kdl");
        }
        let result = find_stack_file_from(Path::new("."));
        unsafe {
            std::env::remove_var(STACK_PATH_ENV);
        }

        assert!(matches!(result, Err(ConfigError::StackPathMissing(_))));
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let Some(config_dir) = dirs::config_dir() else {
            return;
        };
        // グローバルのスタックファイルがあると見つかってしまう
        if config_dir.join("infraflow").join("stack.kdl").exists() {
            return;
        }

        let result = find_stack_file_from(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::StackFileNotFound)));
    }

    #[test]
    fn test_project_root_of() {
        assert_eq!(
            project_root_of(Path::new("/work/app/stack.kdl")),
            PathBuf::from("/work/app")
        );
        assert_eq!(
            project_root_of(Path::new("/work/app/.infraflow/stack.kdl")),
            PathBuf::from("/work/app")
        );
        assert_eq!(project_root_of(Path::new("stack.kdl")), PathBuf::from("."));
    }
}
