use anyhow::Context;
use colored::Colorize;
use infraflow_cloud::{Engine, StateManager};
use infraflow_cloud_local::LocalProvider;
use infraflow_core::LoadedStack;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// ローカルエミュレータの保存先（ステートディレクトリ内）
const EMULATOR_FILE: &str = "local-cloud.json";

/// プロジェクトを扱うコマンド共通のオプション
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub state_dir: Option<PathBuf>,
    pub parallelism: usize,
}

/// 検出・読み込み済みのスタック
pub struct Project {
    pub root: PathBuf,
    pub stack_file: PathBuf,
    pub loaded: LoadedStack,
}

impl Project {
    /// スタックファイルを検出して読み込む
    ///
    /// 標準レイアウト（`stack.kdl` と任意の `resources/`、`stack.local.kdl`）は
    /// プロジェクト全体として読み込み、それ以外のファイルは単体で読み込む。
    pub fn load() -> anyhow::Result<Self> {
        let stack_file = infraflow_config::find_stack_file()?;
        let root = infraflow_config::project_root_of(&stack_file);
        tracing::debug!(
            stack_file = %stack_file.display(),
            root = %root.display(),
            "Located stack"
        );

        let loaded = if has_conventional_layout(&root) {
            infraflow_core::load_project_from_root(&root)?
        } else {
            let content = std::fs::read_to_string(&stack_file)
                .with_context(|| format!("failed to read {}", stack_file.display()))?;
            let name = stack_file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unnamed")
                .trim_start_matches('.');
            infraflow_core::load_stack_str(&content, name)?
        };

        Ok(Self {
            root,
            stack_file,
            loaded,
        })
    }

    pub fn state_dir(&self, options: &GlobalOptions) -> PathBuf {
        options
            .state_dir
            .clone()
            .unwrap_or_else(|| self.root.join(infraflow_cloud::STATE_DIR))
    }

    pub fn state_manager(&self, options: &GlobalOptions) -> StateManager {
        StateManager::with_state_dir(self.state_dir(options))
    }

    /// ステートと同じ場所に保存されるローカルエミュレータを使うエンジン
    pub async fn engine(
        &self,
        options: &GlobalOptions,
    ) -> anyhow::Result<(Arc<LocalProvider>, Engine)> {
        let path = self.state_dir(options).join(EMULATOR_FILE);
        let provider = Arc::new(LocalProvider::open(&path).await?);
        let engine = Engine::new(provider.clone()).with_parallelism(options.parallelism);
        Ok((provider, engine))
    }

    pub fn print_header(&self) {
        println!(
            "Stack: {} ({})",
            self.loaded.stack.name.cyan(),
            self.stack_file.display().to_string().dimmed()
        );
    }
}

fn has_conventional_layout(root: &Path) -> bool {
    root.join("stack.kdl").exists() || root.join(".infraflow").join("stack.kdl").exists()
}
