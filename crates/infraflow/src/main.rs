mod commands;
mod project;
mod utils;

use clap::{Parser, Subcommand};
use project::GlobalOptions;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "infra")]
#[command(about = "Declare it. Apply it. Infrastructure as a KDL stack.", long_about = None)]
struct Cli {
    /// ステートディレクトリ（デフォルト: <project>/.infraflow）
    #[arg(long, global = true, env = "INFRA_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// 同時に適用する独立リソースの数
    #[arg(
        long,
        global = true,
        env = "INFRA_PARALLELISM",
        default_value_t = infraflow_cloud::DEFAULT_PARALLELISM
    )]
    parallelism: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタックを検証（構文・種別・参照・循環）
    Validate,
    /// 依存グラフを適用レベルごとに表示
    Graph,
    /// `up` で行われる変更を表示
    Plan,
    /// スタックを適用
    Up {
        /// プラン表示後に確認せず適用する
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// ステートに記録された全リソースを削除
    Destroy {
        /// プラン表示後に確認せず削除する
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// 直近の適用の出力を表示
    Outputs {
        /// JSONで出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = GlobalOptions {
        state_dir: cli.state_dir,
        parallelism: cli.parallelism,
    };

    match cli.command {
        Commands::Validate => commands::validate::handle().await?,
        Commands::Graph => commands::graph::handle().await?,
        Commands::Plan => commands::plan::handle(&options).await?,
        Commands::Up { yes } => commands::up::handle(&options, yes).await?,
        Commands::Destroy { yes } => commands::destroy::handle(&options, yes).await?,
        Commands::Outputs { json } => commands::outputs::handle(&options, json).await?,
        Commands::Version => println!("infraflow {}", env!("CARGO_PKG_VERSION")),
    }

    Ok(())
}
