mod commands;
mod project;

use clap::{Parser, Subcommand};
use colored::Colorize;
use stackflow_config::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "型付きのインフラユニットを CloudFormation に合成する", long_about = None)]
struct Cli {
    /// デプロイメントファイル（省略時は stackflow.kdl を自動検出）
    #[arg(short, long, global = true, env = "STACKFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// テンプレート変数（ファイル内の定義を上書き、複数指定可）
    #[arg(long = "var", value_name = "KEY=VALUE", global = true)]
    vars: Vec<String>,

    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// テンプレートを合成してクラウドアセンブリに出力
    Synth {
        /// 出力先ディレクトリ（デフォルト: cdk.out またはユーザー設定）
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// 標準出力に表示するテンプレートの形式
        #[arg(short, long)]
        format: Option<OutputFormat>,
        /// 指定したユニットのテンプレートを表示
        #[arg(short, long)]
        unit: Option<String>,
    },
    /// 前回の合成からの変更を表示
    Diff {
        /// 前回の合成結果があるディレクトリ
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// ユニットをデプロイ順に一覧表示
    List,
    /// デプロイメント定義を検証
    Validate,
    /// stackflow.kdl のひな形を作成
    Init {
        /// 既存のファイルを上書きする
        #[arg(long)]
        force: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config,
        vars,
        command,
        ..
    } = cli;
    let load = || project::Project::load(config.as_deref(), &vars);

    match command {
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Init { force } => commands::init::handle(force).await,
        Commands::Synth { out, format, unit } => {
            commands::synth::handle(&load()?, out, format, unit.as_deref()).await
        }
        Commands::Diff { out } => commands::diff::handle(&load()?, out).await,
        Commands::List => commands::list::handle(&load()?),
        Commands::Validate => commands::validate::handle(&load()?),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
