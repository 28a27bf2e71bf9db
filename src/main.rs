//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、依赖注入及系统生命周期管理。

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use manga_tracker::api::{self, AppState};
use manga_tracker::core::config::AppConfig;
use manga_tracker::engine::{FetchPipeline, Poller};
use manga_tracker::matching::run_matches;
use manga_tracker::network::{BrowserCapture, HttpService};
use manga_tracker::store::Store;

/// 命令行界面脚手架 (CLI Scaffolding)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 HTTP 服务与后台轮询 (默认)
    Serve,
    /// 立即刷新全部站点并输出匹配结果
    Scan,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 遥测层初始化 (Telemetry Layer Initialization)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();

    // 依赖项初始化与注入 (Dependency Injection)
    let config = Arc::new(AppConfig::load_from(&cli.config)?);
    let store = Arc::new(Store::open(config.data_path()).await?);
    let http = HttpService::new(&config.fetch)?;
    let pipeline = Arc::new(FetchPipeline::new(http, store.snapshots()));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, store, pipeline).await,
        Commands::Scan => scan(store, pipeline).await,
    }
}

async fn serve(config: Arc<AppConfig>, store: Arc<Store>, pipeline: Arc<FetchPipeline>) -> anyhow::Result<()> {
    let poller = Poller::start(store.clone(), pipeline, config.poller.interval());

    let state = AppState {
        store,
        refresh: poller.sender(),
        capture: Arc::new(config.capture.clone()),
        live_capture: Arc::new(BrowserCapture::new(config.capture.clone())),
    };

    // 信号处理与优雅退出 (Signal Handling)
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到退出信号，正在关闭...");
        }
    };
    let served = api::serve(&config.server, state, shutdown).await;

    poller.stop(config.poller.shutdown_grace()).await;
    served
}

async fn scan(store: Arc<Store>, pipeline: Arc<FetchPipeline>) -> anyhow::Result<()> {
    let sites = store.sites();
    let summary = pipeline.refresh(&sites).await;
    info!("刷新完成: {} 个站点已缓存, {} 个无内容", summary.cached, summary.purged);

    let report = run_matches(&sites, &store.series(), pipeline.cache());
    println!("{}", serde_json::to_string_pretty(&report.matches)?);
    Ok(())
}
