//! BG Alert CLI
//!
//! 对血糖快照运行告警插件，并通过 Pushover / 本地历史投递通知

use anyhow::Result;
use bg_alert::cli::{format_levels, handle_check, handle_watch, CheckArgs, WatchArgs};
use bg_alert::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "bgalert")]
#[command(about = "BG Alert - 血糖告警与推送")]
#[command(version)]
struct Cli {
    /// 配置文件（默认 ~/.config/bg-alert/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 对快照执行一个周期
    Check(CheckArgs),
    /// 周期性执行，stdin 输入 receipt 进行确认
    Watch(WatchArgs),
    /// 列出通知级别
    Levels,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug bgalert check --snapshot snapshot.json
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bg_alert=info,bgalert=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => {
            let config = Config::load(cli.config.as_deref())?;
            handle_check(args, config).await?;
        }
        Commands::Watch(args) => {
            let config = Config::load(cli.config.as_deref())?;
            handle_watch(args, config).await?;
        }
        Commands::Levels => {
            println!("{}", format_levels());
        }
    }

    Ok(())
}
