//! `watch` - 周期性重读快照并执行，stdin 输入的 receipt 作为确认处理

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use super::output::format_cycle;
use crate::config::Config;
use crate::model::now_millis;
use crate::notification::AckOutcome;
use crate::pipeline::AlertPipeline;
use crate::sandbox::SnapshotFile;

const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Watch 命令参数
#[derive(Args)]
pub struct WatchArgs {
    /// 快照文件，每个周期重新读取
    #[arg(long, short)]
    pub snapshot: PathBuf,

    /// 周期间隔（秒）
    #[arg(long, short, default_value = "60")]
    pub interval: u64,
}

/// 快照里固定的 `time` 在 watch 中被忽略，每个周期都用墙钟
fn run_once(pipeline: &AlertPipeline, config: &Config, path: &Path) -> Result<()> {
    let mut snapshot = SnapshotFile::load(path)?;
    if snapshot.time.take().is_some() {
        debug!(snapshot = %path.display(), "Ignoring pinned snapshot time");
    }
    let run = pipeline.run_cycle(snapshot.into_sandbox(config, now_millis()));
    println!("{}", format_cycle(&run.report, &[]));
    // 投递任务在后台完成，结果由分发器记录日志
    drop(run.deliveries);
    Ok(())
}

fn handle_ack(pipeline: &AlertPipeline, receipt: &str) {
    match pipeline.acknowledge(receipt) {
        AckOutcome::Acknowledged {
            level,
            notification,
        } => {
            println!("Acknowledged {} ({}), alarms snoozed", notification.title, level);
        }
        AckOutcome::NotFound => println!("Unknown or expired receipt: {}", receipt),
    }
}

/// 处理 watch 命令，Ctrl-C 退出
pub async fn handle_watch(args: WatchArgs, config: Config) -> Result<()> {
    let pipeline = AlertPipeline::from_config(&config)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut consecutive_errors = 0;

    info!(
        snapshot = %args.snapshot.display(),
        interval = args.interval,
        plugins = ?pipeline.registry().names(),
        channels = ?pipeline.dispatcher().channel_names(),
        "Watching snapshot"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_once(&pipeline, &config, &args.snapshot) {
                    Ok(()) => consecutive_errors = 0,
                    Err(e) => {
                        consecutive_errors += 1;
                        error!(
                            error = %e,
                            consecutive = consecutive_errors,
                            max = MAX_CONSECUTIVE_ERRORS,
                            "Cycle failed"
                        );
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            error!("Too many consecutive errors, stopping");
                            return Err(e);
                        }
                    }
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        let receipt = line.trim();
                        if !receipt.is_empty() {
                            handle_ack(&pipeline, receipt);
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin, acknowledgements disabled");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}
