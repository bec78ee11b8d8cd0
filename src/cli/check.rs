//! `check` - 对快照执行一个周期

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::output::{format_cycle, format_json};
use crate::config::Config;
use crate::model::now_millis;
use crate::notification::{collect_reports, DeliveryReport};
use crate::pipeline::{AlertPipeline, CycleReport};
use crate::sandbox::SnapshotFile;

/// Check 命令参数
#[derive(Args)]
pub struct CheckArgs {
    /// 快照文件（entries / treatments / profile）
    #[arg(long, short)]
    pub snapshot: PathBuf,

    /// 只打印，不投递
    #[arg(long)]
    pub dry_run: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// Check 命令输出
#[derive(Debug, Serialize)]
pub struct CheckOutput {
    #[serde(flatten)]
    pub report: CycleReport,
    pub deliveries: Vec<DeliveryReport>,
}

/// 处理 check 命令；等待本周期的投递全部结束
pub async fn handle_check(args: CheckArgs, mut config: Config) -> Result<()> {
    config.dry_run |= args.dry_run;

    let snapshot = SnapshotFile::load(&args.snapshot)?;
    let pipeline = AlertPipeline::from_config(&config)?;
    let sandbox = snapshot.into_sandbox(&config, now_millis());

    let run = pipeline.run_cycle(sandbox);
    let output = CheckOutput {
        report: run.report,
        deliveries: collect_reports(run.deliveries).await,
    };

    if args.json {
        println!("{}", format_json(&output));
    } else {
        println!("{}", format_cycle(&output.report, &output.deliveries));
    }
    Ok(())
}
