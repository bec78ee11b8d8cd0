//! 通知历史 - 本地 JSONL 文件读写

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::level::Level;

/// 通知记录（JSONL 格式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// ISO8601 时间戳
    pub ts: DateTime<Utc>,
    pub plugin: String,
    pub level: Level,
    pub title: String,
    pub message: String,
    /// 是否被暂停抑制（未推送）
    #[serde(default)]
    pub snoozed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

const MAX_RECORDS: usize = 500;
const KEEP_AFTER_CLEANUP: usize = 250;
const CLEANUP_CHECK_INTERVAL: usize = 10;

/// 通知历史文件
pub struct NotificationHistory {
    path: PathBuf,
    write_count: AtomicUsize,
}

impl NotificationHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_count: AtomicUsize::new(0),
        }
    }

    /// 默认存储路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("bg-alert")
            .join("notifications.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加通知记录（带文件锁）
    pub fn append(&self, record: &NotificationRecord) -> Result<()> {
        use fs2::FileExt;

        // 确保目录存在
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.unlock()?;

        self.maybe_cleanup();
        Ok(())
    }

    /// 读取最近 N 条记录
    pub fn read_recent(&self, n: usize) -> Vec<NotificationRecord> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let records = parse_records(BufReader::new(file));
        let start = records.len().saturating_sub(n);
        let mut recent = records[start..].to_vec();
        recent.sort_by_key(|r| r.ts);
        recent
    }

    fn maybe_cleanup(&self) {
        let count = self.write_count.fetch_add(1, Ordering::Relaxed);
        if count % CLEANUP_CHECK_INTERVAL != 0 {
            return;
        }

        if let Ok(metadata) = fs::metadata(&self.path) {
            // 估算行数：平均每行 160 字节
            let estimated_lines = metadata.len() as usize / 160;
            if estimated_lines > MAX_RECORDS {
                let _ = self.cleanup();
            }
        }
    }

    /// 执行清理（保留最近的记录）
    fn cleanup(&self) -> Result<()> {
        use fs2::FileExt;

        let file = File::open(&self.path)?;
        file.lock_exclusive()?;

        let records = parse_records(BufReader::new(&file));
        if records.len() <= MAX_RECORDS {
            file.unlock()?;
            return Ok(());
        }

        let start = records.len().saturating_sub(KEEP_AFTER_CLEANUP);
        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp_file = File::create(&temp_path)?;
            for record in &records[start..] {
                writeln!(temp_file, "{}", serde_json::to_string(record)?)?;
            }
        }

        // 原子替换
        fs::rename(&temp_path, &self.path)?;

        file.unlock()?;
        Ok(())
    }
}

fn parse_records(reader: impl BufRead) -> Vec<NotificationRecord> {
    reader
        .lines()
        .filter_map(|line| line.ok())
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect()
}
