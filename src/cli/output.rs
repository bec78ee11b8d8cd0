//! Output formatting for CLI commands

use chrono::{TimeZone, Utc};
use serde::Serialize;

use crate::notification::{DeliveryReport, DeliveryStatus, Level, NotificationRequest};
use crate::pipeline::CycleReport;

/// Format output as pretty JSON
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

fn format_time(mills: i64) -> String {
    Utc.timestamp_millis_opt(mills)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| mills.to_string())
}

fn format_request(req: &NotificationRequest) -> String {
    let mut out = format!("[{}] {} ({})", req.level.as_str().to_uppercase(), req.title, req.plugin);
    for line in req.message.lines() {
        out.push_str("\n      ");
        out.push_str(line);
    }
    out
}

fn format_status(status: &DeliveryStatus) -> String {
    match status {
        DeliveryStatus::Delivered { receipt: Some(r) } => format!("delivered (receipt {})", r),
        DeliveryStatus::Delivered { receipt: None } => "delivered".to_string(),
        DeliveryStatus::Skipped { reason } => format!("skipped: {}", reason),
        DeliveryStatus::Deduplicated => "duplicate, not sent".to_string(),
        DeliveryStatus::DryRun => "dry-run".to_string(),
        DeliveryStatus::Failed { error } => format!("failed: {}", error),
    }
}

/// 人类可读的周期报告
pub fn format_cycle(report: &CycleReport, deliveries: &[DeliveryReport]) -> String {
    let mut lines = vec![format!("Cycle {} at {}", report.cycle, format_time(report.time))];

    for pill in &report.pills {
        lines.push(format!("  {}: {}", pill.pill.label, pill.pill.value));
    }

    for snooze in &report.snoozes {
        lines.push(format!(
            "  snooze {} and below until {}: {}",
            snooze.level,
            format_time(snooze.until),
            snooze.title
        ));
    }

    if report.delivered.is_empty() {
        lines.push("  no notifications".to_string());
    }
    for req in &report.delivered {
        lines.push(format!("  {}", format_request(req)));
    }
    for s in &report.suppressed {
        lines.push(format!(
            "  snoozed by {}: {}",
            s.snoozed_by.level,
            format_request(&s.notification)
        ));
    }

    for d in deliveries {
        lines.push(format!(
            "  -> {} {}: {}",
            d.channel,
            d.notification.title,
            format_status(&d.status)
        ));
    }

    for f in &report.failures {
        lines.push(format!("  ! {} failed in {}: {}", f.plugin, f.phase, f.error));
    }

    lines.join("\n")
}

/// `levels` 命令的表格
pub fn format_levels() -> String {
    Level::ALL
        .iter()
        .map(|l| {
            let kind = if l.is_alarm() { "alarm" } else { "" };
            format!("{}  {:<7}{}", l.value(), l.as_str().to_uppercase(), kind)
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
