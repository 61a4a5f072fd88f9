// Output formatting for task tables, ledger rows and summaries

use chrono::{Local, TimeZone};
use std::fmt::Write;
use std::io::IsTerminal;
use crate::models::flags;
use crate::models::{describe_code, AttemptLog, BlacklistEntry, Builder, Channel, PackageRecord, Task, TaskInfo};
use crate::repo::{HistoryBatch, TasklistSummary};
use crate::utils::format_duration;

// ANSI escape codes for terminal formatting
const ANSI_RESET: &str = "\x1b[0m";
const ANSI_FG_RED: &str = "\x1b[31m";
const ANSI_FG_GREEN: &str = "\x1b[32m";
const ANSI_FG_YELLOW: &str = "\x1b[33m";
const ANSI_FG_BRIGHT_BLACK: &str = "\x1b[90m";

fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

fn status_color(info: &TaskInfo) -> Option<&'static str> {
    match info {
        TaskInfo::Done => Some(ANSI_FG_GREEN),
        TaskInfo::Failed(_) | TaskInfo::NoLog => Some(ANSI_FG_RED),
        TaskInfo::Building | TaskInfo::Command => Some(ANSI_FG_YELLOW),
        TaskInfo::Skipped => Some(ANSI_FG_BRIGHT_BLACK),
        TaskInfo::Waiting => None,
    }
}

fn paint(text: &str, color: Option<&str>, enabled: bool) -> String {
    match color {
        Some(code) if enabled => format!("{}{}{}", code, text, ANSI_RESET),
        _ => text.to_string(),
    }
}

fn channel_name(channel: Channel) -> &'static str {
    match channel {
        Channel::Stable => "stable",
        Channel::Testing => "testing",
        Channel::Staging => "staging",
    }
}

fn format_ts(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Task table; `with_list` adds a tasklist column for cross-list views
pub fn format_task_table(tasks: &[Task], with_list: bool) -> String {
    let color = use_color();
    let name_width = tasks
        .iter()
        .map(|t| t.pkgbase.len())
        .max()
        .unwrap_or(0)
        .max("Package".len());

    let mut out = String::new();
    if with_list {
        let _ = write!(out, "{:<5} ", "List");
    }
    let _ = writeln!(out, "{:>5}  {:<width$}  {:<8}  Status", "No.", "Package", "Channel", width = name_width);

    for task in tasks {
        if with_list {
            let list = if task.tasklist == 0 {
                "-".to_string()
            } else {
                task.tasklist.to_string()
            };
            let _ = write!(out, "{:<5} ", list);
        }
        let _ = writeln!(
            out,
            "{:>5}  {:<width$}  {:<8}  {}",
            task.taskno,
            task.pkgbase,
            channel_name(task.repo),
            paint(&task.status_text(), status_color(&task.info), color),
            width = name_width
        );
    }
    out
}

pub fn format_history(batch: &HistoryBatch) -> String {
    let created = batch
        .tasks
        .iter()
        .map(|t| t.created_ts)
        .min()
        .map(format_ts)
        .unwrap_or_default();
    format!(
        "Batch {} ({}):\n{}",
        batch.taskid,
        created,
        format_task_table(&batch.tasks, true)
    )
}

pub fn format_tasklists(lists: &[TasklistSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>5}  {:>7}  {:>8}  {:>5}", "List", "Waiting", "Building", "Total");
    for list in lists {
        let _ = writeln!(
            out,
            "{:>5}  {:>7}  {:>8}  {:>5}",
            list.tasklist, list.waiting, list.building, list.total
        );
    }
    out
}

pub fn format_package(record: &PackageRecord, attempts: &[AttemptLog]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Package:     {}", record.base);
    if let Some(repo) = &record.repo {
        let _ = writeln!(out, "Repository:  {}", repo);
    }
    let names = flags::bit_names(record.flags);
    let _ = writeln!(
        out,
        "Flags:       {} ({})",
        record.flags,
        if names.is_empty() { "none".to_string() } else { names.join(", ") }
    );
    if record.is_failed() {
        let _ = writeln!(out, "Failure:     {} ({})", record.error_code(), describe_code(record.error_code()));
    }
    if let Some(version) = &record.log_version {
        let _ = writeln!(out, "Last built:  {}", version);
    }
    if let Some(cost) = record.timecost {
        let _ = writeln!(out, "Time cost:   {}", format_duration(cost));
    }

    let versions = [
        ("x86", &record.x86_version, &record.loong_version),
        ("testing", &record.x86_testing_version, &record.loong_testing_version),
        ("staging", &record.x86_staging_version, &record.loong_staging_version),
    ];
    for (label, upstream, built) in versions {
        if upstream.is_none() && built.is_none() {
            continue;
        }
        let _ = writeln!(
            out,
            "{:<12} {} -> {}",
            format!("{}:", label),
            upstream.as_deref().unwrap_or("-"),
            built.as_deref().unwrap_or("-")
        );
    }

    if !attempts.is_empty() {
        let _ = writeln!(out, "Attempts:");
        for attempt in attempts {
            let result = if flags::is_failed(attempt.build_result) {
                describe_code(flags::error_code(attempt.build_result))
            } else {
                "ok".to_string()
            };
            let _ = writeln!(
                out,
                "  {}  {:<12} {}",
                format_ts(attempt.build_time),
                attempt.builder,
                result
            );
        }
    }
    out
}

/// One line per failed package: name, code and category
pub fn format_failed(records: &[PackageRecord]) -> String {
    let width = records.iter().map(|r| r.base.len()).max().unwrap_or(0).max("Package".len());
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  Code  Failure", "Package", width = width);
    for record in records {
        let code = record.error_code();
        let _ = writeln!(out, "{:<width$}  {:>4}  {}", record.base, code, describe_code(code), width = width);
    }
    out
}

pub fn format_blacklist(entries: &[BlacklistEntry]) -> String {
    let width = entries.iter().map(|e| e.pkgbase.len()).max().unwrap_or(0).max("Package".len());
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:<16}  Reason", "Package", "Added", width = width);
    for entry in entries {
        let _ = writeln!(
            out,
            "{:<width$}  {:<16}  {}",
            entry.pkgbase,
            format_ts(entry.added_ts),
            entry.reason.as_deref().unwrap_or("-"),
            width = width
        );
    }
    out
}

pub fn format_builders(builders: &[Builder]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>4}  {:<16} Scale", "Id", "Name");
    for builder in builders {
        let _ = writeln!(out, "{:>4}  {:<16} {}", builder.id, builder.name, builder.scale);
    }
    out
}
