//! Maintenance commands over the reminder store: list, reset, prune.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use hbr_core::{ReminderRecord, ResetTarget};
use hbr_storage::ReminderStore;
use std::path::Path;

pub const DEFAULT_LIST_LIMIT: usize = 100;

const LIST_HEADERS: [&str; 5] = ["Name", "Key", "Status", "First Seen", "Last Sent"];

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show at most this many of the most recent reminders
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: usize,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Reminder key (`<item>/<entry>/<YYYY-MM-DD>`) or `all`
    pub target: ResetTarget,
}

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Age in days; records whose last activity is older are removed
    #[arg(allow_negative_numbers = true)]
    pub days: i64,
}

pub fn list(db_path: &Path, args: &ListArgs) -> Result<()> {
    let store = open_store(db_path)?;
    println!("{}", list_output(&store, args.limit, args.json)?);
    Ok(())
}

pub fn reset(db_path: &Path, args: &ResetArgs) -> Result<()> {
    let mut store = open_store(db_path)?;
    let removed = store.reset(&args.target)?;
    println!("Reset OK ({removed} removed)");
    Ok(())
}

pub fn prune(db_path: &Path, args: &PruneArgs, now: DateTime<Utc>) -> Result<()> {
    let mut store = open_store(db_path)?;
    let removed = store.prune(args.days, now)?;
    println!("Pruned {removed} entries older than {} days", args.days);
    Ok(())
}

fn open_store(db_path: &Path) -> Result<ReminderStore> {
    ReminderStore::open(db_path)
        .with_context(|| format!("failed to open reminder store at {}", db_path.display()))
}

/// Keeps the newest `limit` records, still ordered oldest first.
pub fn list_output(store: &ReminderStore, limit: usize, json: bool) -> Result<String> {
    let records = store.list()?;
    let skip = records.len().saturating_sub(limit);
    let records: Vec<ReminderRecord> = records.into_iter().skip(skip).collect();

    if json {
        return serde_json::to_string_pretty(&records).context("failed to encode reminders");
    }
    if records.is_empty() {
        return Ok("No persisted reminders found.".to_string());
    }

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            vec![
                record.display_name().to_string(),
                record.key.to_string(),
                record.status.to_string(),
                format_time(record.first_seen_at),
                record
                    .last_sent_at
                    .map(format_time)
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    Ok(render_table(&LIST_HEADERS, &rows))
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|width| "─".repeat(width + 2)).collect();
        format!("{left}{}{right}", segments.join(mid))
    };
    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(index, width)| {
                let cell = cells.get(index).copied().unwrap_or_default();
                let padding = width - cell.chars().count();
                format!(" {cell}{} ", " ".repeat(padding))
            })
            .collect();
        format!("│{}│", padded.join("│"))
    };

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(border("┌", "┬", "┐"));
    out.push(line(headers.to_vec()));
    out.push(border("├", "┼", "┤"));
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.push(border("└", "┴", "┘"));
    out.join("\n")
}
