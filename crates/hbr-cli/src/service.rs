use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use hbr_core::MaintenanceRecord;
use hbr_dedup::{DedupEngine, DedupError, Outcome};
use hbr_notify::{render_batch, Dispatcher};
use hbr_storage::ReminderStore;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::homebox::HomeboxClient;
use crate::lock::ServiceLock;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub records: usize,
    pub decisions: usize,
    pub retries: usize,
    pub delivered: bool,
    pub marked_sent: usize,
    pub left_pending: usize,
    pub outcome_errors: usize,
}

/// One decide, deliver, commit pass over an already-fetched record set.
///
/// All due occurrences go out as one message. They are marked sent only when
/// at least one channel accepted it, so a failed delivery is retried on the
/// next cycle.
pub async fn run_cycle(
    store: &mut ReminderStore,
    engine: &DedupEngine,
    dispatcher: &Dispatcher,
    records: &[MaintenanceRecord],
    now: DateTime<Utc>,
) -> Result<CycleReport, DedupError> {
    let processed = engine.process_detailed(store, records, now)?;
    let mut report = CycleReport {
        records: records.len(),
        decisions: processed.decisions.len(),
        retries: processed.report.retried,
        ..CycleReport::default()
    };
    if processed.decisions.is_empty() {
        info!(
            event = "cycle_idle",
            records = records.len(),
            out_of_window = processed.report.out_of_window,
            already_sent = processed.report.already_sent,
            "No new due maintenance to notify"
        );
        return Ok(report);
    }

    let notification = render_batch(&processed.decisions);
    let summary = dispatcher.dispatch(&notification).await;
    report.delivered = summary.delivered();
    if !report.delivered {
        warn!(
            event = "delivery_failed",
            reminders = processed.decisions.len(),
            failed_channels = ?summary.failed_channels(),
            "No channel accepted the reminder batch; it stays pending"
        );
    }

    for decision in &processed.decisions {
        match engine.report_outcome(store, &decision.key, report.delivered, now) {
            Ok(Outcome::MarkedSent) => report.marked_sent += 1,
            Ok(Outcome::LeftPending) => report.left_pending += 1,
            Err(err) if err.is_not_found() => {
                // Decided this cycle, so the row must exist unless something
                // deleted it underneath us.
                error!(event = "reminder_vanished", key = %decision.key, error = %err);
                report.outcome_errors += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}

pub async fn run_service(db_path: &Path, config: ServiceConfig) -> Result<()> {
    let lock_path = ServiceLock::path_for(db_path);
    let Some(_lock) = ServiceLock::try_acquire(&lock_path, Utc::now())
        .with_context(|| format!("failed to open lock file {}", lock_path.display()))?
    else {
        bail!(
            "another homebox-reminders service already holds {}",
            lock_path.display()
        );
    };

    let dispatcher = Dispatcher::from_urls(&config.notifier_urls);
    let mut client =
        HomeboxClient::new(config.homebox.clone()).context("failed to build Homebox client")?;
    let engine = DedupEngine::new(config.reminders.window);
    let window = config.reminders.window;

    info!(
        event = "service_start",
        db = %db_path.display(),
        api_base = %config.homebox.api_base,
        channels = ?dispatcher.channel_names(),
        start_days_before = window.start_days_before,
        end_days_after = window.end_days_after,
        repeat_days = window.repeat_days,
        retention_days = config.reminders.retention_days,
        interval_secs = config.check_interval.as_secs(),
        run_once = config.run_once
    );

    if config.reminders.pruning_enabled() {
        match prune_at_startup(db_path, config.reminders.retention_days, Utc::now()) {
            Ok(removed) => info!(
                event = "startup_prune",
                removed,
                retention_days = config.reminders.retention_days
            ),
            Err(err) => error!(event = "startup_prune_failed", error = %format!("{err:#}")),
        }
    }

    loop {
        match poll_once(db_path, &engine, &dispatcher, &mut client, Utc::now()).await {
            Ok(report) => info!(
                event = "cycle_complete",
                records = report.records,
                decisions = report.decisions,
                retries = report.retries,
                delivered = report.delivered,
                marked_sent = report.marked_sent,
                left_pending = report.left_pending,
                outcome_errors = report.outcome_errors
            ),
            Err(err) => error!(event = "cycle_failed", error = %format!("{err:#}")),
        }

        if config.run_once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.check_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!(event = "service_stop", reason = "ctrl_c");
                break;
            }
        }
    }

    Ok(())
}

// The store is opened per cycle so a locked or missing database only costs
// that cycle.
async fn poll_once(
    db_path: &Path,
    engine: &DedupEngine,
    dispatcher: &Dispatcher,
    client: &mut HomeboxClient,
    now: DateTime<Utc>,
) -> Result<CycleReport> {
    let records = client
        .fetch_scheduled()
        .await
        .context("failed to fetch scheduled maintenance from Homebox")?;
    let mut store = ReminderStore::open(db_path)
        .with_context(|| format!("reminder store unavailable at {}", db_path.display()))?;
    let report = run_cycle(&mut store, engine, dispatcher, &records, now).await?;
    Ok(report)
}

fn prune_at_startup(db_path: &Path, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
    let mut store = ReminderStore::open(db_path)
        .with_context(|| format!("reminder store unavailable at {}", db_path.display()))?;
    let removed = store.prune(i64::from(retention_days), now)?;
    Ok(removed)
}
