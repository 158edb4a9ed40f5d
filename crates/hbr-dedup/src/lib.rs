use chrono::{DateTime, Utc};
use std::collections::HashSet;
use hbr_core::{FireDecision, MaintenanceRecord, ReminderKey, ReminderStatus, WindowPolicy};
use hbr_storage::{ReminderStore, StorageError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DedupError {
    pub fn is_not_found(&self) -> bool {
        match self {
            DedupError::Storage(err) => err.is_not_found(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    MarkedSent,
    LeftPending,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub records_seen: usize,
    pub completed_skipped: usize,
    pub out_of_window: usize,
    pub duplicates: usize,
    pub already_sent: usize,
    pub newly_pending: usize,
    pub retried: usize,
}

impl ProcessReport {
    pub fn decisions(&self) -> usize {
        self.newly_pending + self.retried
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Processed {
    pub decisions: Vec<FireDecision>,
    pub report: ProcessReport,
}

/// `process` leaves every due occurrence pending; only a successful
/// `report_outcome` moves it to sent.
pub struct DedupEngine {
    policy: WindowPolicy,
}

impl DedupEngine {
    pub fn new(policy: WindowPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn process(
        &self,
        store: &mut ReminderStore,
        records: &[MaintenanceRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<FireDecision>, DedupError> {
        Ok(self.process_detailed(store, records, now)?.decisions)
    }

    pub fn process_detailed(
        &self,
        store: &mut ReminderStore,
        records: &[MaintenanceRecord],
        now: DateTime<Utc>,
    ) -> Result<Processed, DedupError> {
        let today = now.date_naive();
        let mut processed = Processed::default();
        let mut decided: HashSet<ReminderKey> = HashSet::new();

        for record in records {
            processed.report.records_seen += 1;
            if record.is_completed() {
                processed.report.completed_skipped += 1;
                continue;
            }

            let evaluation = self.policy.evaluate(record.scheduled_date, today);
            if !evaluation.in_window {
                processed.report.out_of_window += 1;
                continue;
            }

            let key = record.key_for(evaluation.occurrence_date);
            if decided.contains(&key) {
                processed.report.duplicates += 1;
                debug!(event = "reminder_duplicate", key = %key);
                continue;
            }

            let (stored, is_retry) = match store.get(&key)? {
                None => (store.upsert_pending(&key, &record.snapshot(), now)?, false),
                Some(existing) => (existing, true),
            };

            match stored.status {
                ReminderStatus::Sent => {
                    processed.report.already_sent += 1;
                }
                ReminderStatus::Pending => {
                    if is_retry {
                        processed.report.retried += 1;
                    } else {
                        processed.report.newly_pending += 1;
                    }
                    debug!(
                        event = "reminder_due",
                        key = %key,
                        retry = is_retry,
                        first_seen_at = %stored.first_seen_at
                    );
                    decided.insert(key.clone());
                    processed.decisions.push(FireDecision {
                        record: record.clone(),
                        key,
                        first_seen_at: stored.first_seen_at,
                    });
                }
            }
        }

        Ok(processed)
    }

    // A failed delivery is an outcome, not an error.
    pub fn report_outcome(
        &self,
        store: &mut ReminderStore,
        key: &ReminderKey,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<Outcome, DedupError> {
        if !success {
            debug!(event = "reminder_left_pending", key = %key);
            return Ok(Outcome::LeftPending);
        }

        store.mark_sent(key, now)?;
        debug!(event = "reminder_sent", key = %key);
        Ok(Outcome::MarkedSent)
    }
}
