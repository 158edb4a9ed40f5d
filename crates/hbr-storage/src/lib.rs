use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use hbr_core::model::DATE_FORMAT;
use hbr_core::{ReminderKey, ReminderRecord, ReminderSnapshot, ReminderStatus, ResetTarget};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const REMINDER_SCHEMA_VERSION: i64 = 1;

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const SELECT_RECORD: &str = "
    SELECT item_id, entry_id, occurrence_date, status, first_seen_at, last_sent_at, snapshot_json
    FROM reminders
";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("reminder store unavailable at {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("no such reminder: {key}")]
    NotFound { key: String },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        !self.is_not_found()
    }
}

// Every write is its own BEGIN IMMEDIATE transaction; other processes wait on
// busy_timeout.
pub struct ReminderStore {
    conn: Connection,
}

impl ReminderStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let unavailable = |reason: String| StorageError::Open {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| unavailable(err.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|err| unavailable(err.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| unavailable(err.to_string()))?;
        // Filesystems without shared memory keep the rollback journal, which
        // is still transactional.
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(|err| unavailable(err.to_string()))?;

        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > REMINDER_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: REMINDER_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_reminders.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn get(&self, key: &ReminderKey) -> Result<Option<ReminderRecord>, StorageError> {
        fetch_record(&self.conn, &key.to_string())
    }

    /// Never modifies an existing record, so a sent occurrence stays sent.
    pub fn upsert_pending(
        &mut self,
        key: &ReminderKey,
        snapshot: &ReminderSnapshot,
        now: DateTime<Utc>,
    ) -> Result<ReminderRecord, StorageError> {
        let storage_key = key.to_string();
        let snapshot_json = serde_json::to_string(snapshot)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "
            INSERT INTO reminders (
                reminder_key,
                item_id,
                entry_id,
                occurrence_date,
                status,
                first_seen_at,
                last_sent_at,
                snapshot_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)
            ON CONFLICT(reminder_key) DO NOTHING
            ",
            params![
                storage_key,
                key.item_id,
                key.entry_id,
                key.occurrence_date.format(DATE_FORMAT).to_string(),
                ReminderStatus::Pending.as_str(),
                format_timestamp(now),
                snapshot_json,
            ],
        )?;
        let record = fetch_record(&tx, &storage_key)?.ok_or_else(|| StorageError::NotFound {
            key: storage_key.clone(),
        })?;
        tx.commit()?;

        Ok(record)
    }

    pub fn mark_sent(
        &mut self,
        key: &ReminderKey,
        now: DateTime<Utc>,
    ) -> Result<ReminderRecord, StorageError> {
        let storage_key = key.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "
            UPDATE reminders
            SET status = ?2, last_sent_at = ?3
            WHERE reminder_key = ?1 AND status = ?4
            ",
            params![
                storage_key,
                ReminderStatus::Sent.as_str(),
                format_timestamp(now),
                ReminderStatus::Pending.as_str(),
            ],
        )?;
        let record = fetch_record(&tx, &storage_key)?.ok_or_else(|| StorageError::NotFound {
            key: storage_key.clone(),
        })?;
        tx.commit()?;

        Ok(record)
    }

    pub fn list(&self) -> Result<Vec<ReminderRecord>, StorageError> {
        let mut statement = self.conn.prepare(&format!(
            "{SELECT_RECORD} ORDER BY first_seen_at ASC, reminder_key ASC"
        ))?;
        let rows = statement.query_map([], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<i64, StorageError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn reset(&mut self, target: &ResetTarget) -> Result<usize, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = match target {
            ResetTarget::All => tx.execute("DELETE FROM reminders", [])?,
            ResetTarget::Key(key) => {
                let storage_key = key.to_string();
                let removed = tx.execute(
                    "DELETE FROM reminders WHERE reminder_key = ?1",
                    [&storage_key],
                )?;
                if removed == 0 {
                    return Err(StorageError::NotFound { key: storage_key });
                }
                removed
            }
        };
        tx.commit()?;

        Ok(removed)
    }

    pub fn prune(&mut self, retention_days: i64, now: DateTime<Utc>) -> Result<usize, StorageError> {
        if retention_days <= 0 {
            return Ok(0);
        }
        // A cutoff before chrono's range is older than every stored record.
        let Some(cutoff) =
            Duration::try_days(retention_days).and_then(|retention| now.checked_sub_signed(retention))
        else {
            return Ok(0);
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "
            DELETE FROM reminders
            WHERE CASE WHEN status = ?1 THEN COALESCE(last_sent_at, first_seen_at)
                       ELSE first_seen_at
                  END < ?2
            ",
            params![ReminderStatus::Sent.as_str(), format_timestamp(cutoff)],
        )?;
        tx.commit()?;

        Ok(removed)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

fn fetch_record(
    conn: &Connection,
    storage_key: &str,
) -> Result<Option<ReminderRecord>, StorageError> {
    let record = conn
        .query_row(
            &format!("{SELECT_RECORD} WHERE reminder_key = ?1"),
            [storage_key],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ReminderRecord> {
    let occurrence_raw: String = row.get(2)?;
    let occurrence_date = NaiveDate::parse_from_str(&occurrence_raw, DATE_FORMAT)
        .map_err(|err| invalid_column(2, err))?;
    let status_raw: String = row.get(3)?;
    let status = status_raw.parse::<ReminderStatus>().map_err(|err| {
        invalid_column(
            3,
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })?;
    let first_seen_at =
        parse_timestamp(row.get::<_, String>(4)?).map_err(|err| invalid_column(4, err))?;
    let last_sent_at = row
        .get::<_, Option<String>>(5)?
        .map(parse_timestamp)
        .transpose()
        .map_err(|err| invalid_column(5, err))?;
    let snapshot_json: String = row.get(6)?;
    let snapshot: ReminderSnapshot =
        serde_json::from_str(&snapshot_json).map_err(|err| invalid_column(6, err))?;

    Ok(ReminderRecord {
        key: ReminderKey {
            item_id: row.get(0)?,
            entry_id: row.get(1)?,
            occurrence_date,
        },
        status,
        first_seen_at,
        last_sent_at,
        snapshot,
    })
}

fn invalid_column<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}

// Fixed width, always UTC: text order in SQL equals chronological order.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn key(entry_id: &str) -> ReminderKey {
        ReminderKey::new("item-1", entry_id, date(2024, 1, 10))
    }

    fn snapshot(name: &str) -> ReminderSnapshot {
        ReminderSnapshot {
            name: Some(name.to_string()),
            item_name: Some("Furnace".to_string()),
            description: Some("replace filter".to_string()),
            scheduled_date: date(2024, 1, 10),
        }
    }

    #[test]
    fn migration_creates_reminders_table() {
        let store = ReminderStore::open_in_memory().expect("open db");
        assert!(store.table_exists("reminders").expect("table check"));
        assert_eq!(
            store.schema_version().expect("schema version"),
            REMINDER_SCHEMA_VERSION
        );
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("reminders.db");
        {
            let conn = Connection::open(&path).expect("open raw");
            conn.execute_batch("PRAGMA user_version = 99").expect("bump version");
        }

        let err = ReminderStore::open(&path).err().expect("newer schema must fail");
        assert!(matches!(
            err,
            StorageError::UnsupportedSchemaVersion { found: 99, .. }
        ));
        assert!(err.is_unavailable());
    }

    #[test]
    fn upsert_pending_creates_once_and_is_idempotent() {
        let mut store = ReminderStore::open_in_memory().expect("open db");

        let created = store
            .upsert_pending(&key("e-1"), &snapshot("Filter"), ts(8))
            .expect("create");
        assert_eq!(created.status, ReminderStatus::Pending);
        assert_eq!(created.first_seen_at, ts(8));
        assert_eq!(created.last_sent_at, None);
        assert_eq!(created.snapshot, snapshot("Filter"));

        let again = store
            .upsert_pending(&key("e-1"), &snapshot("Renamed"), ts(9))
            .expect("upsert again");
        assert_eq!(again, created);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn upsert_pending_never_downgrades_sent() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        store
            .upsert_pending(&key("e-1"), &snapshot("Filter"), ts(8))
            .expect("create");
        store.mark_sent(&key("e-1"), ts(9)).expect("mark sent");

        let after = store
            .upsert_pending(&key("e-1"), &snapshot("Filter"), ts(10))
            .expect("upsert");
        assert_eq!(after.status, ReminderStatus::Sent);
        assert_eq!(after.last_sent_at, Some(ts(9)));
    }

    #[test]
    fn mark_sent_requires_existing_record_and_is_idempotent() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        let err = store
            .mark_sent(&key("missing"), ts(8))
            .expect_err("missing key");
        assert!(err.is_not_found());

        store
            .upsert_pending(&key("e-1"), &snapshot("Filter"), ts(8))
            .expect("create");
        let sent = store.mark_sent(&key("e-1"), ts(9)).expect("mark sent");
        assert_eq!(sent.status, ReminderStatus::Sent);
        assert_eq!(sent.last_sent_at, Some(ts(9)));

        let again = store.mark_sent(&key("e-1"), ts(12)).expect("mark again");
        assert_eq!(again, sent);
    }

    #[test]
    fn list_orders_by_first_seen_then_key() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        store
            .upsert_pending(&key("b"), &snapshot("B"), ts(9))
            .expect("b");
        store
            .upsert_pending(&key("c"), &snapshot("C"), ts(8))
            .expect("c");
        store
            .upsert_pending(&key("a"), &snapshot("A"), ts(9))
            .expect("a");

        let entries = store
            .list()
            .expect("list")
            .into_iter()
            .map(|record| record.key.entry_id)
            .collect::<Vec<_>>();
        assert_eq!(entries, vec!["c", "a", "b"]);
    }

    #[test]
    fn reset_single_key_and_all() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        for entry in ["a", "b", "c"] {
            store
                .upsert_pending(&key(entry), &snapshot(entry), ts(8))
                .expect("create");
        }

        assert_eq!(
            store
                .reset(&ResetTarget::Key(key("b")))
                .expect("reset b"),
            1
        );
        assert!(store.get(&key("b")).expect("get").is_none());

        let err = store
            .reset(&ResetTarget::Key(key("b")))
            .expect_err("second reset");
        assert!(err.is_not_found());

        assert_eq!(store.reset(&ResetTarget::All).expect("reset all"), 2);
        assert_eq!(store.count().expect("count"), 0);
        assert_eq!(store.reset(&ResetTarget::All).expect("reset empty"), 0);
    }

    #[test]
    fn prune_uses_last_sent_for_sent_and_first_seen_for_pending() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        store
            .upsert_pending(&key("old-pending"), &snapshot("a"), ts(1))
            .expect("create");
        store
            .upsert_pending(&key("sent-late"), &snapshot("b"), ts(1))
            .expect("create");
        store.mark_sent(&key("sent-late"), ts(20)).expect("mark");
        store
            .upsert_pending(&key("fresh"), &snapshot("c"), ts(25))
            .expect("create");

        // cutoff = Jan 15 09:30
        let removed = store.prune(10, ts(25)).expect("prune");
        assert_eq!(removed, 1);
        assert!(store.get(&key("old-pending")).expect("get").is_none());
        assert!(store.get(&key("sent-late")).expect("get").is_some());
        assert!(store.get(&key("fresh")).expect("get").is_some());
    }

    #[test]
    fn prune_boundary_keeps_records_exactly_at_cutoff() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        store
            .upsert_pending(&key("edge"), &snapshot("edge"), ts(5))
            .expect("create");

        assert_eq!(store.prune(5, ts(10)).expect("prune at edge"), 0);
        assert_eq!(store.prune(4, ts(10)).expect("prune past edge"), 1);
    }

    #[test]
    fn prune_with_non_positive_retention_is_noop() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        store
            .upsert_pending(&key("a"), &snapshot("a"), ts(1))
            .expect("create");

        assert_eq!(store.prune(0, ts(30)).expect("prune 0"), 0);
        assert_eq!(store.prune(-5, ts(30)).expect("prune negative"), 0);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn prune_with_very_long_retention_keeps_everything() {
        let mut store = ReminderStore::open_in_memory().expect("open db");
        store
            .upsert_pending(&key("old"), &snapshot("old"), ts(1))
            .expect("create");
        let far_future = Utc
            .with_ymd_and_hms(2900, 1, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");

        // Cutoffs in year 710, in a negative year, past chrono's range, and
        // past the delta's range.
        for days in [800_000, 3_000_000, 365_000_000, i64::MAX / 86_400 + 1, i64::MAX] {
            assert_eq!(store.prune(days, far_future).expect("prune"), 0, "days {days}");
        }
        assert_eq!(store.count().expect("count"), 1);

        // About 821 years back from 2900 is still after 2024.
        assert_eq!(store.prune(300_000, far_future).expect("prune"), 1);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("reminders.db");
        {
            let mut store = ReminderStore::open(&path).expect("open db");
            store
                .upsert_pending(&key("e-1"), &snapshot("Filter"), ts(8))
                .expect("create");
            store.mark_sent(&key("e-1"), ts(8)).expect("mark sent");
        }

        let store = ReminderStore::open(&path).expect("reopen db");
        let record = store
            .get(&key("e-1"))
            .expect("get")
            .expect("record present");
        assert!(record.is_sent());
        assert_eq!(record.key, key("e-1"));
        assert_eq!(record.display_name(), "Filter");
    }

    #[test]
    fn second_handle_sees_committed_writes() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("reminders.db");
        let mut writer = ReminderStore::open(&path).expect("open writer");
        let mut admin = ReminderStore::open(&path).expect("open admin");

        writer
            .upsert_pending(&key("e-1"), &snapshot("Filter"), ts(8))
            .expect("create");
        assert_eq!(admin.reset(&ResetTarget::All).expect("reset"), 1);
        assert!(writer.get(&key("e-1")).expect("get").is_none());
    }
}
