use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const KEY_SEPARATOR: char = '/';
pub const DATE_FORMAT: &str = "%Y-%m-%d";
const UNNAMED: &str = "<unnamed>";

/// One maintenance entry as observed in a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub item_id: String,
    pub entry_id: String,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub completed_date: Option<NaiveDate>,
}

impl MaintenanceRecord {
    pub fn new(
        item_id: impl Into<String>,
        entry_id: impl Into<String>,
        scheduled_date: NaiveDate,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            entry_id: entry_id.into(),
            scheduled_date,
            description: None,
            name: None,
            item_name: None,
            completed_date: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_item_name(mut self, item_name: impl Into<String>) -> Self {
        self.item_name = Some(item_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn completed_on(mut self, completed_date: NaiveDate) -> Self {
        self.completed_date = Some(completed_date);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.completed_date.is_some()
    }

    pub fn display_name(&self) -> &str {
        non_empty(self.name.as_deref()).unwrap_or(UNNAMED)
    }

    pub fn key_for(&self, occurrence_date: NaiveDate) -> ReminderKey {
        ReminderKey {
            item_id: self.item_id.clone(),
            entry_id: self.entry_id.clone(),
            occurrence_date,
        }
    }

    pub fn snapshot(&self) -> ReminderSnapshot {
        ReminderSnapshot {
            name: self.name.clone(),
            item_name: self.item_name.clone(),
            description: self.description.clone(),
            scheduled_date: self.scheduled_date,
        }
    }
}

/// Stable identity of one occurrence: `<item>/<entry>/<YYYY-MM-DD>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub item_id: String,
    pub entry_id: String,
    pub occurrence_date: NaiveDate,
}

impl ReminderKey {
    pub fn new(
        item_id: impl Into<String>,
        entry_id: impl Into<String>,
        occurrence_date: NaiveDate,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            entry_id: entry_id.into(),
            occurrence_date,
        }
    }
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.item_id,
            self.entry_id,
            self.occurrence_date.format(DATE_FORMAT)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("reminder key must look like <item>/<entry>/<YYYY-MM-DD>, got {0:?}")]
    Malformed(String),
    #[error("invalid occurrence date {date:?} in reminder key")]
    InvalidDate { date: String },
}

impl FromStr for ReminderKey {
    type Err = KeyParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        // Entry ids may contain the separator; item ids and dates never do.
        let (rest, date_raw) = trimmed
            .rsplit_once(KEY_SEPARATOR)
            .ok_or_else(|| KeyParseError::Malformed(trimmed.to_string()))?;
        let (item_id, entry_id) = rest
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| KeyParseError::Malformed(trimmed.to_string()))?;
        if entry_id.is_empty() {
            return Err(KeyParseError::Malformed(trimmed.to_string()));
        }
        let occurrence_date = NaiveDate::parse_from_str(date_raw, DATE_FORMAT).map_err(|_| {
            KeyParseError::InvalidDate {
                date: date_raw.to_string(),
            }
        })?;

        Ok(Self {
            item_id: item_id.to_string(),
            entry_id: entry_id.to_string(),
            occurrence_date,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "pending" => Ok(ReminderStatus::Pending),
            "sent" => Ok(ReminderStatus::Sent),
            other => Err(format!("Unknown reminder status: {other}")),
        }
    }
}

/// What the record looked like when its occurrence was first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub key: ReminderKey,
    pub status: ReminderStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub snapshot: ReminderSnapshot,
}

impl ReminderRecord {
    pub fn is_sent(&self) -> bool {
        self.status == ReminderStatus::Sent
    }

    /// Timestamp used for retention: last delivery when sent, else first sighting.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        match (self.status, self.last_sent_at) {
            (ReminderStatus::Sent, Some(sent_at)) => sent_at,
            _ => self.first_seen_at,
        }
    }

    pub fn display_name(&self) -> &str {
        non_empty(self.snapshot.name.as_deref()).unwrap_or(UNNAMED)
    }
}

/// A request to notify about one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireDecision {
    pub record: MaintenanceRecord,
    pub key: ReminderKey,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTarget {
    All,
    Key(ReminderKey),
}

impl FromStr for ResetTarget {
    type Err = KeyParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().eq_ignore_ascii_case("all") {
            return Ok(ResetTarget::All);
        }
        input.parse().map(ResetTarget::Key)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
