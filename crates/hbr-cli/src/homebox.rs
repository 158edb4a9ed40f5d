//! Homebox REST client: authentication and the scheduled-maintenance feed.
//!
//! Entries are normalised into `MaintenanceRecord`s here so nothing past this
//! module deals with the API's field-name variants.

use chrono::{DateTime, Datelike, NaiveDate};
use hbr_core::model::DATE_FORMAT;
use hbr_core::MaintenanceRecord;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HomeboxConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub oidc_token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Error)]
pub enum HomeboxError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Homebox rejected the request as unauthorized (401); set HOMEBOX_API_TOKEN or HOMEBOX_USERNAME/HOMEBOX_PASSWORD")]
    Unauthorized,
    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },
    #[error("login response did not contain a token")]
    MissingToken,
    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("maintenance entry is not a JSON object")]
    NotAnObject,
    #[error("maintenance entry {id:?} has no scheduled date")]
    MissingScheduledDate { id: String },
    #[error("maintenance entry {id:?} has an unusable scheduled date {raw:?}")]
    InvalidScheduledDate { id: String, raw: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    stay_logged_in: bool,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default, alias = "Token")]
    token: Option<String>,
}

pub struct HomeboxClient {
    config: HomeboxConfig,
    client: reqwest::Client,
    login_token: Option<String>,
}

impl HomeboxClient {
    pub fn new(config: HomeboxConfig) -> Result<Self, HomeboxError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            client,
            login_token: None,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Fetches entries with `status=scheduled`. Entries that can't be turned
    /// into records are logged and skipped.
    pub async fn fetch_scheduled(&mut self) -> Result<Vec<MaintenanceRecord>, HomeboxError> {
        let url = self.endpoint("v1/maintenance");
        let mut request = self
            .client
            .get(&url)
            .query(&[("status", "scheduled")])
            .header(ACCEPT, "application/json");
        if let Some(token) = self.resolve_token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // A cached login token may have expired; log in again next time.
            self.login_token = None;
            return Err(HomeboxError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HomeboxError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| HomeboxError::Decode(err.to_string()))?;
        let records = records_from_payload(&payload);
        info!(event = "homebox_fetch", url = %url, records = records.len());
        Ok(records)
    }

    /// API token, then OIDC token, then token file, then a login with
    /// username and password.
    async fn resolve_token(&mut self) -> Option<String> {
        if let Some(token) = self.config.api_token.as_deref() {
            return Some(strip_bearer(token));
        }
        if let Some(token) = self.config.oidc_token.as_deref() {
            return Some(strip_bearer(token));
        }
        if let Some(path) = self.config.token_file.as_ref() {
            match std::fs::read_to_string(path) {
                Ok(raw) if !raw.trim().is_empty() => return Some(strip_bearer(&raw)),
                Ok(_) => warn!(event = "token_file_empty", path = %path.display()),
                Err(err) => warn!(
                    event = "token_file_unreadable",
                    path = %path.display(),
                    error = %err
                ),
            }
        }
        if let Some(token) = self.login_token.as_ref() {
            return Some(token.clone());
        }

        let (Some(username), Some(password)) = (
            self.config.username.clone(),
            self.config.password.clone(),
        ) else {
            debug!(event = "homebox_anonymous", "no Homebox credentials configured");
            return None;
        };
        match self.login(&username, &password).await {
            Ok(token) => {
                info!(event = "homebox_login", username = %username);
                self.login_token = Some(token.clone());
                Some(token)
            }
            Err(err) => {
                warn!(event = "homebox_login_failed", username = %username, error = %err);
                None
            }
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, HomeboxError> {
        let url = self.endpoint("v1/users/login");
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username,
                password,
                stay_logged_in: false,
            })
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(HomeboxError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HomeboxError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|err| HomeboxError::Decode(err.to_string()))?;
        login
            .token
            .map(|token| strip_bearer(&token))
            .filter(|token| !token.is_empty())
            .ok_or(HomeboxError::MissingToken)
    }
}

pub fn strip_bearer(token: &str) -> String {
    let token = token.trim();
    token
        .strip_prefix("Bearer ")
        .unwrap_or(token)
        .trim()
        .to_string()
}

/// Accepts a bare array of entries or an object wrapping them in `items`.
pub fn records_from_payload(payload: &Value) -> Vec<MaintenanceRecord> {
    let entries: &[Value] = match payload {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(object) => match object.get("items") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|entry| match entry_to_record(entry) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(event = "maintenance_entry_skipped", error = %err);
                None
            }
        })
        .collect()
}

pub fn entry_to_record(value: &Value) -> Result<MaintenanceRecord, EntryError> {
    let entry = value.as_object().ok_or(EntryError::NotAnObject)?;

    let name = field(entry, &["name"]);
    let scheduled_raw = field(entry, &["scheduledDate", "scheduled_date"]);
    let id = field(entry, &["id", "ID", "Id"]).unwrap_or_else(|| {
        format!(
            "{}::{}",
            name.as_deref().unwrap_or_default(),
            scheduled_raw.as_deref().unwrap_or_default()
        )
    });

    let Some(scheduled_raw) = scheduled_raw else {
        return Err(EntryError::MissingScheduledDate { id });
    };
    let scheduled_date =
        parse_api_date(&scheduled_raw).ok_or_else(|| EntryError::InvalidScheduledDate {
            id: id.clone(),
            raw: scheduled_raw.clone(),
        })?;
    let item_id = field(entry, &["itemId", "itemID", "item_id"]).unwrap_or_default();

    let mut record = MaintenanceRecord::new(item_id, id, scheduled_date);
    record.name = name;
    record.item_name = field(entry, &["itemName", "item_name"]);
    record.description = field(entry, &["description"]);
    record.completed_date = field(entry, &["completedDate", "completed_date", "date"])
        .and_then(|raw| parse_api_date(&raw));
    Ok(record)
}

/// RFC 3339 timestamps and plain `YYYY-MM-DD` dates. Homebox encodes "no
/// date" as year 1, which comes back as `None`.
pub fn parse_api_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let date = DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok())
        .or_else(|| {
            raw.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok())
        })?;
    (date.year() > 1).then_some(date)
}

fn field(entry: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match entry.get(*name)? {
        Value::String(value) => Some(value.trim().to_string()).filter(|value| !value.is_empty()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_timestamps_dates_and_zero_dates() {
        assert_eq!(parse_api_date("2024-03-05"), Some(date(2024, 3, 5)));
        assert_eq!(
            parse_api_date("2024-03-05T00:00:00Z"),
            Some(date(2024, 3, 5))
        );
        assert_eq!(
            parse_api_date("2024-03-05T23:30:00-02:00"),
            Some(date(2024, 3, 5))
        );
        assert_eq!(parse_api_date("0001-01-01T00:00:00Z"), None);
        assert_eq!(parse_api_date(""), None);
        assert_eq!(parse_api_date("next tuesday"), None);
    }

    #[test]
    fn converts_entry_with_camel_case_fields() {
        let record = entry_to_record(&json!({
            "id": "e-1",
            "itemID": "i-1",
            "itemName": "Furnace",
            "name": "Replace filter",
            "description": "MERV 11",
            "scheduledDate": "2024-01-10T00:00:00Z",
            "completedDate": "0001-01-01T00:00:00Z"
        }))
        .expect("record");

        assert_eq!(record.entry_id, "e-1");
        assert_eq!(record.item_id, "i-1");
        assert_eq!(record.item_name.as_deref(), Some("Furnace"));
        assert_eq!(record.name.as_deref(), Some("Replace filter"));
        assert_eq!(record.description.as_deref(), Some("MERV 11"));
        assert_eq!(record.scheduled_date, date(2024, 1, 10));
        assert!(!record.is_completed());
    }

    #[test]
    fn snake_case_aliases_and_completed_dates() {
        let record = entry_to_record(&json!({
            "ID": 42,
            "item_id": "i-9",
            "scheduled_date": "2024-02-01",
            "completed_date": "2024-02-02"
        }))
        .expect("record");

        assert_eq!(record.entry_id, "42");
        assert_eq!(record.item_id, "i-9");
        assert_eq!(record.completed_date, Some(date(2024, 2, 2)));
        assert!(record.is_completed());
    }

    #[test]
    fn missing_id_falls_back_to_name_and_schedule() {
        let record = entry_to_record(&json!({
            "name": "Descale",
            "scheduledDate": "2024-05-01"
        }))
        .expect("record");
        assert_eq!(record.entry_id, "Descale::2024-05-01");
        assert_eq!(record.item_id, "");
    }

    #[test]
    fn unusable_entries_are_errors() {
        assert_eq!(entry_to_record(&json!("nope")), Err(EntryError::NotAnObject));
        assert_eq!(
            entry_to_record(&json!({"id": "e-1"})),
            Err(EntryError::MissingScheduledDate {
                id: "e-1".to_string()
            })
        );
        assert!(matches!(
            entry_to_record(&json!({"id": "e-1", "scheduledDate": "soon"})),
            Err(EntryError::InvalidScheduledDate { .. })
        ));
    }

    #[test]
    fn payload_may_be_array_or_items_wrapper() {
        let entry = json!({"id": "e-1", "itemId": "i-1", "scheduledDate": "2024-01-10"});
        let bad = json!({"id": "e-2"});

        assert_eq!(records_from_payload(&json!([entry.clone(), bad.clone()])).len(), 1);
        assert_eq!(
            records_from_payload(&json!({"items": [entry, bad], "total": 2})).len(),
            1
        );
        assert!(records_from_payload(&json!({"error": "x"})).is_empty());
        assert!(records_from_payload(&json!(null)).is_empty());
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        assert_eq!(strip_bearer("Bearer abc.def"), "abc.def");
        assert_eq!(strip_bearer("  abc.def\n"), "abc.def");
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let client = HomeboxClient::new(HomeboxConfig {
            api_base: "https://homebox.local/api/".to_string(),
            ..HomeboxConfig::default()
        })
        .expect("client");
        assert_eq!(
            client.endpoint("/v1/maintenance"),
            "https://homebox.local/api/v1/maintenance"
        );
    }

    #[test]
    fn login_request_uses_homebox_field_names() {
        let body = serde_json::to_value(LoginRequest {
            username: "admin",
            password: "secret",
            stay_logged_in: false,
        })
        .expect("serialize");
        assert_eq!(
            body,
            json!({"username": "admin", "password": "secret", "stayLoggedIn": false})
        );
    }
}
