use anyhow::{bail, Result};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args};
use hbr_core::ReminderConfig;
use std::path::PathBuf;
use std::time::Duration;

use crate::homebox::HomeboxConfig;

pub const DEFAULT_API_BASE: &str = "https://demo.homebox.software/api";
pub const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 3600;

/// Settings for the polling service. Every flag can also come from the
/// environment variable named next to it.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Homebox API root, e.g. https://homebox.local/api
    #[arg(long, env = "HOMEBOX_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    #[arg(long, env = "HOMEBOX_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    #[arg(long, env = "HOMEBOX_OIDC_TOKEN", hide_env_values = true)]
    pub oidc_token: Option<String>,

    /// File containing a bearer token
    #[arg(long, env = "HOMEBOX_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    #[arg(long, env = "HOMEBOX_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "HOMEBOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Days before the occurrence date that reminding starts
    #[arg(long, env = "REMIND_START_DAYS_BEFORE", default_value_t = 0, allow_negative_numbers = true)]
    pub start_days_before: i64,

    /// Days after the occurrence date that reminding stops
    #[arg(long, env = "REMIND_END_DAYS_AFTER", default_value_t = 0, allow_negative_numbers = true)]
    pub end_days_after: i64,

    /// Recurrence period in days; 0 means one-off
    #[arg(long, env = "REMIND_REPEAT_DAYS", default_value_t = 0, allow_negative_numbers = true)]
    pub repeat_days: i64,

    /// Prune reminders older than this at startup; 0 disables
    #[arg(long, env = "REMIND_RETENTION_DAYS", default_value_t = 0, allow_negative_numbers = true)]
    pub retention_days: i64,

    #[arg(long, env = "CHECK_INTERVAL_SECONDS", default_value_t = DEFAULT_CHECK_INTERVAL_SECONDS)]
    pub check_interval_seconds: u64,

    /// Single webhook URL
    #[arg(long, env = "NOTIFIER_WEBHOOK")]
    pub notifier_webhook: Option<String>,

    /// Notifier URLs (http(s)://, tgram://, mailto://, mailtos://) separated by
    /// commas, semicolons or whitespace
    #[arg(long, env = "NOTIFIER_URLS")]
    pub notifier_urls: Option<String>,

    /// Run a single cycle and exit
    #[arg(
        long = "once",
        env = "RUN_ONCE",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub run_once: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub homebox: HomeboxConfig,
    pub reminders: ReminderConfig,
    pub check_interval: Duration,
    pub run_once: bool,
    pub notifier_urls: Vec<String>,
}

impl RunArgs {
    pub fn into_config(self) -> Result<ServiceConfig> {
        let reminders = ReminderConfig::from_raw(
            self.start_days_before,
            self.end_days_after,
            self.repeat_days,
            self.retention_days,
        )?;
        if self.check_interval_seconds == 0 {
            bail!("CHECK_INTERVAL_SECONDS must be at least 1");
        }
        let api_base = self.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            bail!("HOMEBOX_API_BASE must not be empty");
        }

        Ok(ServiceConfig {
            homebox: HomeboxConfig {
                api_base,
                api_token: non_empty(self.api_token),
                oidc_token: non_empty(self.oidc_token),
                token_file: self.token_file.filter(|path| !path.as_os_str().is_empty()),
                username: non_empty(self.username),
                password: non_empty(self.password),
            },
            reminders,
            check_interval: Duration::from_secs(self.check_interval_seconds),
            run_once: self.run_once,
            notifier_urls: parse_notifier_urls(
                self.notifier_urls.as_deref(),
                self.notifier_webhook.as_deref(),
            ),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Splits the URL list, appends the single webhook, and drops duplicates
/// while keeping first-seen order.
pub fn parse_notifier_urls(urls: Option<&str>, webhook: Option<&str>) -> Vec<String> {
    let listed = urls
        .unwrap_or_default()
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace());
    let single = webhook.into_iter();

    let mut parsed: Vec<String> = Vec::new();
    for url in listed.chain(single).map(str::trim) {
        if !url.is_empty() && !parsed.iter().any(|seen| seen == url) {
            parsed.push(url.to_string());
        }
    }
    parsed
}
