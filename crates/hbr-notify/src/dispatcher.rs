//! Routes a rendered message to every configured channel.
//!
//! Individual channel failures don't block other channels. A message counts
//! as delivered when at least one channel accepted it.

use crate::email::EmailNotifier;
use crate::log_notifier::LogNotifier;
use crate::telegram::TelegramNotifier;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

pub const SUPPORTED_SCHEMES: [&str; 5] = ["http", "https", "tgram", "mailto", "mailtos"];

/// Builds the channel a notifier URL's scheme names.
pub fn channel_from_url(raw: &str) -> Result<Box<dyn Notifier>, NotifyError> {
    let raw = raw.trim();
    let scheme = url_scheme(raw)
        .ok_or_else(|| NotifyError::Config("notifier URL has no scheme".to_string()))?;
    match scheme.as_str() {
        "http" | "https" => Ok(Box::new(WebhookNotifier::new(raw)?)),
        "tgram" => Ok(Box::new(TelegramNotifier::from_url(raw)?)),
        "mailto" | "mailtos" => Ok(Box::new(EmailNotifier::from_url(raw)?)),
        other => Err(NotifyError::Config(format!(
            "unsupported notifier scheme {other:?}; supported: {}",
            SUPPORTED_SCHEMES.join(", ")
        ))),
    }
}

fn url_scheme(raw: &str) -> Option<String> {
    raw.split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .filter(|scheme| !scheme.is_empty())
}

#[derive(Debug, Default, Clone)]
pub struct DispatchSummary {
    pub results: Vec<DispatchResult>,
}

impl DispatchSummary {
    pub fn delivered(&self) -> bool {
        self.results.iter().any(|result| result.success)
    }

    pub fn failed_channels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| !result.success)
            .map(|result| result.channel.as_str())
            .collect()
    }
}

pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// One channel per usable URL, in order. URLs that can't be turned into a
    /// channel are logged and skipped; with none left the log channel is used.
    pub fn from_urls(urls: &[String]) -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::with_capacity(urls.len());
        for url in urls {
            match channel_from_url(url) {
                Ok(channel) => channels.push(channel),
                // URLs carry credentials; only the scheme is logged.
                Err(e) => tracing::warn!(
                    event = "notifier_skipped",
                    scheme = url_scheme(url).as_deref().unwrap_or("<none>"),
                    error = %e,
                    "Failed to add notifier"
                ),
            }
        }

        if channels.is_empty() {
            channels.push(Box::new(LogNotifier));
        }
        Self::new(channels)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels
            .iter()
            .map(|channel| channel.channel_name())
            .collect()
    }

    pub async fn dispatch(&self, notification: &Notification) -> DispatchSummary {
        if self.channels.is_empty() {
            tracing::debug!("No notification channels configured");
            return DispatchSummary::default();
        }

        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        channel = channel.channel_name(),
                        reminders = notification.keys.len(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        DispatchSummary { results }
    }
}
