//! Generic HTTP webhook notifier.
//!
//! Posts `{"title": ..., "text": ...}` to the configured URL, which is the
//! shape chat webhooks (Slack-compatible, Mattermost, ntfy JSON) accept.

use std::time::Duration;

use serde::Serialize;

use crate::traits::{Notification, Notifier, NotifyError};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    text: &'a str,
}

#[derive(Debug)]
pub struct WebhookNotifier {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Only `http` and `https` URLs are accepted.
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let url = parse_webhook_url(url)?;
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            title: &notification.subject,
            text: &notification.body,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %redacted(&self.url),
                %status,
                body = %body,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %redacted(&self.url), %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

fn parse_webhook_url(raw: &str) -> Result<reqwest::Url, NotifyError> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|err| NotifyError::Config(format!("invalid notifier URL {raw:?}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(NotifyError::Config(format!(
            "unsupported notifier scheme {other:?} in {raw:?}; only http and https are supported"
        ))),
    }
}

// Webhook URLs usually embed a secret in the path or query.
fn redacted(url: &reqwest::Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.port().map(|port| format!(":{port}")).unwrap_or_default()
    )
}
