//! Telegram Bot API notifier.
//!
//! Configured from `tgram://<bot token>/<chat id>[/<chat id>...]` and sends
//! the plain-text message to every chat through `sendMessage`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::traits::{Notification, Notifier, NotifyError};

const TELEGRAM_API: &str = "https://api.telegram.org";
const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug)]
pub struct TelegramNotifier {
    bot_token: String,
    chat_ids: Vec<String>,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_ids: Vec<String>) -> Result<Self, NotifyError> {
        let bot_token = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }
        if chat_ids.is_empty() {
            return Err(NotifyError::Config(
                "Telegram notifier needs at least one chat id".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(TELEGRAM_TIMEOUT)
            .build()?;
        Ok(Self {
            bot_token,
            chat_ids,
            client,
        })
    }

    pub fn from_url(raw: &str) -> Result<Self, NotifyError> {
        let raw = raw.trim();
        let rest = match raw.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("tgram") => rest,
            _ => {
                return Err(NotifyError::Config(
                    "Telegram notifier URL must start with tgram://".to_string(),
                ))
            }
        };
        let path = rest.split(['?', '#']).next().unwrap_or_default();
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());

        let token = segments.next().unwrap_or_default();
        // The API path already carries the `bot` prefix.
        let token = match token.strip_prefix("bot") {
            Some(stripped) if stripped.starts_with(|c: char| c.is_ascii_digit()) => stripped,
            _ => token,
        };
        let chat_ids = segments
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|decoded| decoded.into_owned())
                    .map_err(|err| NotifyError::Config(format!("invalid Telegram chat id: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(token, chat_ids)
    }

    pub fn chat_ids(&self) -> &[String] {
        &self.chat_ids
    }

    fn endpoint(&self) -> String {
        format!("{TELEGRAM_API}/bot{}/sendMessage", self.bot_token)
    }

    async fn send_to(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&SendMessage { chat_id, text })
            .send()
            .await?;
        let status = response.status();
        let reply: TelegramResponse = response.json().await.unwrap_or_default();

        if status.is_success() && reply.ok {
            return Ok(());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = reply
                .parameters
                .and_then(|parameters| parameters.retry_after)
                .unwrap_or(30);
            return Err(NotifyError::RateLimited { retry_after_secs });
        }
        Err(NotifyError::Telegram(reply.description.unwrap_or_else(|| {
            format!("sendMessage returned {status}")
        })))
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    /// Tries every chat; fails if any chat did not receive the message.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut first_error = None;
        for chat_id in &self.chat_ids {
            match self.send_to(chat_id, &notification.body).await {
                Ok(()) => tracing::debug!(chat_id = %chat_id, "Telegram notification sent"),
                Err(err) => {
                    tracing::warn!(chat_id = %chat_id, error = %err, "Telegram delivery failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}
