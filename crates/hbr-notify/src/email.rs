//! SMTP email notifier via `lettre`.
//!
//! Configured from `mailto://[user[:password]@]domain[:port][?to=..&from=..&smtp=..]`.
//! `mailto` talks plain SMTP on port 25 by default; `mailtos` uses STARTTLS on
//! 587, and port 465 always means implicit TLS.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::traits::{Notification, Notifier, NotifyError};

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SENDER: &str = "homebox-reminders";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    Plain,
    StartTls,
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

impl SmtpSettings {
    pub fn from_url(raw: &str) -> Result<Self, NotifyError> {
        let url = reqwest::Url::parse(raw.trim())
            .map_err(|err| NotifyError::Config(format!("invalid mailto URL: {err}")))?;
        let secure = match url.scheme() {
            "mailto" => false,
            "mailtos" => true,
            other => {
                return Err(NotifyError::Config(format!(
                    "email notifier URL must use mailto:// or mailtos://, got {other:?}"
                )))
            }
        };
        let domain = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| NotifyError::Config("mailto URL needs a domain".to_string()))?
            .to_string();

        let mut username = non_empty(decode(url.username())?);
        let mut password = url.password().map(decode).transpose()?.and_then(non_empty);
        let mut from = None;
        let mut smtp_host = None;
        let mut port = url.port();
        let mut to = Vec::new();
        for (name, value) in url.query_pairs() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.to_ascii_lowercase().as_str() {
                "to" => to.extend(
                    value
                        .split([',', ' '])
                        .filter(|address| !address.is_empty())
                        .map(str::to_string),
                ),
                "from" => from = Some(value.to_string()),
                "smtp" => smtp_host = Some(value.to_string()),
                "user" => username = Some(value.to_string()),
                "pass" => password = Some(value.to_string()),
                "port" => {
                    port = Some(value.parse().map_err(|_| {
                        NotifyError::Config(format!("invalid SMTP port {value:?}"))
                    })?)
                }
                _ => {}
            }
        }

        let port = port.unwrap_or(if secure { 587 } else { 25 });
        let security = match (port, secure) {
            (465, _) => SmtpSecurity::Implicit,
            (_, true) => SmtpSecurity::StartTls,
            (_, false) => SmtpSecurity::Plain,
        };
        let from = from.unwrap_or_else(|| match username.as_deref() {
            Some(user) if user.contains('@') => user.to_string(),
            Some(user) => format!("{user}@{domain}"),
            None => format!("{DEFAULT_SENDER}@{domain}"),
        });
        if to.is_empty() {
            to.push(from.clone());
        }

        Ok(Self {
            host: smtp_host.unwrap_or(domain),
            port,
            security,
            username,
            password,
            from,
            to,
        })
    }
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|err: lettre::address::AddressError| {
                NotifyError::Config(format!("invalid sender {:?}: {err}", settings.from))
            })?;
        let to = settings
            .to
            .iter()
            .map(|address| {
                address
                    .parse()
                    .map_err(|err: lettre::address::AddressError| {
                        NotifyError::Config(format!("invalid recipient {address:?}: {err}"))
                    })
            })
            .collect::<Result<Vec<Mailbox>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut builder = match settings.security {
            SmtpSecurity::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|err| NotifyError::Config(err.to_string()))?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|err| NotifyError::Config(err.to_string()))?
            }
            SmtpSecurity::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
        }
        .port(settings.port)
        .timeout(Some(SMTP_TIMEOUT));
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    pub fn from_url(raw: &str) -> Result<Self, NotifyError> {
        Self::new(&SmtpSettings::from_url(raw)?)
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut message = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            message = message.to(recipient.clone());
        }
        let email = message
            .subject(&notification.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|err| NotifyError::Smtp(err.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|err| NotifyError::Smtp(err.to_string()))?;

        tracing::debug!(recipients = self.to.len(), "email notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}

fn decode(raw: &str) -> Result<String, NotifyError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|err| NotifyError::Config(format!("invalid percent-encoding in mailto URL: {err}")))
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}
