//! Delivery side of the reminder service.
//!
//! - `Notifier` trait for pluggable channels
//! - webhook, Telegram, email and log channels
//! - `render_batch` turning fire decisions into one message
//! - `Dispatcher` fanning a message out to every configured channel

pub mod dispatcher;
pub mod email;
pub mod log_notifier;
pub mod message;
pub mod telegram;
pub mod traits;
pub mod webhook;

pub use dispatcher::{channel_from_url, DispatchSummary, Dispatcher, SUPPORTED_SCHEMES};
pub use email::{EmailNotifier, SmtpSecurity, SmtpSettings};
pub use log_notifier::LogNotifier;
pub use message::{render_batch, BATCH_TITLE};
pub use telegram::TelegramNotifier;
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
