pub mod config;
pub mod model;
pub mod window;

pub use config::{ConfigError, ReminderConfig};
pub use model::{
    FireDecision, KeyParseError, MaintenanceRecord, ReminderKey, ReminderRecord, ReminderSnapshot,
    ReminderStatus, ResetTarget,
};
pub use window::{evaluate, occurrence_date, Evaluation, WindowPolicy};
