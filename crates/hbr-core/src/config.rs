use crate::window::WindowPolicy;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be a non-negative integer, got {value}")]
    Negative { field: &'static str, value: i64 },
    #[error("{field} is too large: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Validated reminder settings. Zero retention disables pruning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderConfig {
    pub window: WindowPolicy,
    pub retention_days: u32,
}

impl ReminderConfig {
    /// Builds the config from raw integers as they arrive from flags or the
    /// environment, rejecting negative values.
    pub fn from_raw(
        start_days_before: i64,
        end_days_after: i64,
        repeat_days: i64,
        retention_days: i64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            window: WindowPolicy {
                start_days_before: days("REMIND_START_DAYS_BEFORE", start_days_before)?,
                end_days_after: days("REMIND_END_DAYS_AFTER", end_days_after)?,
                repeat_days: days("REMIND_REPEAT_DAYS", repeat_days)?,
            },
            retention_days: days("REMIND_RETENTION_DAYS", retention_days)?,
        })
    }

    pub fn pruning_enabled(&self) -> bool {
        self.retention_days > 0
    }
}

fn days(field: &'static str, value: i64) -> Result<u32, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Negative { field, value });
    }
    u32::try_from(value).map_err(|_| ConfigError::OutOfRange { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_zero_and_disable_pruning() {
        let config = ReminderConfig::from_raw(0, 0, 0, 0).expect("valid config");
        assert_eq!(config, ReminderConfig::default());
        assert!(!config.pruning_enabled());
    }

    #[test]
    fn negative_values_are_rejected_with_field_name() {
        let err = ReminderConfig::from_raw(0, -1, 0, 0).expect_err("negative end");
        assert_eq!(
            err,
            ConfigError::Negative {
                field: "REMIND_END_DAYS_AFTER",
                value: -1
            }
        );
        assert!(ReminderConfig::from_raw(0, 0, 0, -30).is_err());
    }

    #[test]
    fn oversized_values_are_rejected() {
        let err = ReminderConfig::from_raw(i64::from(u32::MAX) + 1, 0, 0, 0).expect_err("too big");
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn valid_values_land_in_window_policy() {
        let config = ReminderConfig::from_raw(2, 1, 30, 90).expect("valid config");
        assert_eq!(config.window, WindowPolicy::new(2, 1, 30));
        assert_eq!(config.retention_days, 90);
        assert!(config.pruning_enabled());
    }
}
