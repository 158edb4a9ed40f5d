use chrono::{Days, NaiveDate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowPolicy {
    pub start_days_before: u32,
    pub end_days_after: u32,
    /// Zero means the schedule fires once.
    pub repeat_days: u32,
}

impl WindowPolicy {
    pub fn new(start_days_before: u32, end_days_after: u32, repeat_days: u32) -> Self {
        Self {
            start_days_before,
            end_days_after,
            repeat_days,
        }
    }

    pub fn evaluate(&self, scheduled_date: NaiveDate, current_date: NaiveDate) -> Evaluation {
        evaluate(
            scheduled_date,
            current_date,
            self.start_days_before,
            self.end_days_after,
            self.repeat_days,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub occurrence_date: NaiveDate,
    pub in_window: bool,
}

/// Latest occurrence not after `current_date`, or the scheduled date itself.
pub fn occurrence_date(
    scheduled_date: NaiveDate,
    current_date: NaiveDate,
    repeat_days: u32,
) -> NaiveDate {
    if repeat_days == 0 || scheduled_date >= current_date {
        return scheduled_date;
    }

    let elapsed = (current_date - scheduled_date).num_days().unsigned_abs();
    let step = u64::from(repeat_days);
    let offset = elapsed / step * step;
    scheduled_date
        .checked_add_days(Days::new(offset))
        .unwrap_or(scheduled_date)
}

// Inclusive on both ends; edges outside chrono's range are unbounded.
pub fn evaluate(
    scheduled_date: NaiveDate,
    current_date: NaiveDate,
    start_days_before: u32,
    end_days_after: u32,
    repeat_days: u32,
) -> Evaluation {
    let occurrence_date = occurrence_date(scheduled_date, current_date, repeat_days);
    let opens = occurrence_date
        .checked_sub_days(Days::new(u64::from(start_days_before)))
        .unwrap_or(NaiveDate::MIN);
    let closes = occurrence_date
        .checked_add_days(Days::new(u64::from(end_days_after)))
        .unwrap_or(NaiveDate::MAX);

    Evaluation {
        occurrence_date,
        in_window: opens <= current_date && current_date <= closes,
    }
}
