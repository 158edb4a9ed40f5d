//! Renders fire decisions into a single human-readable message.

use hbr_core::model::DATE_FORMAT;
use hbr_core::FireDecision;

use crate::traits::Notification;

pub const BATCH_TITLE: &str = "Homebox maintenance reminders";

/// One message for the whole cycle: a header line with the count, then one
/// line per due occurrence.
pub fn render_batch(decisions: &[FireDecision]) -> Notification {
    let mut lines = Vec::with_capacity(decisions.len() + 1);
    lines.push(format!("{BATCH_TITLE} ({}):", decisions.len()));

    for decision in decisions {
        let record = &decision.record;
        let mut line = format!(" - {}", record.display_name());
        if let Some(item_name) = record
            .item_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            line.push_str(&format!(" for {item_name}"));
        }
        line.push_str(&format!(
            " scheduled: {}",
            record.scheduled_date.format(DATE_FORMAT)
        ));
        if decision.key.occurrence_date != record.scheduled_date {
            line.push_str(&format!(
                " (due {})",
                decision.key.occurrence_date.format(DATE_FORMAT)
            ));
        }
        lines.push(line);
    }

    Notification {
        subject: BATCH_TITLE.to_string(),
        body: lines.join("\n"),
        keys: decisions
            .iter()
            .map(|decision| decision.key.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use hbr_core::MaintenanceRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn decision(record: MaintenanceRecord, occurrence: NaiveDate) -> FireDecision {
        FireDecision {
            key: record.key_for(occurrence),
            record,
            first_seen_at: Utc
                .with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn renders_header_and_one_line_per_decision() {
        let decisions = vec![
            decision(
                MaintenanceRecord::new("i-1", "e-1", date(2024, 1, 10))
                    .with_name("Oil change")
                    .with_item_name("Generator"),
                date(2024, 1, 10),
            ),
            decision(
                MaintenanceRecord::new("i-2", "e-2", date(2024, 1, 1)),
                date(2024, 3, 1),
            ),
        ];

        let notification = render_batch(&decisions);
        assert_eq!(notification.subject, BATCH_TITLE);
        assert_eq!(
            notification.body,
            "Homebox maintenance reminders (2):\n \
             - Oil change for Generator scheduled: 2024-01-10\n \
             - <unnamed> scheduled: 2024-01-01 (due 2024-03-01)"
        );
        assert_eq!(
            notification.keys,
            vec!["i-1/e-1/2024-01-10", "i-2/e-2/2024-03-01"]
        );
    }
}
