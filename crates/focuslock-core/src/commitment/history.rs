use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One paid emergency exit. Created once, never edited except for an
/// optional rating the user may add afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    /// Row id, zero until stored.
    #[serde(default)]
    pub id: i64,
    pub session_id: String,
    pub focused_secs: i64,
    pub remaining_secs: i64,
    pub timestamp: DateTime<Utc>,
    pub price_paid_cents: u64,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl ExitRecord {
    pub fn focused(&self) -> Duration {
        Duration::seconds(self.focused_secs)
    }

    pub fn remaining(&self) -> Duration {
        Duration::seconds(self.remaining_secs)
    }
}

/// Advisory text when exits cluster in the trailing window.
///
/// Purely informational; enforcement never reads it.
pub fn pattern_warning(
    history: &[ExitRecord],
    now: DateTime<Utc>,
    window_days: u32,
    threshold: usize,
) -> Option<String> {
    let since = now - Duration::days(i64::from(window_days));
    let recent = history.iter().filter(|r| r.timestamp >= since && r.timestamp <= now).count();
    (recent >= threshold).then(|| {
        format!(
            "You've used {recent} emergency exits in the last {window_days} days. \
             Consider shorter sessions or a lower commitment tier."
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn exit_at(at: DateTime<Utc>) -> ExitRecord {
        ExitRecord {
            id: 0,
            session_id: uuid::Uuid::new_v4().to_string(),
            focused_secs: 20 * 60,
            remaining_secs: 40 * 60,
            timestamp: at,
            price_paid_cents: 200,
            rating: None,
        }
    }

    #[test]
    fn warns_at_threshold_within_window() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let mut history = vec![
            exit_at(now - Duration::days(1)),
            exit_at(now - Duration::days(3)),
        ];
        assert!(pattern_warning(&history, now, 7, 3).is_none());

        history.push(exit_at(now - Duration::days(6)));
        let warning = pattern_warning(&history, now, 7, 3).unwrap();
        assert!(warning.contains("3 emergency exits"));
    }

    #[test]
    fn old_exits_do_not_count() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let history = vec![
            exit_at(now - Duration::days(1)),
            exit_at(now - Duration::days(8)),
            exit_at(now - Duration::days(30)),
        ];
        assert!(pattern_warning(&history, now, 7, 2).is_none());
    }
}
