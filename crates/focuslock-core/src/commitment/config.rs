use chrono::{DateTime, Datelike, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CommitmentTier, ExitPricing};

/// A calendar month in the user's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(at: DateTime<FixedOffset>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Commitment settings and this month's exit counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentConfig {
    pub is_enabled: bool,
    pub minimum_tier: CommitmentTier,
    pub exits_used_this_month: u32,
    pub current_exit_price_cents: u64,
    pub last_reset_month: YearMonth,
}

impl CommitmentConfig {
    pub fn new(pricing: &ExitPricing, month: YearMonth) -> Self {
        Self {
            is_enabled: true,
            minimum_tier: CommitmentTier::default(),
            exits_used_this_month: 0,
            current_exit_price_cents: pricing.price_for(0),
            last_reset_month: month,
        }
    }

    /// Reset the counters if `month` differs from the tracked month.
    ///
    /// Returns whether a reset happened.
    pub fn roll_month(&mut self, month: YearMonth, pricing: &ExitPricing) -> bool {
        if month == self.last_reset_month {
            return false;
        }
        self.exits_used_this_month = 0;
        self.current_exit_price_cents = pricing.price_for(0);
        self.last_reset_month = month;
        true
    }

    /// Count one paid exit and escalate the price.
    pub fn record_exit(&mut self, pricing: &ExitPricing) {
        self.exits_used_this_month = self.exits_used_this_month.saturating_add(1);
        self.current_exit_price_cents = pricing.price_for(self.exits_used_this_month);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARCH: YearMonth = YearMonth { year: 2026, month: 3 };
    const APRIL: YearMonth = YearMonth { year: 2026, month: 4 };

    #[test]
    fn record_exit_escalates() {
        let pricing = ExitPricing::default();
        let mut config = CommitmentConfig::new(&pricing, MARCH);
        assert_eq!(config.current_exit_price_cents, 200);
        config.record_exit(&pricing);
        config.record_exit(&pricing);
        assert_eq!(config.exits_used_this_month, 2);
        assert_eq!(config.current_exit_price_cents, 800);
    }

    #[test]
    fn new_month_resets_regardless_of_escalation() {
        let pricing = ExitPricing::default();
        let mut config = CommitmentConfig::new(&pricing, MARCH);
        for _ in 0..6 {
            config.record_exit(&pricing);
        }
        assert_eq!(config.current_exit_price_cents, 5000);

        assert!(!config.roll_month(MARCH, &pricing));
        assert!(config.roll_month(APRIL, &pricing));
        assert_eq!(config.exits_used_this_month, 0);
        assert_eq!(config.current_exit_price_cents, 200);
        assert_eq!(config.last_reset_month, APRIL);
        assert_eq!(APRIL.to_string(), "2026-04");
    }
}
