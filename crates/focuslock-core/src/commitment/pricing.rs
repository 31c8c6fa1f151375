use serde::{Deserialize, Serialize};

/// Escalating emergency exit price: `min(max, base × multiplier^exits)`.
///
/// Prices are whole cents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitPricing {
    pub base_price_cents: u64,
    pub multiplier: f64,
    pub max_price_cents: u64,
}

impl Default for ExitPricing {
    fn default() -> Self {
        Self {
            base_price_cents: 200,
            multiplier: 2.0,
            max_price_cents: 5000,
        }
    }
}

impl ExitPricing {
    /// Price of the next exit after `exits_used` exits this month.
    pub fn price_for(&self, exits_used: u32) -> u64 {
        let exponent = i32::try_from(exits_used).unwrap_or(i32::MAX);
        let raw = self.base_price_cents as f64 * self.multiplier.powi(exponent);
        if !raw.is_finite() || raw >= self.max_price_cents as f64 {
            return self.max_price_cents;
        }
        (raw.round() as u64).min(self.max_price_cents)
    }

    /// Product id for buying an exit at `price_cents`.
    pub fn product_id(prefix: &str, price_cents: u64) -> String {
        format!("{prefix}.{price_cents}")
    }
}

/// Format cents as dollars, e.g. `$2.00`.
pub fn format_price(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubling_sequence_hits_cap() {
        let pricing = ExitPricing {
            base_price_cents: 200,
            multiplier: 2.0,
            max_price_cents: 5000,
        };
        let prices: Vec<u64> = (0..=6).map(|n| pricing.price_for(n)).collect();
        assert_eq!(prices, vec![200, 400, 800, 1600, 3200, 5000, 5000]);
    }

    #[test]
    fn huge_exit_counts_stay_at_cap() {
        let pricing = ExitPricing::default();
        assert_eq!(pricing.price_for(u32::MAX), 5000);
    }

    #[test]
    fn fractional_multiplier_rounds_to_cents() {
        let pricing = ExitPricing {
            base_price_cents: 199,
            multiplier: 1.5,
            max_price_cents: 10_000,
        };
        assert_eq!(pricing.price_for(1), 299);
    }

    #[test]
    fn formats_dollars() {
        assert_eq!(format_price(200), "$2.00");
        assert_eq!(format_price(5), "$0.05");
        assert_eq!(format_price(5000), "$50.00");
        assert_eq!(ExitPricing::product_id("focuslock.exit", 400), "focuslock.exit.400");
    }

    proptest! {
        #[test]
        fn price_is_monotonic_and_capped(
            base in 1u64..1_000,
            multiplier in 1.0f64..4.0,
            cap_extra in 0u64..100_000,
            n in 0u32..64,
        ) {
            let pricing = ExitPricing { base_price_cents: base, multiplier, max_price_cents: base + cap_extra };
            let current = pricing.price_for(n);
            let next = pricing.price_for(n + 1);
            prop_assert!(next >= current);
            prop_assert!(current <= pricing.max_price_cents);
            prop_assert!(pricing.price_for(0) == base);
        }
    }
}
