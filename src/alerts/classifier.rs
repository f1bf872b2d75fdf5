//! Tier classification by USD amount

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::ConfigError;
use crate::types::AlertTier;

/// Inclusive lower bounds for each alerting tier, strictly increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierThresholds {
    dolphin: Decimal,
    whale: Decimal,
    orc: Decimal,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            dolphin: dec!(1000),
            whale: dec!(10000),
            orc: dec!(50000),
        }
    }
}

impl TierThresholds {
    pub fn new(dolphin: Decimal, whale: Decimal, orc: Decimal) -> Result<Self, ConfigError> {
        if dolphin.is_sign_negative() || !(dolphin < whale && whale < orc) {
            return Err(ConfigError::ThresholdOrder {
                dolphin,
                whale,
                orc,
            });
        }
        Ok(Self {
            dolphin,
            whale,
            orc,
        })
    }

    /// Lower bound of `tier`; `None` has no bound
    pub fn lower_bound(&self, tier: AlertTier) -> Option<Decimal> {
        match tier {
            AlertTier::None => None,
            AlertTier::Dolphin => Some(self.dolphin),
            AlertTier::Whale => Some(self.whale),
            AlertTier::Orc => Some(self.orc),
        }
    }

    /// Smallest amount that alerts at all. Used as the server-side filter.
    pub fn minimum(&self) -> Decimal {
        self.dolphin
    }
}

/// Maps USD amounts to alert tiers
#[derive(Debug, Clone, Copy, Default)]
pub struct TierClassifier {
    thresholds: TierThresholds,
}

impl TierClassifier {
    pub fn new(thresholds: TierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    /// Highest tier whose lower bound is <= `amount_usd`
    pub fn classify(&self, amount_usd: Decimal) -> AlertTier {
        if amount_usd >= self.thresholds.orc {
            AlertTier::Orc
        } else if amount_usd >= self.thresholds.whale {
            AlertTier::Whale
        } else if amount_usd >= self.thresholds.dolphin {
            AlertTier::Dolphin
        } else {
            AlertTier::None
        }
    }

    /// Human-readable range for a tier, e.g. `$10,000.00 - $49,999.99`
    pub fn describe(&self, tier: AlertTier) -> String {
        let cent = dec!(0.01);
        match tier {
            AlertTier::None => format!("below {}", super::format_usd(self.thresholds.dolphin)),
            AlertTier::Dolphin => format!(
                "{} - {}",
                super::format_usd(self.thresholds.dolphin),
                super::format_usd(self.thresholds.whale - cent)
            ),
            AlertTier::Whale => format!(
                "{} - {}",
                super::format_usd(self.thresholds.whale),
                super::format_usd(self.thresholds.orc - cent)
            ),
            AlertTier::Orc => format!("{}+", super::format_usd(self.thresholds.orc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> TierClassifier {
        TierClassifier::default()
    }

    #[test]
    fn classify_boundaries_belong_to_higher_tier() {
        let c = classifier();
        assert_eq!(c.classify(dec!(10000)), AlertTier::Whale);
        assert_eq!(c.classify(dec!(9999.99)), AlertTier::Dolphin);
        assert_eq!(c.classify(dec!(50000)), AlertTier::Orc);
        assert_eq!(c.classify(dec!(1000)), AlertTier::Dolphin);
        assert_eq!(c.classify(dec!(999.99)), AlertTier::None);
    }

    #[test]
    fn classify_scenarios() {
        let c = classifier();
        assert_eq!(c.classify(dec!(5000)), AlertTier::Dolphin);
        assert_eq!(c.classify(dec!(75000)), AlertTier::Orc);
        assert_eq!(c.classify(dec!(500)), AlertTier::None);
        assert_eq!(c.classify(Decimal::ZERO), AlertTier::None);
    }

    #[test]
    fn classify_is_monotonic() {
        let c = classifier();
        let amounts = [
            dec!(0),
            dec!(1),
            dec!(999.99),
            dec!(1000),
            dec!(4321.5),
            dec!(9999.99),
            dec!(10000),
            dec!(10000.01),
            dec!(49999.99),
            dec!(50000),
            dec!(1000000),
        ];
        for pair in amounts.windows(2) {
            assert!(
                c.classify(pair[0]) <= c.classify(pair[1]),
                "classify({}) > classify({})",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn custom_thresholds_are_respected() {
        let thresholds = TierThresholds::new(dec!(10), dec!(20), dec!(30)).unwrap();
        let c = TierClassifier::new(thresholds);
        assert_eq!(c.classify(dec!(19.99)), AlertTier::Dolphin);
        assert_eq!(c.classify(dec!(20)), AlertTier::Whale);
        assert_eq!(thresholds.minimum(), dec!(10));
        assert_eq!(thresholds.lower_bound(AlertTier::Orc), Some(dec!(30)));
        assert_eq!(thresholds.lower_bound(AlertTier::None), None);
    }

    #[test]
    fn thresholds_must_increase() {
        assert!(TierThresholds::new(dec!(10), dec!(10), dec!(30)).is_err());
        assert!(TierThresholds::new(dec!(30), dec!(20), dec!(10)).is_err());
        assert!(TierThresholds::new(dec!(-1), dec!(20), dec!(30)).is_err());
    }

    #[test]
    fn describe_renders_ranges() {
        let c = classifier();
        assert_eq!(c.describe(AlertTier::Dolphin), "$1,000.00 - $9,999.99");
        assert_eq!(c.describe(AlertTier::Whale), "$10,000.00 - $49,999.99");
        assert_eq!(c.describe(AlertTier::Orc), "$50,000.00+");
    }
}
