//! Core types used throughout the alert pipeline
//!
//! Defines liquidity directions, alert tiers and the canonical transaction record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pool label used when token symbols cannot be resolved
pub const UNKNOWN_POOL: &str = "UNKNOWN";

/// Whether a liquidity event adds to or removes from a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Mint: liquidity added
    Add,
    /// Burn: liquidity withdrawn
    Withdraw,
}

impl Direction {
    /// Fetch order within a cycle. Adds are always queried before withdrawals.
    pub const ALL: [Direction; 2] = [Direction::Add, Direction::Withdraw];

    /// Subgraph entity collection holding events of this direction
    pub fn entity(&self) -> &'static str {
        match self {
            Direction::Add => "mints",
            Direction::Withdraw => "burns",
        }
    }

    /// Upper-case word used in alert text
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Add => "ADD",
            Direction::Withdraw => "WITHDRAW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Add => write!(f, "Add"),
            Direction::Withdraw => write!(f, "Withdraw"),
        }
    }
}

/// Alert severity bucket keyed by USD amount.
///
/// Variant order is the tier order, so `Ord` compares severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertTier {
    /// Below every threshold: no alert
    None,
    Dolphin,
    Whale,
    Orc,
}

impl Default for AlertTier {
    fn default() -> Self {
        AlertTier::None
    }
}

impl AlertTier {
    /// Tiers that produce alerts, lowest first
    pub const ALERTING: [AlertTier; 3] = [AlertTier::Dolphin, AlertTier::Whale, AlertTier::Orc];

    pub fn is_alert(&self) -> bool {
        !matches!(self, AlertTier::None)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertTier::None => "",
            AlertTier::Dolphin => "🐬",
            AlertTier::Whale => "🐋",
            AlertTier::Orc => "🐙",
        }
    }
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertTier::None => write!(f, "None"),
            AlertTier::Dolphin => write!(f, "Dolphin"),
            AlertTier::Whale => write!(f, "Whale"),
            AlertTier::Orc => write!(f, "Orc"),
        }
    }
}

/// Canonical liquidity transaction produced by the normalizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    /// `<tx hash>#<log index>`, unique per on-chain event
    pub id: String,
    pub direction: Direction,
    pub amount_usd: Decimal,
    /// `TOKEN0/TOKEN1` or [`UNKNOWN_POOL`]
    pub pool: String,
    pub pool_id: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-tier alert counters for a cycle or the whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub dolphin: u64,
    pub whale: u64,
    pub orc: u64,
}

impl TierCounts {
    pub fn record(&mut self, tier: AlertTier) {
        match tier {
            AlertTier::None => {}
            AlertTier::Dolphin => self.dolphin += 1,
            AlertTier::Whale => self.whale += 1,
            AlertTier::Orc => self.orc += 1,
        }
    }

    pub fn get(&self, tier: AlertTier) -> u64 {
        match tier {
            AlertTier::None => 0,
            AlertTier::Dolphin => self.dolphin,
            AlertTier::Whale => self.whale,
            AlertTier::Orc => self.orc,
        }
    }

    pub fn total(&self) -> u64 {
        self.dolphin + self.whale + self.orc
    }

    pub fn merge(&mut self, other: &TierCounts) {
        self.dolphin += other.dolphin;
        self.whale += other.whale;
        self.orc += other.orc;
    }
}

impl fmt::Display for TierCounts {
    /// Compact breakdown such as `2 🐬, 1 🐙`, skipping empty tiers
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = AlertTier::ALERTING
            .iter()
            .filter(|tier| self.get(**tier) > 0)
            .map(|tier| format!("{} {}", self.get(*tier), tier.emoji()))
            .collect();
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_order_follows_severity() {
        assert!(AlertTier::None < AlertTier::Dolphin);
        assert!(AlertTier::Dolphin < AlertTier::Whale);
        assert!(AlertTier::Whale < AlertTier::Orc);
        assert!(!AlertTier::None.is_alert());
        assert!(AlertTier::Orc.is_alert());
    }

    #[test]
    fn tier_counts_breakdown_skips_empty_tiers() {
        let mut counts = TierCounts::default();
        assert_eq!(counts.to_string(), "none");

        counts.record(AlertTier::Dolphin);
        counts.record(AlertTier::Dolphin);
        counts.record(AlertTier::Orc);
        counts.record(AlertTier::None);

        assert_eq!(counts.total(), 3);
        assert_eq!(counts.to_string(), "2 🐬, 1 🐙");
    }

    #[test]
    fn direction_maps_to_subgraph_entities() {
        assert_eq!(Direction::ALL[0], Direction::Add);
        assert_eq!(Direction::Add.entity(), "mints");
        assert_eq!(Direction::Withdraw.entity(), "burns");
        assert_eq!(Direction::Withdraw.label(), "WITHDRAW");
    }
}
