//! Alerting: tier classification, message formatting and delivery
//!
//! - [`classifier`] maps USD amounts to tiers
//! - [`dispatcher`] formats one message per transaction and retries transient failures
//! - [`discord`] is the production [`Notifier`] backed by the Discord REST API

pub mod classifier;
pub mod discord;
pub mod dispatcher;

pub use classifier::{TierClassifier, TierThresholds};
pub use discord::DiscordNotifier;
pub use dispatcher::{AlertDispatcher, RetryPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::time::Duration;
use thiserror::Error;

use crate::types::{AlertTier, Direction, NormalizedTransaction};

/// Embed accent for liquidity additions
pub const COLOR_ADD: u32 = 0x2ECC71;
/// Embed accent for liquidity withdrawals
pub const COLOR_WITHDRAW: u32 = 0xE74C3C;

/// Chat delivery failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("rate limited by chat API (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("chat API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
}

impl DeliveryError {
    /// Rate limits, server errors and transport failures are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::RateLimited { .. } | DeliveryError::Network(_) => true,
            DeliveryError::Status { status, .. } => *status >= 500,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DeliveryError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A formatted notification ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
}

/// Outbound chat destination
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Destination name for logging
    fn name(&self) -> &'static str;

    /// Deliver one message
    async fn send(&self, message: &AlertMessage) -> Result<(), DeliveryError>;
}

pub fn direction_color(direction: Direction) -> u32 {
    match direction {
        Direction::Add => COLOR_ADD,
        Direction::Withdraw => COLOR_WITHDRAW,
    }
}

/// `$1,234,567.89` style rendering, rounded half away from zero to cents
pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (text.clone(), String::new()),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}${}.{:0<2}", sign, grouped, frac_part)
}

/// Build the alert for one qualifying transaction
pub fn format_alert(tx: &NormalizedTransaction, tier: AlertTier) -> AlertMessage {
    let title = format!("{} {} ALERT!", tier.emoji(), tier.to_string().to_uppercase());
    let body = format!(
        "💰 **{} {}**\n📊 **Pool:** {}\n🔗 **Tx:** `{}`\n🧱 **Block:** {}\n⏰ **Time:** {}",
        format_usd(tx.amount_usd),
        tx.direction.label(),
        tx.pool,
        tx.id,
        tx.block_number,
        tx.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    AlertMessage {
        title,
        body,
        color: direction_color(tx.direction),
        timestamp: tx.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_tx(direction: Direction, amount: Decimal) -> NormalizedTransaction {
        NormalizedTransaction {
            id: "0xabc#7".to_string(),
            direction,
            amount_usd: amount,
            pool: "WETH/USDC".to_string(),
            pool_id: "0xpool".to_string(),
            tx_hash: "0xabc".to_string(),
            block_number: 19_000_123,
            timestamp: Utc.timestamp_opt(1_717_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn format_usd_groups_thousands() {
        assert_eq!(format_usd(dec!(0)), "$0.00");
        assert_eq!(format_usd(dec!(999.5)), "$999.50");
        assert_eq!(format_usd(dec!(1000)), "$1,000.00");
        assert_eq!(format_usd(dec!(1234567.891)), "$1,234,567.89");
        assert_eq!(format_usd(dec!(9999.995)), "$10,000.00");
        assert_eq!(format_usd(dec!(-1500)), "-$1,500.00");
    }

    #[test]
    fn format_alert_add_is_green() {
        let msg = format_alert(&sample_tx(Direction::Add, dec!(5000)), AlertTier::Dolphin);
        assert_eq!(msg.title, "🐬 DOLPHIN ALERT!");
        assert_eq!(msg.color, COLOR_ADD);
        assert!(msg.body.contains("$5,000.00 ADD"));
        assert!(msg.body.contains("WETH/USDC"));
        assert!(msg.body.contains("0xabc#7"));
        assert!(msg.body.contains("19000123"));
        assert!(msg.body.contains("2024-05-29 16:26:40 UTC"));
    }

    #[test]
    fn format_alert_withdraw_is_red() {
        let msg = format_alert(&sample_tx(Direction::Withdraw, dec!(75000)), AlertTier::Orc);
        assert_eq!(msg.title, "🐙 ORC ALERT!");
        assert_eq!(msg.color, COLOR_WITHDRAW);
        assert!(msg.body.contains("$75,000.00 WITHDRAW"));
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(DeliveryError::RateLimited { retry_after: None }.is_transient());
        assert!(DeliveryError::Network("reset".into()).is_transient());
        assert!(DeliveryError::Status {
            status: 502,
            body: String::new()
        }
        .is_transient());
        assert!(!DeliveryError::Status {
            status: 403,
            body: "Missing Access".into()
        }
        .is_transient());
    }
}
