//! Alert dispatch with exponential backoff

use std::time::Duration;
use tracing::{error, info, warn};

use super::{format_alert, DeliveryError, Notifier};
use crate::config::DispatchConfig;
use crate::types::{AlertTier, NormalizedTransaction};

/// Longest single wait between delivery attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Retry schedule for one alert
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `initial * multiplier^retry`, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(32) as i32);
        let secs = (self.initial_backoff.as_secs_f64() * factor).min(MAX_RETRY_DELAY.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Formats and sends one notification per qualifying transaction
pub struct AlertDispatcher<N: Notifier> {
    notifier: N,
    policy: RetryPolicy,
}

impl<N: Notifier> AlertDispatcher<N> {
    pub fn new(notifier: N, policy: RetryPolicy) -> Self {
        Self { notifier, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send the alert for `tx`, retrying transient failures.
    ///
    /// `AlertTier::None` sends nothing.
    pub async fn dispatch(
        &self,
        tx: &NormalizedTransaction,
        tier: AlertTier,
    ) -> Result<(), DeliveryError> {
        if !tier.is_alert() {
            return Ok(());
        }

        let message = format_alert(tx, tier);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.notifier.send(&message).await {
                Ok(()) => {
                    info!(
                        destination = self.notifier.name(),
                        tier = %tier,
                        tx_id = %tx.id,
                        amount_usd = %tx.amount_usd,
                        direction = %tx.direction,
                        attempt,
                        "🚨 Alert sent"
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let backoff = self.policy.delay_for(attempt - 1);
                    let wait = e
                        .retry_after()
                        .map(|server| server.max(backoff))
                        .unwrap_or(backoff)
                        .min(MAX_RETRY_DELAY);
                    warn!(
                        destination = self.notifier.name(),
                        tx_id = %tx.id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = wait.as_millis() as u64,
                        error = %e,
                        "Alert delivery failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(
                        kind = "DeliveryError",
                        destination = self.notifier.name(),
                        tx_id = %tx.id,
                        tier = %tier,
                        attempts = attempt,
                        error = %e,
                        "Alert dropped after delivery failure"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{MockNotifier, COLOR_ADD};
    use crate::types::Direction;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    fn tx() -> NormalizedTransaction {
        NormalizedTransaction {
            id: "0xfeed#1".to_string(),
            direction: Direction::Add,
            amount_usd: dec!(5000),
            pool: "WETH/USDC".to_string(),
            pool_id: "0xpool".to_string(),
            tx_hash: "0xfeed".to_string(),
            block_number: 1,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn delay_grows_geometrically_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(30), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn dispatch_sends_exactly_one_message() {
        let mut notifier = MockNotifier::new();
        notifier.expect_name().return_const("mock");
        notifier
            .expect_send()
            .withf(|m| m.color == COLOR_ADD && m.title.contains("DOLPHIN"))
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = AlertDispatcher::new(notifier, fast_policy(3));
        assert!(dispatcher.dispatch(&tx(), AlertTier::Dolphin).await.is_ok());
    }

    #[tokio::test]
    async fn dispatch_retries_transient_failures_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut notifier = MockNotifier::new();
        notifier.expect_name().return_const("mock");
        notifier.expect_send().times(3).returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(DeliveryError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            } else {
                Ok(())
            }
        });

        let dispatcher = AlertDispatcher::new(notifier, fast_policy(3));
        assert!(dispatcher.dispatch(&tx(), AlertTier::Whale).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatch_gives_up_after_max_attempts() {
        let mut notifier = MockNotifier::new();
        notifier.expect_name().return_const("mock");
        notifier
            .expect_send()
            .times(2)
            .returning(|_| Err(DeliveryError::Network("connection reset".to_string())));

        let dispatcher = AlertDispatcher::new(notifier, fast_policy(2));
        let err = dispatcher.dispatch(&tx(), AlertTier::Orc).await.unwrap_err();
        assert_eq!(err, DeliveryError::Network("connection reset".to_string()));
    }

    #[tokio::test]
    async fn dispatch_does_not_retry_permanent_errors() {
        let mut notifier = MockNotifier::new();
        notifier.expect_name().return_const("mock");
        notifier.expect_send().times(1).returning(|_| {
            Err(DeliveryError::Status {
                status: 403,
                body: "Missing Access".to_string(),
            })
        });

        let dispatcher = AlertDispatcher::new(notifier, fast_policy(5));
        assert!(dispatcher.dispatch(&tx(), AlertTier::Dolphin).await.is_err());
    }

    #[tokio::test]
    async fn dispatch_skips_below_threshold() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();

        let dispatcher = AlertDispatcher::new(notifier, fast_policy(3));
        assert!(dispatcher.dispatch(&tx(), AlertTier::None).await.is_ok());
    }
}
