//! Raw subgraph event -> canonical transaction
//!
//! Pure: no I/O and no clock, so identical input always yields identical output.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use super::types::{RawRecord, RawToken};
use crate::types::{Direction, NormalizedTransaction, UNKNOWN_POOL};

/// A record that cannot be turned into a transaction. Skipped, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed {direction} record {record_id}: {reason}")]
pub struct MalformedRecord {
    pub record_id: String,
    pub direction: Direction,
    pub reason: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn symbol(token: &Option<RawToken>) -> Option<&str> {
    non_empty(token.as_ref().and_then(|t| t.symbol.as_deref()))
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

fn fallback_prefix(direction: Direction) -> &'static str {
    match direction {
        Direction::Add => "mint",
        Direction::Withdraw => "burn",
    }
}

/// Convert one raw record into a [`NormalizedTransaction`]
pub fn normalize(raw: &RawRecord) -> Result<NormalizedTransaction, MalformedRecord> {
    let event = &raw.event;
    let tx = event.transaction.as_ref();

    let record_id = non_empty(event.id.as_deref())
        .or_else(|| non_empty(tx.and_then(|t| t.id.as_deref())))
        .unwrap_or("<unknown>")
        .to_string();
    let malformed = |reason: String| MalformedRecord {
        record_id: record_id.clone(),
        direction: raw.direction,
        reason,
    };

    // Uniswap-style event ids are `<tx hash>#<log index>`
    let tx_hash = non_empty(tx.and_then(|t| t.id.as_deref()))
        .or_else(|| {
            non_empty(event.id.as_deref())
                .and_then(|id| id.split_once('#').map(|(hash, _)| hash))
                .and_then(|hash| non_empty(Some(hash)))
        })
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| malformed("missing transaction id".to_string()))?;

    // Event ids are only unique per entity, so the fallback carries the direction
    let id = match non_empty(event.log_index.as_deref()) {
        Some(log_index) => format!("{}#{}", tx_hash, log_index),
        None => non_empty(event.id.as_deref())
            .map(|id| format!("{}:{}", fallback_prefix(raw.direction), id.to_ascii_lowercase()))
            .ok_or_else(|| malformed("missing log index and event id".to_string()))?,
    };

    let amount_text = non_empty(event.amount_usd.as_deref())
        .ok_or_else(|| malformed("missing amountUSD".to_string()))?;
    let amount_usd = parse_decimal(amount_text)
        .ok_or_else(|| malformed(format!("unparseable amountUSD {:?}", amount_text)))?;
    if amount_usd.is_sign_negative() && !amount_usd.is_zero() {
        return Err(malformed(format!("negative amountUSD {}", amount_usd)));
    }

    let block_text = non_empty(tx.and_then(|t| t.block_number.as_deref()))
        .ok_or_else(|| malformed("missing block number".to_string()))?;
    let block_number = block_text
        .parse::<u64>()
        .map_err(|_| malformed(format!("unparseable block number {:?}", block_text)))?;

    let ts_text = non_empty(tx.and_then(|t| t.timestamp.as_deref()))
        .or_else(|| non_empty(event.timestamp.as_deref()))
        .ok_or_else(|| malformed("missing timestamp".to_string()))?;
    let timestamp = ts_text
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| malformed(format!("unparseable timestamp {:?}", ts_text)))?;

    let pool = match (symbol(&event.token0), symbol(&event.token1)) {
        (Some(t0), Some(t1)) => format!("{}/{}", t0, t1),
        _ => UNKNOWN_POOL.to_string(),
    };
    let pool_id = non_empty(event.pool.as_ref().and_then(|p| p.id.as_deref()))
        .unwrap_or(UNKNOWN_POOL)
        .to_string();

    Ok(NormalizedTransaction {
        id,
        direction: raw.direction,
        amount_usd: amount_usd.normalize(),
        pool,
        pool_id,
        tx_hash,
        block_number,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subgraph::types::{RawEvent, RawPool, RawTransaction};
    use rust_decimal_macros::dec;

    fn raw(direction: Direction, amount: &str) -> RawRecord {
        RawRecord {
            direction,
            event: RawEvent {
                id: Some("0xABC#4".to_string()),
                transaction: Some(RawTransaction {
                    id: Some("0xABC".to_string()),
                    block_number: Some("19000001".to_string()),
                    timestamp: Some("1700000000".to_string()),
                    ..Default::default()
                }),
                timestamp: Some("1700000000".to_string()),
                pool: Some(RawPool {
                    id: Some("0xpool".to_string()),
                }),
                token0: Some(RawToken {
                    symbol: Some("WETH".to_string()),
                }),
                token1: Some(RawToken {
                    symbol: Some("USDC".to_string()),
                }),
                amount_usd: Some(amount.to_string()),
                log_index: Some("4".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn normalize_builds_canonical_record() {
        let tx = normalize(&raw(Direction::Add, "5000.50")).unwrap();
        assert_eq!(tx.id, "0xabc#4");
        assert_eq!(tx.tx_hash, "0xabc");
        assert_eq!(tx.direction, Direction::Add);
        assert_eq!(tx.amount_usd, dec!(5000.5));
        assert_eq!(tx.pool, "WETH/USDC");
        assert_eq!(tx.pool_id, "0xpool");
        assert_eq!(tx.block_number, 19_000_001);
        assert_eq!(tx.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn normalize_is_deterministic_for_same_id() {
        let a = normalize(&raw(Direction::Withdraw, "75000")).unwrap();
        let b = normalize(&raw(Direction::Withdraw, "75000.000")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_symbols_fall_back_to_unknown_pool() {
        let mut record = raw(Direction::Add, "1200");
        record.event.token1 = None;
        record.event.pool = None;
        let tx = normalize(&record).unwrap();
        assert_eq!(tx.pool, UNKNOWN_POOL);
        assert_eq!(tx.pool_id, UNKNOWN_POOL);

        let mut record = raw(Direction::Add, "1200");
        record.event.token0 = Some(RawToken {
            symbol: Some("  ".to_string()),
        });
        assert_eq!(normalize(&record).unwrap().pool, UNKNOWN_POOL);
    }

    #[test]
    fn id_falls_back_to_event_id_without_log_index() {
        let mut record = raw(Direction::Add, "1200");
        record.event.log_index = None;
        assert_eq!(normalize(&record).unwrap().id, "mint:0xabc#4");
    }

    #[test]
    fn fallback_ids_differ_between_mint_and_burn() {
        let mut mint = raw(Direction::Add, "1200");
        mint.event.log_index = None;
        let mut burn = raw(Direction::Withdraw, "1200");
        burn.event.log_index = None;

        let mint_id = normalize(&mint).unwrap().id;
        let burn_id = normalize(&burn).unwrap().id;
        assert_ne!(mint_id, burn_id);
        assert_eq!(burn_id, "burn:0xabc#4");
    }

    #[test]
    fn tx_hash_recovered_from_event_id() {
        let mut record = raw(Direction::Add, "1200");
        if let Some(tx) = record.event.transaction.as_mut() {
            tx.id = None;
        }
        let tx = normalize(&record).unwrap();
        assert_eq!(tx.tx_hash, "0xabc");
        assert_eq!(tx.id, "0xabc#4");
    }

    #[test]
    fn timestamp_falls_back_to_event_level() {
        let mut record = raw(Direction::Add, "1200");
        if let Some(tx) = record.event.transaction.as_mut() {
            tx.timestamp = None;
        }
        record.event.timestamp = Some("1700000123".to_string());
        assert_eq!(normalize(&record).unwrap().timestamp.timestamp(), 1_700_000_123);
    }

    #[test]
    fn scientific_amounts_are_accepted() {
        let tx = normalize(&raw(Direction::Add, "1.5e3")).unwrap();
        assert_eq!(tx.amount_usd, dec!(1500));
    }

    #[test]
    fn malformed_records_name_the_field() {
        let err = normalize(&raw(Direction::Add, "lots")).unwrap_err();
        assert_eq!(err.record_id, "0xABC#4");
        assert!(err.reason.contains("amountUSD"));

        let err = normalize(&raw(Direction::Add, "-5")).unwrap_err();
        assert!(err.reason.contains("negative"));

        let mut record = raw(Direction::Withdraw, "1200");
        record.event.amount_usd = None;
        let err = normalize(&record).unwrap_err();
        assert_eq!(err.direction, Direction::Withdraw);
        assert!(err.to_string().contains("missing amountUSD"));

        let mut record = raw(Direction::Add, "1200");
        if let Some(tx) = record.event.transaction.as_mut() {
            tx.block_number = Some("0x12".to_string());
        }
        assert!(normalize(&record).unwrap_err().reason.contains("block number"));

        let mut record = raw(Direction::Add, "1200");
        record.event.transaction = None;
        record.event.id = None;
        assert!(normalize(&record)
            .unwrap_err()
            .reason
            .contains("transaction id"));
    }
}
