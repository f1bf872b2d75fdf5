//! Subgraph fetching and normalization
//!
//! One poll cycle issues the mints (ADD) query first and the burns (WITHDRAW)
//! query second, following `skip` pages while pages come back full. A fixed
//! delay separates consecutive requests. Rate limits are reported to the caller
//! without retrying.

mod client;
pub mod normalize;
pub mod types;

pub use client::{build_query, build_variables, HttpSubgraphTransport};
pub use normalize::{normalize, MalformedRecord};
pub use types::{RawEvent, RawRecord};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SubgraphConfig;
use crate::types::Direction;

/// Recoverable fetch failures. All of them skip the cycle's processing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by subgraph (HTTP 429)")]
    RateLimited,
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "NetworkError",
            FetchError::RateLimited => "RateLimited",
            FetchError::Upstream(_) => "UpstreamError",
        }
    }
}

/// Parameters for one page of one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub direction: Direction,
    pub first: u32,
    pub skip: u32,
    /// Server-side `amountUSD_gte` filter
    pub min_usd: Decimal,
    /// Server-side `timestamp_gte` filter
    pub since: Option<DateTime<Utc>>,
}

/// Single-request transport to the subgraph
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubgraphTransport: Send + Sync {
    async fn query(&self, request: &PageRequest) -> Result<Vec<RawEvent>, FetchError>;
}

/// Per-direction lower timestamp bounds for one fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCursor {
    pub add: Option<DateTime<Utc>>,
    pub withdraw: Option<DateTime<Utc>>,
}

impl FetchCursor {
    /// Same bound for both directions
    pub fn uniform(since: Option<DateTime<Utc>>) -> Self {
        Self {
            add: since,
            withdraw: since,
        }
    }

    pub fn since(&self, direction: Direction) -> Option<DateTime<Utc>> {
        match direction {
            Direction::Add => self.add,
            Direction::Withdraw => self.withdraw,
        }
    }
}

/// Source of raw liquidity events for one poll cycle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch both directions, each from its own bound in `cursor` when set
    async fn fetch(&self, cursor: FetchCursor) -> Result<Vec<RawRecord>, FetchError>;
}

/// Paging behaviour of [`SubgraphFetcher`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchSettings {
    pub batch_size: u32,
    pub max_pages: u32,
    pub request_delay: Duration,
    pub min_usd: Decimal,
}

impl FetchSettings {
    pub fn from_config(config: &SubgraphConfig, min_usd: Decimal) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_pages: config.max_pages.max(1),
            request_delay: Duration::from_millis(config.request_delay_ms),
            min_usd,
        }
    }

    /// Most events one direction can return in a cycle
    pub fn capacity(&self) -> usize {
        self.batch_size as usize * self.max_pages as usize
    }
}

/// Paginating fetcher over a [`SubgraphTransport`]
pub struct SubgraphFetcher<T: SubgraphTransport> {
    transport: T,
    settings: FetchSettings,
}

impl<T: SubgraphTransport> SubgraphFetcher<T> {
    pub fn new(transport: T, settings: FetchSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }
}

#[async_trait]
impl<T: SubgraphTransport> EventSource for SubgraphFetcher<T> {
    async fn fetch(&self, cursor: FetchCursor) -> Result<Vec<RawRecord>, FetchError> {
        let mut records = Vec::new();
        let mut requests_sent = 0u32;

        for direction in Direction::ALL {
            let since = cursor.since(direction);
            for page in 0..self.settings.max_pages {
                if requests_sent > 0 && !self.settings.request_delay.is_zero() {
                    tokio::time::sleep(self.settings.request_delay).await;
                }
                requests_sent += 1;

                let request = PageRequest {
                    direction,
                    first: self.settings.batch_size,
                    skip: page * self.settings.batch_size,
                    min_usd: self.settings.min_usd,
                    since,
                };
                let events = self.transport.query(&request).await?;
                let full_page = events.len() >= self.settings.batch_size as usize;
                records.extend(events.into_iter().map(|event| RawRecord { direction, event }));

                if !full_page {
                    break;
                }
                if page + 1 == self.settings.max_pages {
                    warn!(
                        direction = %direction,
                        pages = self.settings.max_pages,
                        batch_size = self.settings.batch_size,
                        "Page limit reached, remaining events deferred to next cycle"
                    );
                }
            }
        }

        debug!(
            count = records.len(),
            requests = requests_sent,
            "Fetch cycle complete"
        );
        Ok(records)
    }
}
