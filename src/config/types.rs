//! Configuration section types

use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct DiscordConfig {
    /// Channel receiving the alerts
    pub channel_id: String,
    /// Bot token (never logged)
    pub token: String,
    /// REST API base URL
    pub api_base: String,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("channel_id", &self.channel_id)
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphConfig {
    /// GraphQL endpoint
    pub url: String,
    /// Page size (`first`) per request
    pub batch_size: u32,
    /// Maximum pages per direction per cycle
    pub max_pages: u32,
    /// Delay between consecutive requests in milliseconds
    pub request_delay_ms: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// How far behind the watermark each query reaches, in seconds
    pub lookback_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiersConfig {
    /// Dolphin lower bound (USD, inclusive)
    pub dolphin_usd: Decimal,
    /// Whale lower bound (USD, inclusive)
    pub whale_usd: Decimal,
    /// Orc lower bound (USD, inclusive)
    pub orc_usd: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
    /// Growth factor applied per consecutive failed cycle
    pub backoff_factor: f64,
    /// Backoff ceiling in seconds
    pub max_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Total delivery attempts per alert (first try included)
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Cycles an alerted id is remembered for
    pub retention_cycles: u64,
    /// Hard cap on remembered ids
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// CSV file receiving one row per qualifying transaction
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
