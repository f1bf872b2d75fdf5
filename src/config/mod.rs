//! Configuration management for the whale alert bot
//!
//! Loads from optional YAML/TOML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::alerts::classifier::TierThresholds;

/// Fatal pre-flight configuration problems
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting `{0}` is missing or empty")]
    Missing(&'static str),
    #[error("tier thresholds must be strictly increasing (dolphin {dolphin} < whale {whale} < orc {orc})")]
    ThresholdOrder {
        dolphin: Decimal,
        whale: Decimal,
        orc: Decimal,
    },
    #[error("setting `{key}` is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub subgraph: SubgraphConfig,
    pub tiers: TiersConfig,
    pub scheduler: SchedulerConfig,
    pub dispatch: DispatchConfig,
    pub dedup: DedupConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (WHALE_ALERT__*)
            .add_source(Environment::with_prefix("WHALE_ALERT").separator("__"))
            // Bare variables used by existing deployments win over everything
            .set_override_option("discord.token", non_empty_env("DISCORD_TOKEN"))?
            .set_override_option("discord.channel_id", non_empty_env("DISCORD_CHANNEL_ID"))?
            .set_override_option("subgraph.url", non_empty_env("SUBGRAPH_URL"))?
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Builder preloaded with every default. Required settings default to empty.
    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            // Discord defaults
            .set_default("discord.channel_id", "")?
            .set_default("discord.token", "")?
            .set_default("discord.api_base", "https://discord.com/api/v10")?
            // Subgraph defaults
            .set_default("subgraph.url", "")?
            .set_default("subgraph.batch_size", 25)?
            .set_default("subgraph.max_pages", 4)?
            .set_default("subgraph.request_delay_ms", 2000)?
            .set_default("subgraph.request_timeout_secs", 30)?
            .set_default("subgraph.lookback_secs", 120)?
            // Tier defaults
            .set_default("tiers.dolphin_usd", "1000")?
            .set_default("tiers.whale_usd", "10000")?
            .set_default("tiers.orc_usd", "50000")?
            // Scheduler defaults
            .set_default("scheduler.poll_interval_secs", 15)?
            .set_default("scheduler.backoff_factor", 2.0)?
            .set_default("scheduler.max_backoff_secs", 300)?
            // Dispatch defaults
            .set_default("dispatch.max_attempts", 4)?
            .set_default("dispatch.initial_backoff_ms", 500)?
            .set_default("dispatch.backoff_multiplier", 2.0)?
            // Dedup defaults
            .set_default("dedup.retention_cycles", 40)?
            .set_default("dedup.max_entries", 50_000)?
            // Ledger defaults
            .set_default("ledger.path", "large_transactions.csv")?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;
        Ok(builder)
    }

    /// Configuration with every default and no file or environment sources
    pub fn defaults() -> Result<Self> {
        Self::builder()?
            .build()
            .context("Failed to build default configuration")?
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    /// Validate required identifiers and internal consistency
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.discord.token.trim().is_empty() {
            return Err(ConfigError::Missing("DISCORD_TOKEN"));
        }
        if self.discord.channel_id.trim().is_empty() {
            return Err(ConfigError::Missing("DISCORD_CHANNEL_ID"));
        }
        if !self.discord.channel_id.trim().chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                key: "discord.channel_id",
                reason: format!("expected a numeric snowflake, got {:?}", self.discord.channel_id),
            });
        }
        if self.subgraph.url.trim().is_empty() {
            return Err(ConfigError::Missing("SUBGRAPH_URL"));
        }

        self.tier_thresholds()?;

        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.subgraph.batch_size == 0 || self.subgraph.max_pages == 0 {
            return Err(ConfigError::Invalid {
                key: "subgraph.batch_size",
                reason: "batch size and page count must be at least 1".to_string(),
            });
        }
        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "dispatch.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.scheduler.backoff_factor >= 1.0) {
            return Err(ConfigError::Invalid {
                key: "scheduler.backoff_factor",
                reason: format!("must be >= 1.0, got {}", self.scheduler.backoff_factor),
            });
        }
        if !(self.dispatch.backoff_multiplier >= 1.0) {
            return Err(ConfigError::Invalid {
                key: "dispatch.backoff_multiplier",
                reason: format!("must be >= 1.0, got {}", self.dispatch.backoff_multiplier),
            });
        }
        if self.dedup.retention_cycles == 0 || self.dedup.max_entries == 0 {
            return Err(ConfigError::Invalid {
                key: "dedup.retention_cycles",
                reason: "retention and capacity must be at least 1".to_string(),
            });
        }
        // Events are re-fetched for `lookback` seconds, so they must stay remembered longer
        let retention_secs = self
            .dedup
            .retention_cycles
            .saturating_mul(self.scheduler.poll_interval_secs);
        let overlap_secs = self
            .subgraph
            .lookback_secs
            .saturating_add(self.scheduler.poll_interval_secs.saturating_mul(2));
        if retention_secs < overlap_secs {
            return Err(ConfigError::Invalid {
                key: "dedup.retention_cycles",
                reason: format!(
                    "{} cycles x {}s does not cover the {}s lookback plus two poll intervals",
                    self.dedup.retention_cycles,
                    self.scheduler.poll_interval_secs,
                    self.subgraph.lookback_secs
                ),
            });
        }
        Ok(())
    }

    /// Validated tier bounds
    pub fn tier_thresholds(&self) -> std::result::Result<TierThresholds, ConfigError> {
        TierThresholds::new(
            self.tiers.dolphin_usd,
            self.tiers.whale_usd,
            self.tiers.orc_usd,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.scheduler.max_backoff_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.subgraph.request_delay_ms)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.subgraph.lookback_secs)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "channel={} subgraph={} tiers={}/{}/{} poll={}s delay={}ms batch={}x{} ledger={}",
            self.discord.channel_id,
            self.subgraph.url,
            self.tiers.dolphin_usd,
            self.tiers.whale_usd,
            self.tiers.orc_usd,
            self.scheduler.poll_interval_secs,
            self.subgraph.request_delay_ms,
            self.subgraph.batch_size,
            self.subgraph.max_pages,
            self.ledger.path
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::defaults().expect("defaults should build");
        config.discord.token = "bot-token".to_string();
        config.discord.channel_id = "1397257377220395049".to_string();
        config.subgraph.url = "https://api.example.com/subgraphs/pools".to_string();
        config
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::defaults().unwrap();
        assert_eq!(config.tiers.dolphin_usd, dec!(1000));
        assert_eq!(config.tiers.whale_usd, dec!(10000));
        assert_eq!(config.tiers.orc_usd, dec!(50000));
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.request_delay(), Duration::from_millis(2000));
        assert_eq!(config.subgraph.batch_size, 25);
        assert_eq!(config.dispatch.max_attempts, 4);
        assert_eq!(config.ledger.path, "large_transactions.csv");
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        let config = AppConfig::defaults().unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("DISCORD_TOKEN"))
        );

        let mut config = valid_config();
        config.subgraph.url = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::Missing("SUBGRAPH_URL")));

        let mut config = valid_config();
        config.discord.channel_id = String::new();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("DISCORD_CHANNEL_ID"))
        );
    }

    #[test]
    fn validate_rejects_unordered_thresholds() {
        let mut config = valid_config();
        config.tiers.whale_usd = dec!(1000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = valid_config();
        config.scheduler.poll_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "scheduler.poll_interval_secs",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_retention_shorter_than_lookback() {
        let mut config = valid_config();
        config.dedup.retention_cycles = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "dedup.retention_cycles",
                ..
            })
        ));

        // 10 x 15s = 150s covers 120s lookback + 2 x 15s
        config.dedup.retention_cycles = 10;
        assert_eq!(config.validate(), Ok(()));

        config.subgraph.lookback_secs = 121;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn digest_and_debug_hide_token() {
        let config = valid_config();
        assert!(!config.digest().contains("bot-token"));
        assert!(!format!("{:?}", config).contains("bot-token"));
    }
}
