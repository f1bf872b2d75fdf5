//! Whale alert bot entry point
//!
//! Loads configuration, wires the pipeline and runs the poll loop until
//! SIGINT/SIGTERM.

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use whale_alert::alerts::{AlertDispatcher, DiscordNotifier, RetryPolicy, TierClassifier};
use whale_alert::config::AppConfig;
use whale_alert::dedup::Deduplicator;
use whale_alert::persistence::LedgerWriter;
use whale_alert::scheduler::{Scheduler, SchedulerSettings};
use whale_alert::subgraph::{FetchSettings, HttpSubgraphTransport, SubgraphFetcher};
use whale_alert::types::AlertTier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    if let Err(e) = config.validate() {
        error!(kind = "ConfigError", error = %e, "Invalid configuration, refusing to start");
        std::process::exit(1);
    }
    let thresholds = config.tier_thresholds()?;
    let classifier = TierClassifier::new(thresholds);

    info!("🐋 Whale alert v{} starting", env!("CARGO_PKG_VERSION"));
    for tier in AlertTier::ALERTING {
        info!("{} {}: {}", tier.emoji(), tier, classifier.describe(tier));
    }
    info!(
        poll_interval_secs = config.scheduler.poll_interval_secs,
        request_delay_ms = config.subgraph.request_delay_ms,
        batch_size = config.subgraph.batch_size,
        max_pages = config.subgraph.max_pages,
        ledger = %config.ledger.path,
        "Configuration: {}",
        config
    );

    let transport = HttpSubgraphTransport::new(
        &config.subgraph.url,
        std::time::Duration::from_secs(config.subgraph.request_timeout_secs),
    )
    .context("Failed to build subgraph client")?;
    let fetch_settings = FetchSettings::from_config(&config.subgraph, thresholds.minimum());
    let fetcher = SubgraphFetcher::new(transport, fetch_settings);

    let notifier = DiscordNotifier::new(&config.discord).context("Failed to build Discord client")?;
    let dispatcher = AlertDispatcher::new(notifier, RetryPolicy::from(&config.dispatch));

    let watermark = match LedgerWriter::last_timestamp(&config.ledger.path) {
        Ok(Some(ts)) => {
            info!(watermark = %ts, "Resuming after newest ledger row");
            ts
        }
        Ok(None) => Utc::now(),
        Err(e) => {
            warn!(kind = "IOError", error = %e, "Could not read ledger, starting from now");
            Utc::now()
        }
    };
    let ledger = LedgerWriter::open_or_defer(&config.ledger.path);

    let mut scheduler = Scheduler::new(
        fetcher,
        dispatcher,
        classifier,
        Deduplicator::from_config(&config.dedup),
        ledger,
        SchedulerSettings::from_config(&config, &fetch_settings),
    )
    .with_watermark(Some(watermark));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, finishing current cycle");
        let _ = shutdown_tx.send(true);
    });

    let summary = scheduler.run(shutdown_rx).await;
    info!(
        cycles = summary.cycles,
        alerts = summary.alerts.total(),
        "👋 Whale alert stopped ({})",
        summary.alerts
    );
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
