//! Poll loop: fetch -> normalize -> dedupe -> classify -> {alert, ledger}
//!
//! States: `Idle -> Fetching -> Processing -> Sleeping -> Fetching ...`, with
//! `Stopped` as the only terminal state. Exactly one cycle runs at a time and
//! shutdown is only observed between cycles, so a record's alert and ledger row
//! are never split by a shutdown.

mod backoff;
mod cursor;

pub use backoff::BackoffState;
pub use cursor::DirectionCursor;

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertDispatcher, Notifier, TierClassifier};
use crate::config::AppConfig;
use crate::dedup::Deduplicator;
use crate::persistence::LedgerWriter;
use crate::subgraph::{normalize, EventSource, FetchCursor, FetchError, FetchSettings};
use crate::types::{Direction, TierCounts};

/// Upper bound of random jitter added to backoff delays, as a fraction
const BACKOFF_JITTER: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Processing,
    Sleeping,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "IDLE"),
            SchedulerState::Fetching => write!(f, "FETCHING"),
            SchedulerState::Processing => write!(f, "PROCESSING"),
            SchedulerState::Sleeping => write!(f, "SLEEPING"),
            SchedulerState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    /// How far behind the watermark each fetch reaches
    pub lookback: Duration,
    /// Most events one direction can return per cycle; filling it switches
    /// that direction to catch-up mode
    pub fetch_capacity: usize,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig, fetch: &FetchSettings) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            backoff_factor: config.scheduler.backoff_factor,
            max_backoff: config.max_backoff(),
            lookback: config.lookback(),
            fetch_capacity: fetch.capacity(),
        }
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Set when fetching failed and processing was skipped
    pub fetch_error: Option<FetchError>,
    pub fetched_adds: usize,
    pub fetched_withdrawals: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub below_threshold: usize,
    pub alerts: TierCounts,
    pub delivery_failures: usize,
    pub ledger_failures: usize,
    pub evicted: usize,
    /// Sleep before the next cycle
    pub next_delay: Duration,
}

impl CycleReport {
    pub fn fetched(&self) -> usize {
        self.fetched_adds + self.fetched_withdrawals
    }
}

/// Totals over the scheduler's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub alerts: TierCounts,
}

/// Drives the alert pipeline; owns all cross-cycle state
pub struct Scheduler<S: EventSource, N: Notifier> {
    source: S,
    dispatcher: AlertDispatcher<N>,
    classifier: TierClassifier,
    dedup: Deduplicator,
    ledger: LedgerWriter,
    settings: SchedulerSettings,
    backoff: BackoffState,
    adds: DirectionCursor,
    withdrawals: DirectionCursor,
    state: SchedulerState,
    summary: RunSummary,
}

impl<S: EventSource, N: Notifier> Scheduler<S, N> {
    pub fn new(
        source: S,
        dispatcher: AlertDispatcher<N>,
        classifier: TierClassifier,
        dedup: Deduplicator,
        ledger: LedgerWriter,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            source,
            dispatcher,
            classifier,
            dedup,
            ledger,
            backoff: BackoffState::new(
                settings.poll_interval,
                settings.backoff_factor,
                settings.max_backoff,
            ),
            settings,
            adds: DirectionCursor::default(),
            withdrawals: DirectionCursor::default(),
            state: SchedulerState::Idle,
            summary: RunSummary::default(),
        }
    }

    /// Start both directions at `watermark`
    pub fn with_watermark(mut self, watermark: Option<DateTime<Utc>>) -> Self {
        self.adds = DirectionCursor::new(watermark);
        self.withdrawals = DirectionCursor::new(watermark);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cursor(&self, direction: Direction) -> &DirectionCursor {
        match direction {
            Direction::Add => &self.adds,
            Direction::Withdraw => &self.withdrawals,
        }
    }

    fn cursor_mut(&mut self, direction: Direction) -> &mut DirectionCursor {
        match direction {
            Direction::Add => &mut self.adds,
            Direction::Withdraw => &mut self.withdrawals,
        }
    }

    pub fn watermark(&self, direction: Direction) -> Option<DateTime<Utc>> {
        self.cursor(direction).watermark()
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn ledger(&self) -> &LedgerWriter {
        &self.ledger
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Scheduler state change");
            self.state = next;
        }
    }

    /// Bounds for the next fetch
    pub fn fetch_cursor(&self) -> FetchCursor {
        let lookback = chrono::Duration::seconds(self.settings.lookback.as_secs() as i64);
        FetchCursor {
            add: self.adds.since(lookback),
            withdraw: self.withdrawals.since(lookback),
        }
    }

    /// Run one FETCHING + PROCESSING pass and decide the next sleep
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport {
            evicted: self.dedup.begin_cycle(),
            ..Default::default()
        };
        self.summary.cycles += 1;
        report.cycle = self.summary.cycles;

        self.transition(SchedulerState::Fetching);
        let cursor = self.fetch_cursor();
        let records = match self.source.fetch(cursor).await {
            Ok(records) => records,
            Err(e) => {
                let delay = with_jitter(self.backoff.record_failure());
                self.summary.failed_cycles += 1;
                warn!(
                    kind = e.kind(),
                    cycle = report.cycle,
                    consecutive_failures = self.backoff.consecutive_failures(),
                    delay_secs = delay.as_secs_f64(),
                    error = %e,
                    "Fetch failed, skipping processing"
                );
                report.fetch_error = Some(e);
                report.next_delay = delay;
                return report;
            }
        };

        self.transition(SchedulerState::Processing);
        let mut newest: HashMap<Direction, DateTime<Utc>> = HashMap::new();
        let mut fetched: HashMap<Direction, usize> = HashMap::new();

        for raw in &records {
            *fetched.entry(raw.direction).or_default() += 1;

            let tx = match normalize(raw) {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(
                        kind = "MalformedRecord",
                        record_id = %e.record_id,
                        direction = %e.direction,
                        reason = %e.reason,
                        "Skipping malformed record"
                    );
                    report.malformed += 1;
                    continue;
                }
            };

            newest
                .entry(tx.direction)
                .and_modify(|ts| *ts = (*ts).max(tx.timestamp))
                .or_insert(tx.timestamp);

            if !self.dedup.admit(&tx) {
                debug!(tx_id = %tx.id, "Already alerted, skipping");
                report.duplicates += 1;
                continue;
            }

            let tier = self.classifier.classify(tx.amount_usd);
            if !tier.is_alert() {
                debug!(tx_id = %tx.id, amount_usd = %tx.amount_usd, "Below alert thresholds");
                report.below_threshold += 1;
                continue;
            }

            if self.dispatcher.dispatch(&tx, tier).await.is_err() {
                report.delivery_failures += 1;
            }
            if let Err(e) = self.ledger.append(&tx, tier) {
                error!(
                    kind = "IOError",
                    tx_id = %tx.id,
                    error = %e,
                    "Ledger append failed"
                );
                report.ledger_failures += 1;
            }
            report.alerts.record(tier);
        }

        report.fetched_adds = fetched.get(&Direction::Add).copied().unwrap_or(0);
        report.fetched_withdrawals = fetched.get(&Direction::Withdraw).copied().unwrap_or(0);
        for direction in Direction::ALL {
            let capacity = self.settings.fetch_capacity;
            self.cursor_mut(direction).advance(
                direction,
                cursor.since(direction),
                fetched.get(&direction).copied().unwrap_or(0),
                newest.get(&direction).copied(),
                capacity,
            );
        }

        self.backoff.record_success();
        report.next_delay = self.backoff.current_delay();
        self.summary.alerts.merge(&report.alerts);
        log_cycle_summary(&report);
        report
    }

    /// Poll until `shutdown` fires. Any value sent on the channel, or the sender
    /// being dropped, requests shutdown; it is honored between cycles.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            add_watermark = ?self.adds.watermark(),
            withdraw_watermark = ?self.withdrawals.watermark(),
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle().await;

            self.transition(SchedulerState::Sleeping);
            let stop = tokio::select! {
                _ = tokio::time::sleep(report.next_delay) => false,
                _ = shutdown.changed() => true,
            };
            if stop {
                break;
            }
        }

        if let Err(e) = self.ledger.flush() {
            error!(kind = "IOError", error = %e, "Final ledger flush failed");
        }
        self.transition(SchedulerState::Stopped);
        info!(
            cycles = self.summary.cycles,
            failed_cycles = self.summary.failed_cycles,
            alerts = self.summary.alerts.total(),
            breakdown = %self.summary.alerts,
            "Scheduler stopped"
        );
        self.summary
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let cap_ms = (delay.as_millis() as f64 * BACKOFF_JITTER).round() as u64;
    if cap_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=cap_ms))
}

fn log_cycle_summary(report: &CycleReport) {
    if report.alerts.total() > 0 {
        info!(
            cycle = report.cycle,
            scanned = report.fetched(),
            alerts = report.alerts.total(),
            duplicates = report.duplicates,
            malformed = report.malformed,
            delivery_failures = report.delivery_failures,
            ledger_failures = report.ledger_failures,
            "📈 Scanned {} transactions → {} alerts ({})",
            report.fetched(),
            report.alerts.total(),
            report.alerts
        );
    } else if report.fetched() > 0 {
        info!(
            cycle = report.cycle,
            duplicates = report.duplicates,
            malformed = report.malformed,
            below_threshold = report.below_threshold,
            "🔍 Checked {} additions + {} withdrawals → no new large transactions",
            report.fetched_adds,
            report.fetched_withdrawals
        );
    } else {
        debug!(cycle = report.cycle, "No new events");
    }
}
