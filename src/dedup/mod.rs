//! Cross-cycle deduplication of alerted transactions
//!
//! Every admitted id is stamped with the cycle it was first seen in. Entries
//! survive at least `retention_cycles` cycles; eviction only happens in
//! [`Deduplicator::begin_cycle`], so admit decisions within one cycle never
//! change under eviction. A hard capacity bounds memory during bursts.
//!
//! The set is not persisted. After a restart, events still inside the fetch
//! window may be alerted a second time.

use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::config::DedupConfig;
use crate::types::NormalizedTransaction;

/// Bounded, cycle-stamped seen-set
#[derive(Debug)]
pub struct Deduplicator {
    retention_cycles: u64,
    max_entries: usize,
    cycle: u64,
    /// id -> cycle first admitted
    seen: HashMap<String, u64>,
    /// Admission order, oldest first
    order: VecDeque<(u64, String)>,
}

impl Deduplicator {
    pub fn new(retention_cycles: u64, max_entries: usize) -> Self {
        Self {
            retention_cycles: retention_cycles.max(1),
            max_entries: max_entries.max(1),
            cycle: 0,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.retention_cycles, config.max_entries)
    }

    /// Start a new cycle: advance the clock and evict expired or overflowing entries.
    ///
    /// Returns the number of evicted ids.
    pub fn begin_cycle(&mut self) -> usize {
        self.cycle += 1;
        let before = self.seen.len();

        // Entries admitted at cycle c are kept through cycle c + retention_cycles
        let oldest_kept = self.cycle.saturating_sub(self.retention_cycles);
        while let Some((admitted, _)) = self.order.front() {
            if *admitted >= oldest_kept && self.seen.len() <= self.max_entries {
                break;
            }
            if let Some((_, id)) = self.order.pop_front() {
                self.seen.remove(&id);
            }
        }

        let evicted = before - self.seen.len();
        if evicted > 0 {
            debug!(
                cycle = self.cycle,
                evicted,
                remaining = self.seen.len(),
                "Evicted dedup entries"
            );
        }
        evicted
    }

    /// True exactly once per id while it is retained
    pub fn admit(&mut self, tx: &NormalizedTransaction) -> bool {
        self.admit_id(&tx.id)
    }

    pub fn admit_id(&mut self, id: &str) -> bool {
        if self.seen.contains_key(id) {
            return false;
        }
        self.seen.insert(id.to_string(), self.cycle);
        self.order.push_back((self.cycle, id.to_string()));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}
