//! Per-direction fetch position
//!
//! Normally a direction is queried from `watermark - lookback` so late-indexed
//! events are picked up again. When a fetch fills the page limit the events
//! after the newest one returned are still unseen, so the cursor moves to that
//! newest timestamp and the next query starts exactly there, without lookback,
//! until a fetch comes back below the limit.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::Direction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionCursor {
    watermark: Option<DateTime<Utc>>,
    /// Last fetch hit the page limit
    catching_up: bool,
}

impl DirectionCursor {
    pub fn new(watermark: Option<DateTime<Utc>>) -> Self {
        Self {
            watermark,
            catching_up: false,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub fn is_catching_up(&self) -> bool {
        self.catching_up
    }

    /// Lower bound for the next query
    pub fn since(&self, lookback: chrono::Duration) -> Option<DateTime<Utc>> {
        if self.catching_up {
            self.watermark
        } else {
            self.watermark.map(|w| w - lookback)
        }
    }

    /// Record a successful fetch issued from `since`.
    ///
    /// `fetched` counts every returned record, `newest` is the newest readable one.
    pub fn advance(
        &mut self,
        direction: Direction,
        since: Option<DateTime<Utc>>,
        fetched: usize,
        newest: Option<DateTime<Utc>>,
        capacity: usize,
    ) {
        if fetched < capacity {
            if let Some(ts) = newest {
                self.watermark = Some(self.watermark.map_or(ts, |w| w.max(ts)));
            }
            self.catching_up = false;
            return;
        }

        let next = match (newest, since) {
            (Some(ts), Some(from)) if ts <= from => {
                // A full page at a single timestamp would be returned again forever
                warn!(
                    direction = %direction,
                    timestamp = %from,
                    capacity,
                    "Page limit filled by one timestamp, skipping past it"
                );
                from + chrono::Duration::seconds(1)
            }
            (Some(ts), _) => ts,
            (None, Some(from)) => {
                warn!(
                    direction = %direction,
                    timestamp = %from,
                    capacity,
                    "Page limit filled with unreadable records, skipping past them"
                );
                from + chrono::Duration::seconds(1)
            }
            (None, None) => return,
        };

        debug!(direction = %direction, cursor = %next, "Page limit reached, resuming from newest fetched event");
        self.watermark = Some(next);
        self.catching_up = true;
    }
}
