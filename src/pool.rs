// Stage 5b: Signal Pool
// At most one active signal per instrument. A standing entry yields only to
// expiry or to a strictly higher-scoring non-duplicate. External readers get
// snapshots, never live references.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::types::PrecisionSignal;

// Suppression timestamps older than this are useless to any window query
// the engine makes; matches the dedup decay window.
const SUPPRESSION_RETENTION_SECS: i64 = 7200;

#[derive(Clone, Debug)]
pub struct SignalPoolEntry {
    pub signal: PrecisionSignal,
    pub accepted_at: DateTime<Utc>,
}

impl SignalPoolEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.signal.expires_at
    }
}

/// Why an offered signal did or did not enter the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolDecision {
    /// No active entry existed for the instrument.
    Inserted,
    /// The prior entry had expired and was replaced.
    ReplacedExpired,
    /// The new signal outscored the standing entry.
    ReplacedOutscored,
    /// A live entry with an equal or better score stands.
    KeptExisting,
}

#[derive(Debug, Default)]
pub struct SignalPool {
    entries: HashMap<String, SignalPoolEntry>,
    /// Timestamps of suppressed duplicates per instrument, pruned to the
    /// accounting window on read.
    suppressed: HashMap<String, VecDeque<DateTime<Utc>>>,
}

impl SignalPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a deduplicated signal to the pool.
    pub fn accept(&mut self, signal: PrecisionSignal, now: DateTime<Utc>) -> PoolDecision {
        let decision = match self.entries.get(&signal.instrument) {
            None => PoolDecision::Inserted,
            Some(entry) if entry.is_expired(now) => PoolDecision::ReplacedExpired,
            Some(entry) if signal.precision_score > entry.signal.precision_score => {
                PoolDecision::ReplacedOutscored
            }
            Some(_) => PoolDecision::KeptExisting,
        };
        if decision != PoolDecision::KeptExisting {
            info!(
                instrument = %signal.instrument,
                strategy = signal.strategy,
                direction = ?signal.direction,
                score = signal.precision_score,
                decision = ?decision,
                "signal pool updated"
            );
            self.entries.insert(
                signal.instrument.clone(),
                SignalPoolEntry {
                    signal,
                    accepted_at: now,
                },
            );
        }
        decision
    }

    /// The instrument's active signal, if any. Expired entries are removed
    /// on read.
    pub fn active(&mut self, instrument: &str, now: DateTime<Utc>) -> Option<PrecisionSignal> {
        if let Some(entry) = self.entries.get(instrument) {
            if entry.is_expired(now) {
                self.entries.remove(instrument);
                return None;
            }
            return Some(entry.signal.clone());
        }
        None
    }

    /// Copy of every live entry. Readers outside the worker loop must use
    /// this rather than holding references into the pool.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<SignalPoolEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .cloned()
            .collect()
    }

    /// Record one suppressed duplicate. Entries past the retention horizon
    /// are pruned on every write so the deque stays bounded even if nobody
    /// ever reads the counter.
    pub fn record_suppressed(&mut self, instrument: &str, now: DateTime<Utc>) {
        let times = self.suppressed.entry(instrument.to_string()).or_default();
        let horizon = Duration::seconds(SUPPRESSION_RETENTION_SECS);
        while times.front().is_some_and(|&t| now - t >= horizon) {
            times.pop_front();
        }
        times.push_back(now);
    }

    /// Suppressed-duplicate count for the instrument over the trailing
    /// window.
    pub fn suppressed_in_window(
        &mut self,
        instrument: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        match self.suppressed.get_mut(instrument) {
            Some(times) => {
                while times.front().is_some_and(|&t| now - t >= window) {
                    times.pop_front();
                }
                times.len()
            }
            None => 0,
        }
    }
}
