// Stage 5a: Cross-Window Deduplicator
// Bounded per-instrument history of emitted signals plus a weighted,
// time-decayed similarity check. Owned exclusively by one instrument's
// worker, so eviction and insertion within a cycle need no locking.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::DedupCfg;
use crate::types::{ConfidenceTier, Direction, PrecisionSignal};

// Similarity feature weights. They sum to 1.10; scores are normalized back
// into [0, 1].
const W_STRATEGY: f64 = 0.30;
const W_DIRECTION: f64 = 0.25;
const W_TIER: f64 = 0.15;
const W_PRICE_BUCKET: f64 = 0.10;
const W_OSC_ZONE: f64 = 0.10;
const W_NUMERIC: f64 = 0.20;
const WEIGHT_TOTAL: f64 =
    W_STRATEGY + W_DIRECTION + W_TIER + W_PRICE_BUCKET + W_OSC_ZONE + W_NUMERIC;

/// Compact signature of an emitted signal kept for duplicate comparison.
#[derive(Clone, Debug)]
pub struct SignalHistoryRecord {
    pub strategy: &'static str,
    pub direction: Direction,
    pub tier: ConfidenceTier,
    pub price_bucket: i64,
    pub oscillator_zone: i8,
    /// Precision score at emission time.
    pub strength: f64,
    pub confidence: f64,
    pub emitted_at: DateTime<Utc>,
}

impl SignalHistoryRecord {
    pub fn from_signal(signal: &PrecisionSignal, cfg: &DedupCfg) -> Self {
        Self {
            strategy: signal.strategy,
            direction: signal.direction,
            tier: ConfidenceTier::from_confidence(signal.confidence),
            price_bucket: price_bucket(signal.entry_price, cfg.price_bucket_fraction),
            oscillator_zone: oscillator_zone(signal.oscillator),
            strength: signal.precision_score,
            confidence: signal.confidence,
            emitted_at: signal.created_at,
        }
    }
}

/// Discretize a price into buckets sized as `fraction` of its decade scale,
/// so a 0.5% bucket near 60000 spans 50 while near 100 it spans 0.5.
fn price_bucket(price: f64, fraction: f64) -> i64 {
    if !price.is_finite() || price <= 0.0 {
        return 0;
    }
    let scale = 10f64.powf(price.log10().floor());
    let width = (scale * fraction).max(f64::EPSILON);
    (price / width).floor() as i64
}

fn oscillator_zone(oscillator: f64) -> i8 {
    (oscillator.clamp(0.0, 100.0) / 10.0).floor() as i8
}

/// Outcome of one duplicate check, kept for logging and pool accounting.
#[derive(Clone, Copy, Debug)]
pub struct DedupVerdict {
    pub suppressed: bool,
    /// Highest decayed similarity found against history.
    pub similarity: f64,
    /// Threshold that was in force for this check.
    pub threshold: f64,
}

/// Per-instrument ring of recent signal signatures.
#[derive(Debug, Default)]
pub struct SignalHistory {
    records: VecDeque<SignalHistoryRecord>,
}

impl SignalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check a freshly selected signal against history and record it either
    /// way. Suppressed signals still count as recent activity, so they enter
    /// history too. Eviction and insertion happen together here; callers
    /// never observe a half-updated ring.
    pub fn check_and_record(
        &mut self,
        signal: &PrecisionSignal,
        atr_fraction: f64,
        now: DateTime<Utc>,
        cfg: &DedupCfg,
    ) -> DedupVerdict {
        self.evict(now, cfg);

        let candidate = SignalHistoryRecord::from_signal(signal, cfg);
        let window = Duration::seconds(cfg.decay_window_secs);
        let mut best = 0.0f64;
        for record in &self.records {
            let age = now - record.emitted_at;
            if age >= window || age < Duration::zero() {
                continue;
            }
            let decay = 1.0 - age.num_milliseconds() as f64 / window.num_milliseconds() as f64;
            let score = feature_similarity(&candidate, record) * decay;
            if score > best {
                best = score;
            }
        }

        let threshold = effective_threshold(atr_fraction, cfg);
        let suppressed = best >= threshold;
        if suppressed {
            debug!(
                instrument = %signal.instrument,
                strategy = signal.strategy,
                similarity = best,
                threshold,
                "signal suppressed as near-duplicate"
            );
        }

        self.records.push_back(candidate);
        while self.records.len() > cfg.history_capacity {
            self.records.pop_front();
        }

        DedupVerdict {
            suppressed,
            similarity: best,
            threshold,
        }
    }

    fn evict(&mut self, now: DateTime<Utc>, cfg: &DedupCfg) {
        let window = Duration::seconds(cfg.decay_window_secs);
        while let Some(front) = self.records.front() {
            if now - front.emitted_at >= window {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Undecayed feature similarity in [0, 1].
fn feature_similarity(a: &SignalHistoryRecord, b: &SignalHistoryRecord) -> f64 {
    let mut score = 0.0;
    if a.strategy == b.strategy {
        score += W_STRATEGY;
    }
    if a.direction == b.direction {
        score += W_DIRECTION;
    }
    if a.tier == b.tier {
        score += W_TIER;
    }
    if a.price_bucket == b.price_bucket {
        score += W_PRICE_BUCKET;
    }
    if a.oscillator_zone == b.oscillator_zone {
        score += W_OSC_ZONE;
    }
    let numeric_distance =
        ((a.strength - b.strength).abs() + (a.confidence - b.confidence).abs()) / 2.0;
    score += W_NUMERIC * (1.0 - numeric_distance.clamp(0.0, 1.0));
    score / WEIGHT_TOTAL
}

/// High volatility raises the suppression bar: look-alike signals in a fast
/// market carry genuinely new information, so a candidate must be more
/// similar before it counts as a duplicate. The result never drops below
/// the configured minimum.
fn effective_threshold(atr_fraction: f64, cfg: &DedupCfg) -> f64 {
    let threshold = if atr_fraction > cfg.high_volatility_cutoff {
        cfg.base_similarity_threshold + cfg.high_volatility_relaxation
    } else {
        cfg.base_similarity_threshold
    };
    threshold.max(cfg.min_similarity_threshold).min(1.0)
}
