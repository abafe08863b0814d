// Domain types for the signal engine
// All cross-stage types are centralized here for single source of truth

use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Telemetry Input
// ============================================================================

/// One OHLCV observation from the market-data collaborator.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Snapshot of one instrument's telemetry for a single cycle.
/// Observations are ordered oldest first.
#[derive(Clone, Debug)]
pub struct TelemetrySnapshot {
    pub instrument: String,
    pub observations: Vec<Observation>,
    pub best_bid: f64,
    pub best_ask: f64,
    pub best_bid_qty: f64,
    pub best_ask_qty: f64,
    pub fetched_at: DateTime<Utc>,
}

impl TelemetrySnapshot {
    pub fn last_close(&self) -> Option<f64> {
        self.observations.last().map(|o| o.close)
    }

    pub fn mid_price(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Bid/ask spread as a fraction of the mid price. Zero when the book is
    /// degenerate so liquidity scoring never divides by zero.
    pub fn spread_fraction(&self) -> f64 {
        let mid = self.mid_price();
        if mid <= 0.0 {
            return 0.0;
        }
        ((self.best_ask - self.best_bid) / mid).max(0.0)
    }
}

// ============================================================================
// Market State (stage 1 output)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Sideways,
    Volatile,
}

impl MarketRegime {
    pub fn is_trending(self) -> bool {
        matches!(self, Self::TrendingUp | Self::TrendingDown)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SentimentLevel {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl SentimentLevel {
    /// Discrete levels at 25/45/55/75 over the [0,100] index.
    pub fn from_index(index: f64) -> Self {
        if index < 25.0 {
            Self::ExtremeFear
        } else if index < 45.0 {
            Self::Fear
        } else if index <= 55.0 {
            Self::Neutral
        } else if index <= 75.0 {
            Self::Greed
        } else {
            Self::ExtremeGreed
        }
    }
}

/// Immutable per-cycle classification of one instrument's market conditions.
/// Recomputed every cycle, never mutated after creation.
#[derive(Clone, Debug, Serialize)]
pub struct MarketState {
    pub instrument: String,
    pub price: f64,
    /// Normalized ATR-as-fraction-of-price, [0, 3].
    pub volatility_score: f64,
    /// Current volume relative to its rolling mean, [0, 3].
    pub volume_strength: f64,
    /// Spread-derived liquidity quality, [0, 2]. Tight books score high.
    pub liquidity_score: f64,
    /// Composite sentiment index, [0, 100].
    pub sentiment_index: f64,
    pub sentiment_level: SentimentLevel,
    pub atr: f64,
    /// ATR divided by price; the realized-volatility measure used by the
    /// deduplicator's adaptive threshold.
    pub atr_fraction: f64,
    pub regime: MarketRegime,
    /// Confidence in the regime label, [0, 1].
    pub regime_confidence: f64,
    /// Cross-timeframe trend agreement, [0, 1].
    pub trend_alignment: f64,
    /// True when this is the documented fail-closed default rather than a
    /// computed state. Callers must treat it as low-confidence.
    pub is_neutral_default: bool,
    pub timestamp: DateTime<Utc>,
}

impl MarketState {
    /// Documented neutral default used when telemetry is too thin to
    /// classify. Never fabricates indicator values.
    pub fn neutral(instrument: &str, price: f64, now: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.to_string(),
            price,
            volatility_score: 0.0,
            volume_strength: 0.0,
            liquidity_score: 0.0,
            sentiment_index: 50.0,
            sentiment_level: SentimentLevel::Neutral,
            atr: 0.0,
            atr_fraction: 0.0,
            regime: MarketRegime::Sideways,
            regime_confidence: 0.0,
            trend_alignment: 0.0,
            is_neutral_default: true,
            timestamp: now,
        }
    }
}

// ============================================================================
// Dynamic Thresholds (stage 2 output)
// ============================================================================

/// Regime-adapted indicator lookback periods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LookbackPeriods {
    pub ma_fast: usize,
    pub ma_slow: usize,
    pub oscillator: usize,
    pub band: usize,
}

/// Operating parameters for one cycle, derived deterministically from one
/// MarketState. Invariants: confidence_floor in [0.15, 0.40],
/// stop_loss_fraction in [0.01, 0.05], take_profit_fraction in [0.02, 0.08].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DynamicThresholds {
    pub confidence_floor: f64,
    pub oscillator_low: f64,
    pub oscillator_high: f64,
    pub stop_loss_fraction: f64,
    pub take_profit_fraction: f64,
    pub lookbacks: LookbackPeriods,
    pub position_size_multiplier: f64,
    pub holding_duration_secs: i64,
}

// ============================================================================
// Candidates and Signals (stages 3-5)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Direction {
    Long,
    Short,
}

/// A proposal from exactly one strategy. Immutable; discarded after scoring
/// unless selected.
#[derive(Clone, Debug)]
pub struct SignalCandidate {
    pub instrument: String,
    pub direction: Direction,
    pub strategy: &'static str,
    /// Strategy's own confidence in [0, 1].
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Oscillator reading at proposal time, [0, 100].
    pub oscillator: f64,
    pub volume_strength: f64,
    pub created_at: DateTime<Utc>,
}

impl SignalCandidate {
    /// Build a candidate with protective levels attached from the dynamic
    /// stop/target fractions. Long stops sit below entry, shorts above.
    #[allow(clippy::too_many_arguments)]
    pub fn with_protective_levels(
        instrument: &str,
        direction: Direction,
        strategy: &'static str,
        confidence: f64,
        entry_price: f64,
        oscillator: f64,
        volume_strength: f64,
        thresholds: &DynamicThresholds,
        created_at: DateTime<Utc>,
    ) -> Self {
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (
                entry_price * (1.0 - thresholds.stop_loss_fraction),
                entry_price * (1.0 + thresholds.take_profit_fraction),
            ),
            Direction::Short => (
                entry_price * (1.0 + thresholds.stop_loss_fraction),
                entry_price * (1.0 - thresholds.take_profit_fraction),
            ),
        };
        Self {
            instrument: instrument.to_string(),
            direction,
            strategy,
            confidence: confidence.clamp(0.0, 1.0),
            entry_price,
            stop_loss,
            take_profit,
            oscillator,
            volume_strength,
            created_at,
        }
    }
}

/// A candidate promoted by the scorer. Owned by the signal pool once
/// accepted; converted into a history record at expiry or replacement.
#[derive(Clone, Debug, Serialize)]
pub struct PrecisionSignal {
    pub instrument: String,
    pub direction: Direction,
    pub strategy: &'static str,
    pub confidence: f64,
    pub precision_score: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    pub oscillator: f64,
    pub volume_strength: f64,
    pub position_size_multiplier: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Confidence tier used by the deduplication signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 0.45 {
            Self::Low
        } else if confidence < 0.70 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn sentiment_levels_split_at_documented_boundaries() {
        assert_eq!(SentimentLevel::from_index(0.0), SentimentLevel::ExtremeFear);
        assert_eq!(SentimentLevel::from_index(24.9), SentimentLevel::ExtremeFear);
        assert_eq!(SentimentLevel::from_index(25.0), SentimentLevel::Fear);
        assert_eq!(SentimentLevel::from_index(50.0), SentimentLevel::Neutral);
        assert_eq!(SentimentLevel::from_index(60.0), SentimentLevel::Greed);
        assert_eq!(SentimentLevel::from_index(75.1), SentimentLevel::ExtremeGreed);
    }

    fn test_thresholds() -> DynamicThresholds {
        DynamicThresholds {
            confidence_floor: 0.25,
            oscillator_low: 30.0,
            oscillator_high: 70.0,
            stop_loss_fraction: 0.02,
            take_profit_fraction: 0.04,
            lookbacks: LookbackPeriods {
                ma_fast: 9,
                ma_slow: 21,
                oscillator: 14,
                band: 20,
            },
            position_size_multiplier: 1.0,
            holding_duration_secs: 3600,
        }
    }

    #[test]
    fn protective_levels_sit_on_the_correct_side() {
        let thresholds = test_thresholds();
        let long = SignalCandidate::with_protective_levels(
            "BTCUSDT",
            Direction::Long,
            "momentum",
            0.8,
            100.0,
            45.0,
            1.0,
            &thresholds,
            Utc::now(),
        );
        assert!(long.stop_loss < long.entry_price);
        assert!(long.take_profit > long.entry_price);

        let short = SignalCandidate::with_protective_levels(
            "BTCUSDT",
            Direction::Short,
            "momentum",
            0.8,
            100.0,
            55.0,
            1.0,
            &thresholds,
            Utc::now(),
        );
        assert!(short.stop_loss > short.entry_price);
        assert!(short.take_profit < short.entry_price);
    }

    #[test]
    fn neutral_state_is_flagged_low_confidence() {
        let state = MarketState::neutral("ETHUSDT", 2000.0, Utc::now());
        assert!(state.is_neutral_default);
        assert_eq!(state.regime, MarketRegime::Sideways);
        assert_eq!(state.regime_confidence, 0.0);
    }
}
