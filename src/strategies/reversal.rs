// Reversal: fast/slow moving-average crossover on the latest bar. Built for
// ranging conditions, so a sideways regime raises confidence and a strongly
// trending one lowers it.

use crate::indicators::{rsi, sma_close};
use crate::types::{
    Direction, DynamicThresholds, MarketRegime, MarketState, SignalCandidate, TelemetrySnapshot,
};

use super::Strategy;

pub struct ReversalStrategy;

impl Strategy for ReversalStrategy {
    fn name(&self) -> &'static str {
        "reversal"
    }

    fn evaluate(
        &self,
        snapshot: &TelemetrySnapshot,
        state: &MarketState,
        thresholds: &DynamicThresholds,
    ) -> Option<SignalCandidate> {
        let obs = &snapshot.observations;
        let prior = &obs[..obs.len().checked_sub(1)?];

        let fast_now = sma_close(obs, thresholds.lookbacks.ma_fast)?;
        let slow_now = sma_close(obs, thresholds.lookbacks.ma_slow)?;
        let fast_prev = sma_close(prior, thresholds.lookbacks.ma_fast)?;
        let slow_prev = sma_close(prior, thresholds.lookbacks.ma_slow)?;

        // Only a crossover that completed on this bar counts.
        let direction = if fast_prev <= slow_prev && fast_now > slow_now {
            Direction::Long
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Direction::Short
        } else {
            return None;
        };

        let separation = (fast_now - slow_now).abs() / slow_now.max(f64::EPSILON);
        let regime_fit = match state.regime {
            MarketRegime::Sideways => 0.15,
            MarketRegime::Volatile => 0.0,
            MarketRegime::TrendingUp | MarketRegime::TrendingDown => {
                -0.15 * state.regime_confidence
            }
        };
        let confidence = (0.5 + (separation * 200.0).min(0.2) + regime_fit).clamp(0.0, 1.0);

        let oscillator = rsi(obs, thresholds.lookbacks.oscillator)?;
        Some(SignalCandidate::with_protective_levels(
            &snapshot.instrument,
            direction,
            self.name(),
            confidence,
            snapshot.mid_price(),
            oscillator,
            state.volume_strength,
            thresholds,
            snapshot.fetched_at,
        ))
    }
}
