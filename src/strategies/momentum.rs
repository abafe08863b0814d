// Momentum: oscillator pushed past its dynamic bound while the fast moving
// average agrees with the push. Fires long on oversold recovery pressure
// being absent, i.e. genuine upside momentum, and mirrored for shorts.

use crate::indicators::{rsi, sma_close};
use crate::types::{
    Direction, DynamicThresholds, MarketState, SignalCandidate, TelemetrySnapshot,
};

use super::Strategy;

pub struct MomentumStrategy;

impl Strategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn evaluate(
        &self,
        snapshot: &TelemetrySnapshot,
        state: &MarketState,
        thresholds: &DynamicThresholds,
    ) -> Option<SignalCandidate> {
        let obs = &snapshot.observations;
        let oscillator = rsi(obs, thresholds.lookbacks.oscillator)?;

        // Fast MA slope over the last bar: the average must be moving in the
        // direction the oscillator claims.
        let fast_now = sma_close(obs, thresholds.lookbacks.ma_fast)?;
        let fast_prev = sma_close(
            &obs[..obs.len().checked_sub(1)?],
            thresholds.lookbacks.ma_fast,
        )?;
        let slope = fast_now - fast_prev;

        let direction = if oscillator >= thresholds.oscillator_high && slope > 0.0 {
            Direction::Long
        } else if oscillator <= thresholds.oscillator_low && slope < 0.0 {
            Direction::Short
        } else {
            return None;
        };

        // Confidence grows with how far past the bound the oscillator sits.
        let overshoot = match direction {
            Direction::Long => (oscillator - thresholds.oscillator_high) / 20.0,
            Direction::Short => (thresholds.oscillator_low - oscillator) / 20.0,
        };
        let confidence = (0.5 + overshoot + state.trend_alignment * 0.2).clamp(0.0, 1.0);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EstimatorCfg, ThresholdCfg};
    use crate::market_state;
    use crate::thresholds;
    use crate::types::Observation;
    use chrono::{Duration, Utc};

    fn snapshot_from_closes(closes: &[f64], volume: f64) -> TelemetrySnapshot {
        let start = Utc::now() - Duration::minutes(closes.len() as i64);
        let observations = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Observation {
                open_time: start + Duration::minutes(i as i64),
                close_time: start + Duration::minutes(i as i64 + 1),
                open: close,
                high: close * 1.001,
                low: close * 0.999,
                close,
                volume,
            })
            .collect();
        let last = *closes.last().unwrap();
        TelemetrySnapshot {
            instrument: "BTCUSDT".to_string(),
            observations,
            best_bid: last * 0.9999,
            best_ask: last * 1.0001,
            best_bid_qty: 10.0,
            best_ask_qty: 10.0,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn sustained_climb_yields_long_candidate() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 0.6).collect();
        let snapshot = snapshot_from_closes(&closes, 50.0);
        let state = market_state::estimate(&snapshot, &EstimatorCfg::default()).unwrap();
        let thresholds = thresholds::derive(&state, &ThresholdCfg::default());

        let candidate = MomentumStrategy
            .evaluate(&snapshot, &state, &thresholds)
            .expect("steady climb should trigger momentum");
        assert_eq!(candidate.direction, Direction::Long);
        assert!(candidate.stop_loss < candidate.entry_price);
        assert!(candidate.take_profit > candidate.entry_price);
    }

    #[test]
    fn flat_market_stands_aside() {
        let closes = vec![100.0; 40];
        let snapshot = snapshot_from_closes(&closes, 50.0);
        let state = market_state::estimate(&snapshot, &EstimatorCfg::default()).unwrap();
        let thresholds = thresholds::derive(&state, &ThresholdCfg::default());

        assert!(MomentumStrategy
            .evaluate(&snapshot, &state, &thresholds)
            .is_none());
    }
}
