// Volume surge: an outsized volume bar plus a decisive candle body, with the
// oscillator still in its middle zone so the move has room to run.

use crate::indicators::rsi;
use crate::types::{
    Direction, DynamicThresholds, MarketState, SignalCandidate, TelemetrySnapshot,
};

use super::Strategy;

const SURGE_FACTOR: f64 = 2.0;
// Body must be at least this fraction of the bar's range to call direction.
const MIN_BODY_FRACTION: f64 = 0.5;

pub struct VolumeSurgeStrategy;

impl Strategy for VolumeSurgeStrategy {
    fn name(&self) -> &'static str {
        "volume_surge"
    }

    fn evaluate(
        &self,
        snapshot: &TelemetrySnapshot,
        state: &MarketState,
        thresholds: &DynamicThresholds,
    ) -> Option<SignalCandidate> {
        if state.volume_strength < SURGE_FACTOR {
            return None;
        }

        let last = snapshot.observations.last()?;
        let range = last.high - last.low;
        if range <= 0.0 {
            return None;
        }
        let body = last.close - last.open;
        if body.abs() / range < MIN_BODY_FRACTION {
            return None;
        }
        let direction = if body > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };

        // An already-stretched oscillator means the surge is exhaustion, not
        // initiation.
        let oscillator = rsi(&snapshot.observations, thresholds.lookbacks.oscillator)?;
        if oscillator <= thresholds.oscillator_low || oscillator >= thresholds.oscillator_high {
            return None;
        }

        let confidence = (0.45
            + (state.volume_strength - SURGE_FACTOR) * 0.2
            + (body.abs() / range - MIN_BODY_FRACTION) * 0.3)
            .clamp(0.0, 1.0);

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

    fn base_snapshot() -> TelemetrySnapshot {
        let start = Utc::now() - Duration::minutes(40);
        let observations: Vec<Observation> = (0..40)
            .map(|i| Observation {
                open_time: start + Duration::minutes(i),
                close_time: start + Duration::minutes(i + 1),
                open: 100.0,
                high: 100.3,
                low: 99.7,
                close: 100.0 + if i % 2 == 0 { 0.1 } else { -0.1 },
                volume: 50.0,
            })
            .collect();
        TelemetrySnapshot {
            instrument: "BTCUSDT".to_string(),
            observations,
            best_bid: 99.99,
            best_ask: 100.01,
            best_bid_qty: 10.0,
            best_ask_qty: 10.0,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn surge_with_bullish_body_goes_long() {
        let mut snap = base_snapshot();
        let last = snap.observations.last_mut().unwrap();
        last.open = 100.0;
        last.high = 101.2;
        last.low = 99.9;
        last.close = 101.0;
        last.volume = 500.0;

        let state = market_state::estimate(&snap, &EstimatorCfg::default()).unwrap();
        let thresholds = thresholds::derive(&state, &ThresholdCfg::default());
        let candidate = VolumeSurgeStrategy
            .evaluate(&snap, &state, &thresholds)
            .expect("surge bar should trigger");
        assert_eq!(candidate.direction, Direction::Long);
    }

    #[test]
    fn surge_with_indecisive_body_stands_aside() {
        let mut snap = base_snapshot();
        let last = snap.observations.last_mut().unwrap();
        last.open = 100.0;
        last.high = 101.0;
        last.low = 99.0;
        last.close = 100.1;
        last.volume = 500.0;

        let state = market_state::estimate(&snap, &EstimatorCfg::default()).unwrap();
        let thresholds = thresholds::derive(&state, &ThresholdCfg::default());
        assert!(VolumeSurgeStrategy
            .evaluate(&snap, &state, &thresholds)
            .is_none());
    }
}
