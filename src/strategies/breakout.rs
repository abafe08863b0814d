// Breakout: last close escapes a band of two standard deviations around the
// rolling mean, confirmed by above-average volume.

use crate::indicators::{rsi, sma_close, stddev_close};
use crate::types::{
    Direction, DynamicThresholds, MarketState, SignalCandidate, TelemetrySnapshot,
};

use super::Strategy;

const VOLUME_CONFIRMATION: f64 = 1.2;
const BAND_WIDTH: f64 = 2.0;

pub struct BreakoutStrategy;

impl Strategy for BreakoutStrategy {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn evaluate(
        &self,
        snapshot: &TelemetrySnapshot,
        state: &MarketState,
        thresholds: &DynamicThresholds,
    ) -> Option<SignalCandidate> {
        if state.volume_strength < VOLUME_CONFIRMATION {
            return None;
        }

        let obs = &snapshot.observations;
        let period = thresholds.lookbacks.band;
        // Band is computed over the bars preceding the breakout bar so the
        // breakout itself does not inflate it.
        let prior = &obs[..obs.len().checked_sub(1)?];
        let mean = sma_close(prior, period)?;
        let dev = stddev_close(prior, period)?;
        if dev <= 0.0 {
            return None;
        }
        let close = obs.last()?.close;

        let upper = mean + BAND_WIDTH * dev;
        let lower = mean - BAND_WIDTH * dev;
        let direction = if close > upper {
            Direction::Long
        } else if close < lower {
            Direction::Short
        } else {
            return None;
        };

        // Distance beyond the band in deviations drives confidence.
        let escape = match direction {
            Direction::Long => (close - upper) / dev,
            Direction::Short => (lower - close) / dev,
        };
        let confidence =
            (0.55 + escape * 0.15 + (state.volume_strength - VOLUME_CONFIRMATION) * 0.1)
                .clamp(0.0, 1.0);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EstimatorCfg, ThresholdCfg};
    use crate::market_state;
    use crate::thresholds;
    use crate::types::Observation;
    use chrono::{Duration, Utc};

    fn snapshot(closes: &[f64], volumes: &[f64]) -> TelemetrySnapshot {
        assert_eq!(closes.len(), volumes.len());
        let start = Utc::now() - Duration::minutes(closes.len() as i64);
        let observations = closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| Observation {
                open_time: start + Duration::minutes(i as i64),
                close_time: start + Duration::minutes(i as i64 + 1),
                open: close,
                high: close * 1.002,
                low: close * 0.998,
                close,
                volume,
            })
            .collect();
        let last = *closes.last().unwrap();
        TelemetrySnapshot {
            instrument: "ETHUSDT".to_string(),
            observations,
            best_bid: last * 0.9999,
            best_ask: last * 1.0001,
            best_bid_qty: 5.0,
            best_ask_qty: 5.0,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn band_escape_with_volume_goes_long() {
        // Gentle noise, then a decisive close above the band with a volume
        // burst on the final bar.
        let mut closes: Vec<f64> = (0..39)
            .map(|i| 100.0 + if i % 2 == 0 { 0.2 } else { -0.2 })
            .collect();
        closes.push(104.0);
        let mut volumes = vec![40.0; 39];
        volumes.push(160.0);
        let snap = snapshot(&closes, &volumes);
        let state = market_state::estimate(&snap, &EstimatorCfg::default()).unwrap();
        let thresholds = thresholds::derive(&state, &ThresholdCfg::default());

        let candidate = BreakoutStrategy
            .evaluate(&snap, &state, &thresholds)
            .expect("band escape should trigger breakout");
        assert_eq!(candidate.direction, Direction::Long);
    }

    #[test]
    fn escape_without_volume_stands_aside() {
        let mut closes: Vec<f64> = (0..39)
            .map(|i| 100.0 + if i % 2 == 0 { 0.2 } else { -0.2 })
            .collect();
        closes.push(104.0);
        let volumes = vec![40.0; 40];
        let snap = snapshot(&closes, &volumes);
        let state = market_state::estimate(&snap, &EstimatorCfg::default()).unwrap();
        let thresholds = thresholds::derive(&state, &ThresholdCfg::default());

        assert!(BreakoutStrategy
            .evaluate(&snap, &state, &thresholds)
            .is_none());
    }
}
