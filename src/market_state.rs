// Stage 1: Market State Estimator
// Classifies one telemetry snapshot into volatility/volume/liquidity scores,
// a sentiment index, and a regime label with confidence.

use chrono::Utc;
use tracing::debug;

use crate::config::EstimatorCfg;
use crate::error::{EngineError, Result};
use crate::indicators;
use crate::types::{MarketRegime, MarketState, SentimentLevel, TelemetrySnapshot};

// Regime lookbacks are fixed; the per-strategy lookbacks adapt downstream.
const REGIME_MA_FAST: usize = 9;
const REGIME_MA_SLOW: usize = 21;

/// Compute the MarketState for one snapshot.
///
/// Fails closed: fewer than `min_observations` observations yields
/// `DataUnavailable` and no state. Callers that must carry on can use
/// `MarketState::neutral` instead, which is flagged low-confidence.
pub fn estimate(snapshot: &TelemetrySnapshot, cfg: &EstimatorCfg) -> Result<MarketState> {
    let obs = &snapshot.observations;
    if obs.len() < cfg.min_observations {
        return Err(EngineError::unavailable(
            &snapshot.instrument,
            format!(
                "{} observations, estimator needs {}",
                obs.len(),
                cfg.min_observations
            ),
        ));
    }

    let price = snapshot
        .last_close()
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| EngineError::unavailable(&snapshot.instrument, "no usable close price"))?;

    let atr = indicators::atr(obs, cfg.atr_period).unwrap_or(0.0);
    let atr_fraction = atr / price;
    let volatility_score = (atr_fraction / cfg.base_volatility).clamp(0.0, 3.0);

    let volume_strength = match (obs.last(), indicators::mean_volume(obs, cfg.volume_period)) {
        (Some(last), Some(avg)) if avg > 0.0 => (last.volume / avg).clamp(0.0, 3.0),
        _ => 0.0,
    };

    // Tight spreads score toward 2.0, spreads at or beyond the reference
    // score zero.
    let liquidity_score =
        (2.0 * (1.0 - snapshot.spread_fraction() / cfg.spread_reference)).clamp(0.0, 2.0);

    let sentiment_index = sentiment_index(obs, cfg, volume_strength, volatility_score);
    let (regime, regime_confidence) = classify_regime(obs, price, atr_fraction, cfg);
    let trend_alignment = trend_alignment(obs, regime);

    let state = MarketState {
        instrument: snapshot.instrument.clone(),
        price,
        volatility_score,
        volume_strength,
        liquidity_score,
        sentiment_index,
        sentiment_level: SentimentLevel::from_index(sentiment_index),
        atr,
        atr_fraction,
        regime,
        regime_confidence,
        trend_alignment,
        is_neutral_default: false,
        timestamp: Utc::now(),
    };

    debug!(
        instrument = %state.instrument,
        regime = ?state.regime,
        regime_confidence = state.regime_confidence,
        volatility_score = state.volatility_score,
        volume_strength = state.volume_strength,
        sentiment = state.sentiment_index,
        "market state estimated"
    );

    Ok(state)
}

/// Composite sentiment in [0, 100]: price momentum 50%, volume 30%,
/// volatility drag 20%. High volatility reads as fear.
fn sentiment_index(
    obs: &[crate::types::Observation],
    cfg: &EstimatorCfg,
    volume_strength: f64,
    volatility_score: f64,
) -> f64 {
    // A +/-5% move over the momentum period saturates the momentum leg.
    let momentum = indicators::rate_of_change(obs, cfg.momentum_period).unwrap_or(0.0);
    let momentum_sub = (50.0 + (momentum / 0.05) * 50.0).clamp(0.0, 100.0);

    // Volume strength of 1.0 (average activity) maps to the midpoint.
    let volume_sub = (volume_strength * 50.0).clamp(0.0, 100.0);

    let volatility_sub = (100.0 - (volatility_score / 3.0) * 100.0).clamp(0.0, 100.0);

    (0.5 * momentum_sub + 0.3 * volume_sub + 0.2 * volatility_sub).clamp(0.0, 100.0)
}

/// Regime from fast/slow SMA separation relative to realized volatility.
/// Confidence grows monotonically with distance from the decision boundary.
fn classify_regime(
    obs: &[crate::types::Observation],
    price: f64,
    atr_fraction: f64,
    cfg: &EstimatorCfg,
) -> (MarketRegime, f64) {
    if atr_fraction > cfg.high_volatility_cutoff {
        let confidence =
            ((atr_fraction - cfg.high_volatility_cutoff) / cfg.high_volatility_cutoff).clamp(0.0, 1.0);
        // Deep into volatile territory is still at least half-confident
        return (MarketRegime::Volatile, confidence.max(0.5));
    }

    let (fast, slow) = match (
        indicators::sma_close(obs, REGIME_MA_FAST),
        indicators::sma_close(obs, REGIME_MA_SLOW),
    ) {
        (Some(f), Some(s)) => (f, s),
        _ => return (MarketRegime::Sideways, 0.0),
    };

    let separation = (fast - slow) / price;
    // Boundary scales with realized volatility so quiet instruments are not
    // permanently labeled trending on noise.
    let boundary = (0.25 * atr_fraction).max(0.0005);

    if separation > boundary {
        let confidence = ((separation - boundary) / boundary).clamp(0.0, 1.0);
        (MarketRegime::TrendingUp, confidence)
    } else if separation < -boundary {
        let confidence = ((-separation - boundary) / boundary).clamp(0.0, 1.0);
        (MarketRegime::TrendingDown, confidence)
    } else {
        let confidence = (1.0 - separation.abs() / boundary).clamp(0.0, 1.0);
        (MarketRegime::Sideways, confidence)
    }
}

/// Fraction of three lookback splits (full window, last half, last quarter)
/// whose net price drift agrees with the regime direction, [0, 1].
fn trend_alignment(obs: &[crate::types::Observation], regime: MarketRegime) -> f64 {
    let expected_sign = match regime {
        MarketRegime::TrendingUp => 1.0,
        MarketRegime::TrendingDown => -1.0,
        // Sideways and Volatile have no directional expectation
        MarketRegime::Sideways | MarketRegime::Volatile => return 0.0,
    };

    let len = obs.len();
    let splits = [len, len / 2, len / 4];
    let mut agreeing = 0usize;
    let mut counted = 0usize;
    for span in splits {
        if span < 2 {
            continue;
        }
        let start = obs[len - span].close;
        let end = obs[len - 1].close;
        if start <= 0.0 {
            continue;
        }
        counted += 1;
        let drift = (end - start).signum();
        if drift == expected_sign {
            agreeing += 1;
        }
    }

    if counted == 0 {
        0.0
    } else {
        agreeing as f64 / counted as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimatorCfg;
    use crate::types::Observation;
    use chrono::{Duration, Utc};

    fn make_snapshot(closes: &[f64], volumes: &[f64], bid: f64, ask: f64) -> TelemetrySnapshot {
        let start = Utc::now() - Duration::minutes(closes.len() as i64);
        let observations: Vec<Observation> = closes
            .iter()
            .zip(volumes.iter())
            .enumerate()
            .map(|(i, (&close, &volume))| Observation {
                open_time: start + Duration::minutes(i as i64),
                close_time: start + Duration::minutes(i as i64 + 1),
                open: close,
                high: close * 1.001,
                low: close * 0.999,
                close,
                volume,
            })
            .collect();
        TelemetrySnapshot {
            instrument: "BTCUSDT".to_string(),
            observations,
            best_bid: bid,
            best_ask: ask,
            best_bid_qty: 10.0,
            best_ask_qty: 10.0,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn short_window_is_data_unavailable() {
        let cfg = EstimatorCfg::default();
        let snapshot = make_snapshot(&[100.0; 10], &[50.0; 10], 99.9, 100.1);
        let err = estimate(&snapshot, &cfg).unwrap_err();
        assert!(err.is_data_unavailable());
    }

    #[test]
    fn flat_market_classifies_sideways() {
        let cfg = EstimatorCfg::default();
        let snapshot = make_snapshot(&[100.0; 40], &[50.0; 40], 99.99, 100.01);
        let state = estimate(&snapshot, &cfg).unwrap();
        assert_eq!(state.regime, MarketRegime::Sideways);
        assert!(!state.is_neutral_default);
        assert!(state.volatility_score < 0.5);
        assert!(state.liquidity_score > 1.5, "tight spread should score high");
    }

    #[test]
    fn steady_climb_classifies_trending_up() {
        let cfg = EstimatorCfg::default();
        let closes: Vec<f64> = (0..40).map(|i| 100.0 * (1.0 + 0.004 * i as f64)).collect();
        let snapshot = make_snapshot(&closes, &[50.0; 40], 115.9, 116.1);
        let state = estimate(&snapshot, &cfg).unwrap();
        assert_eq!(state.regime, MarketRegime::TrendingUp);
        assert!(state.trend_alignment > 0.9);
        assert!(state.sentiment_index > 55.0);
    }

    #[test]
    fn wide_ranges_force_volatile_regime() {
        let cfg = EstimatorCfg::default();
        let start = Utc::now() - Duration::minutes(40);
        let observations: Vec<Observation> = (0..40)
            .map(|i| {
                let close = if i % 2 == 0 { 100.0 } else { 108.0 };
                Observation {
                    open_time: start + Duration::minutes(i as i64),
                    close_time: start + Duration::minutes(i as i64 + 1),
                    open: close,
                    high: close * 1.06,
                    low: close * 0.94,
                    close,
                    volume: 50.0,
                }
            })
            .collect();
        let snapshot = TelemetrySnapshot {
            instrument: "BTCUSDT".to_string(),
            observations,
            best_bid: 99.9,
            best_ask: 100.1,
            best_bid_qty: 10.0,
            best_ask_qty: 10.0,
            fetched_at: Utc::now(),
        };
        let state = estimate(&snapshot, &cfg).unwrap();
        assert_eq!(state.regime, MarketRegime::Volatile);
        assert!(state.atr_fraction > cfg.high_volatility_cutoff);
    }

    #[test]
    fn volume_spike_raises_volume_strength() {
        let cfg = EstimatorCfg::default();
        let mut volumes = vec![50.0; 40];
        *volumes.last_mut().unwrap() = 150.0;
        let snapshot = make_snapshot(&[100.0; 40], &volumes, 99.99, 100.01);
        let state = estimate(&snapshot, &cfg).unwrap();
        assert!(state.volume_strength > 2.0);
    }
}
