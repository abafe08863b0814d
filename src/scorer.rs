// Stage 4: Precision Scoring and Selection
// Gates candidates on the dynamic confidence floor, scores the survivors on
// five weighted components, enforces a regime-dependent risk/reward minimum
// and keeps at most one winner per cycle.

use chrono::Duration;
use tracing::debug;

use crate::config::ScorerCfg;
use crate::error::EngineError;
use crate::types::{
    Direction, DynamicThresholds, MarketRegime, MarketState, PrecisionSignal, SignalCandidate,
};

// Component weights; they sum to 1.
const W_CONFIDENCE: f64 = 0.40;
const W_MARKET_FIT: f64 = 0.25;
const W_CONSISTENCY: f64 = 0.20;
const W_TIMING: f64 = 0.10;
const W_RISK: f64 = 0.05;

/// One cycle's selection result. Defects carry per-candidate validation
/// failures that must not abort the cycle.
pub struct SelectionOutcome {
    pub winner: Option<PrecisionSignal>,
    pub defects: Vec<EngineError>,
}

pub fn select(
    candidates: &[SignalCandidate],
    state: &MarketState,
    thresholds: &DynamicThresholds,
    cfg: &ScorerCfg,
) -> SelectionOutcome {
    let mut defects = Vec::new();
    let mut winner: Option<(f64, PrecisionSignal)> = None;

    for candidate in candidates {
        if candidate.confidence < thresholds.confidence_floor {
            debug!(
                instrument = %candidate.instrument,
                strategy = candidate.strategy,
                confidence = candidate.confidence,
                floor = thresholds.confidence_floor,
                "candidate below confidence floor"
            );
            continue;
        }

        let rr = match risk_reward(candidate) {
            Ok(rr) => rr,
            Err(err) => {
                defects.push(err);
                continue;
            }
        };
        let min_rr = min_risk_reward(candidate.direction, state, cfg);
        if rr < min_rr {
            debug!(
                instrument = %candidate.instrument,
                strategy = candidate.strategy,
                risk_reward = rr,
                minimum = min_rr,
                "candidate below risk/reward minimum"
            );
            continue;
        }

        let score = precision_score(candidate, state, thresholds, rr);
        // Strictly greater keeps the earlier candidate on ties, which makes
        // registry order the tie-break.
        if winner.as_ref().map_or(true, |(best, _)| score > *best) {
            winner = Some((
                score,
                PrecisionSignal {
                    instrument: candidate.instrument.clone(),
                    direction: candidate.direction,
                    strategy: candidate.strategy,
                    confidence: candidate.confidence,
                    precision_score: score,
                    entry_price: candidate.entry_price,
                    stop_loss: candidate.stop_loss,
                    take_profit: candidate.take_profit,
                    risk_reward_ratio: rr,
                    oscillator: candidate.oscillator,
                    volume_strength: candidate.volume_strength,
                    position_size_multiplier: thresholds.position_size_multiplier,
                    created_at: candidate.created_at,
                    expires_at: candidate.created_at
                        + Duration::seconds(thresholds.holding_duration_secs),
                },
            ));
        }
    }

    SelectionOutcome {
        winner: winner.map(|(_, signal)| signal),
        defects,
    }
}

fn risk_reward(candidate: &SignalCandidate) -> Result<f64, EngineError> {
    let risk = (candidate.entry_price - candidate.stop_loss).abs();
    let reward = (candidate.take_profit - candidate.entry_price).abs();
    if !risk.is_finite() || !reward.is_finite() || risk <= 0.0 {
        return Err(EngineError::ComputationInvalid(format!(
            "degenerate protective levels for {} {}: entry {} stop {} target {}",
            candidate.instrument,
            candidate.strategy,
            candidate.entry_price,
            candidate.stop_loss,
            candidate.take_profit
        )));
    }
    Ok(reward / risk)
}

/// Counter-trend entries need a wider edge; entries aligned with a confident
/// trend are allowed a tighter one.
fn min_risk_reward(direction: Direction, state: &MarketState, cfg: &ScorerCfg) -> f64 {
    let with_trend = match state.regime {
        MarketRegime::TrendingUp => Some(direction == Direction::Long),
        MarketRegime::TrendingDown => Some(direction == Direction::Short),
        MarketRegime::Sideways | MarketRegime::Volatile => None,
    };
    match with_trend {
        Some(false) => cfg.min_rr_counter_trend,
        Some(true) if state.regime_confidence >= cfg.strong_trend_confidence => {
            cfg.min_rr_strong_trend
        }
        _ => cfg.min_rr_baseline,
    }
}

fn precision_score(
    candidate: &SignalCandidate,
    state: &MarketState,
    thresholds: &DynamicThresholds,
    rr: f64,
) -> f64 {
    let confidence = candidate.confidence.clamp(0.0, 1.0);
    let market_fit = market_fit_score(candidate.direction, state);
    let consistency = indicator_consistency_score(candidate, state, thresholds);
    let timing = timing_score(candidate, thresholds);
    let risk = ((rr - 1.0) / 2.0).clamp(0.0, 1.0);

    W_CONFIDENCE * confidence
        + W_MARKET_FIT * market_fit
        + W_CONSISTENCY * consistency
        + W_TIMING * timing
        + W_RISK * risk
}

/// How well the direction agrees with the classified regime.
fn market_fit_score(direction: Direction, state: &MarketState) -> f64 {
    match state.regime {
        MarketRegime::TrendingUp => {
            if direction == Direction::Long {
                0.6 + 0.4 * state.regime_confidence
            } else {
                0.4 * (1.0 - state.regime_confidence)
            }
        }
        MarketRegime::TrendingDown => {
            if direction == Direction::Short {
                0.6 + 0.4 * state.regime_confidence
            } else {
                0.4 * (1.0 - state.regime_confidence)
            }
        }
        MarketRegime::Sideways => 0.5,
        MarketRegime::Volatile => 0.3,
    }
}

/// Agreement between the oscillator, volume reading and cross-timeframe
/// alignment.
fn indicator_consistency_score(
    candidate: &SignalCandidate,
    state: &MarketState,
    thresholds: &DynamicThresholds,
) -> f64 {
    let osc_agrees = match candidate.direction {
        Direction::Long => candidate.oscillator >= 50.0,
        Direction::Short => candidate.oscillator <= 50.0,
    };
    let mut score: f64 = if osc_agrees { 0.5 } else { 0.2 };
    score += 0.25 * (candidate.volume_strength / 3.0).clamp(0.0, 1.0);
    if state.regime.is_trending() {
        score += 0.25 * state.trend_alignment;
    } else {
        // No banding penalty outside a trend; mid-range oscillators are the
        // consistent reading there.
        let mid = (thresholds.oscillator_low + thresholds.oscillator_high) / 2.0;
        let span = (thresholds.oscillator_high - thresholds.oscillator_low) / 2.0;
        score += 0.25 * (1.0 - ((candidate.oscillator - mid).abs() / span).clamp(0.0, 1.0));
    }
    score.clamp(0.0, 1.0)
}

/// Entries taken while the oscillator still has room toward the opposite
/// bound are better timed.
fn timing_score(candidate: &SignalCandidate, thresholds: &DynamicThresholds) -> f64 {
    let span = thresholds.oscillator_high - thresholds.oscillator_low;
    if span <= 0.0 {
        return 0.5;
    }
    let room = match candidate.direction {
        Direction::Long => thresholds.oscillator_high - candidate.oscillator + span * 0.5,
        Direction::Short => candidate.oscillator - thresholds.oscillator_low + span * 0.5,
    };
    (room / (span * 1.5)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LookbackPeriods, SentimentLevel};
    use chrono::Utc;

    fn thresholds() -> DynamicThresholds {
        DynamicThresholds {
            confidence_floor: 0.30,
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

    fn state(regime: MarketRegime, confidence: f64) -> MarketState {
        MarketState {
            instrument: "BTCUSDT".to_string(),
            price: 100.0,
            volatility_score: 1.0,
            volume_strength: 1.5,
            liquidity_score: 1.5,
            sentiment_index: 60.0,
            sentiment_level: SentimentLevel::from_index(60.0),
            atr: 1.0,
            atr_fraction: 0.01,
            regime,
            regime_confidence: confidence,
            trend_alignment: 0.8,
            is_neutral_default: false,
            timestamp: Utc::now(),
        }
    }

    fn candidate(strategy: &'static str, confidence: f64) -> SignalCandidate {
        SignalCandidate::with_protective_levels(
            "BTCUSDT",
            Direction::Long,
            strategy,
            confidence,
            100.0,
            62.0,
            1.5,
            &thresholds(),
            Utc::now(),
        )
    }

    #[test]
    fn below_floor_candidates_are_dropped() {
        let outcome = select(
            &[candidate("momentum", 0.10)],
            &state(MarketRegime::TrendingUp, 0.8),
            &thresholds(),
            &ScorerCfg::default(),
        );
        assert!(outcome.winner.is_none());
        assert!(outcome.defects.is_empty());
    }

    #[test]
    fn counter_trend_needs_wider_risk_reward() {
        // Stop 2%, target 4% gives RR 2.0; a short against a confident
        // uptrend would need only 1.8 but the long-side entry here is with
        // the trend, so it passes at 1.3.
        let outcome = select(
            &[candidate("momentum", 0.7)],
            &state(MarketRegime::TrendingUp, 0.8),
            &thresholds(),
            &ScorerCfg::default(),
        );
        assert!(outcome.winner.is_some());

        // Against the trend with a target/stop pair below 1.8 RR.
        let mut against = candidate("momentum", 0.7);
        against.direction = Direction::Short;
        against.stop_loss = 102.0;
        against.take_profit = 96.6; // RR = 3.4 / 2.0 = 1.7
        let outcome = select(
            &[against],
            &state(MarketRegime::TrendingUp, 0.8),
            &thresholds(),
            &ScorerCfg::default(),
        );
        assert!(outcome.winner.is_none());
    }

    #[test]
    fn degenerate_levels_become_defects_not_aborts() {
        let mut broken = candidate("breakout", 0.7);
        broken.stop_loss = broken.entry_price; // zero risk distance
        let healthy = candidate("momentum", 0.7);
        let outcome = select(
            &[broken, healthy],
            &state(MarketRegime::TrendingUp, 0.8),
            &thresholds(),
            &ScorerCfg::default(),
        );
        assert_eq!(outcome.defects.len(), 1);
        let winner = outcome.winner.expect("healthy candidate should survive");
        assert_eq!(winner.strategy, "momentum");
    }

    #[test]
    fn ties_resolve_to_registry_order() {
        let first = candidate("momentum", 0.7);
        let second = candidate("breakout", 0.7);
        let outcome = select(
            &[first, second],
            &state(MarketRegime::TrendingUp, 0.8),
            &thresholds(),
            &ScorerCfg::default(),
        );
        assert_eq!(outcome.winner.unwrap().strategy, "momentum");
    }

    #[test]
    fn higher_score_wins_regardless_of_order() {
        let weak = candidate("momentum", 0.45);
        let strong = candidate("breakout", 0.95);
        let outcome = select(
            &[weak, strong],
            &state(MarketRegime::TrendingUp, 0.8),
            &thresholds(),
            &ScorerCfg::default(),
        );
        assert_eq!(outcome.winner.unwrap().strategy, "breakout");
    }

    #[test]
    fn expiry_follows_holding_duration() {
        let c = candidate("momentum", 0.7);
        let created = c.created_at;
        let outcome = select(
            &[c],
            &state(MarketRegime::TrendingUp, 0.8),
            &thresholds(),
            &ScorerCfg::default(),
        );
        let winner = outcome.winner.unwrap();
        assert_eq!(winner.expires_at, created + Duration::seconds(3600));
    }
}
