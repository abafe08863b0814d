// Stage 2: Dynamic Threshold Calculator
// Pure, total, deterministic function of one MarketState. No side effects.

use crate::config::ThresholdCfg;
use crate::types::{DynamicThresholds, LookbackPeriods, MarketRegime, MarketState};

const CONFIDENCE_FLOOR_MIN: f64 = 0.15;
const CONFIDENCE_FLOOR_MAX: f64 = 0.40;
const STOP_LOSS_MIN: f64 = 0.01;
const STOP_LOSS_MAX: f64 = 0.05;
const TAKE_PROFIT_MIN: f64 = 0.02;
const TAKE_PROFIT_MAX: f64 = 0.08;

// Lookback presets keyed by regime: trend / counter-trend / high-volatility.
const LOOKBACKS_TREND: LookbackPeriods = LookbackPeriods {
    ma_fast: 9,
    ma_slow: 21,
    oscillator: 14,
    band: 20,
};
const LOOKBACKS_COUNTER_TREND: LookbackPeriods = LookbackPeriods {
    ma_fast: 5,
    ma_slow: 13,
    oscillator: 9,
    band: 14,
};
const LOOKBACKS_HIGH_VOLATILITY: LookbackPeriods = LookbackPeriods {
    ma_fast: 12,
    ma_slow: 26,
    oscillator: 21,
    band: 26,
};

/// Derive the cycle's operating parameters from the market state.
///
/// More activity (volatility, volume, liquidity) lowers the acceptance bar;
/// extreme sentiment lowers it further by a fixed offset. All outputs are
/// clamped to their documented invariant ranges.
pub fn derive(state: &MarketState, cfg: &ThresholdCfg) -> DynamicThresholds {
    // Activity in [0, 1] from the three normalized scores.
    let activity = (state.volatility_score / 3.0
        + state.volume_strength / 3.0
        + state.liquidity_score / 2.0)
        / 3.0;

    let mut confidence_floor =
        cfg.base_confidence_floor - activity * (CONFIDENCE_FLOOR_MAX - CONFIDENCE_FLOOR_MIN);
    if state.sentiment_index <= 20.0 || state.sentiment_index >= 80.0 {
        confidence_floor -= cfg.extreme_sentiment_offset;
    }
    let confidence_floor = confidence_floor.clamp(CONFIDENCE_FLOOR_MIN, CONFIDENCE_FLOOR_MAX);

    // Bounds widen toward 20/80 with volume strength, narrow toward 30/70
    // otherwise.
    let widen = (state.volume_strength / 3.0).clamp(0.0, 1.0);
    let oscillator_low = 30.0 - 10.0 * widen;
    let oscillator_high = 70.0 + 10.0 * widen;

    let volatility_multiplier = 0.5 + state.volatility_score / 2.0;
    let liquidity_multiplier = 1.25 - state.liquidity_score / 4.0;
    let stop_loss_fraction = (cfg.base_stop_fraction * volatility_multiplier * liquidity_multiplier)
        .clamp(STOP_LOSS_MIN, STOP_LOSS_MAX);

    let volume_multiplier = 0.75 + state.volume_strength / 4.0;
    let sentiment_multiplier = 0.8 + 0.4 * (state.sentiment_index / 100.0);
    let take_profit_fraction =
        (cfg.base_target_fraction * volume_multiplier * sentiment_multiplier)
            .clamp(TAKE_PROFIT_MIN, TAKE_PROFIT_MAX);

    let lookbacks = match state.regime {
        MarketRegime::TrendingUp | MarketRegime::TrendingDown => LOOKBACKS_TREND,
        MarketRegime::Sideways => LOOKBACKS_COUNTER_TREND,
        MarketRegime::Volatile => LOOKBACKS_HIGH_VOLATILITY,
    };

    let position_size_multiplier = match state.regime {
        MarketRegime::Volatile => 0.5,
        MarketRegime::TrendingUp | MarketRegime::TrendingDown
            if state.regime_confidence >= 0.6 && state.trend_alignment >= 0.6 =>
        {
            1.25
        }
        _ => 1.0,
    };

    let holding_duration_secs = match state.regime {
        MarketRegime::Volatile => 900,
        MarketRegime::TrendingUp | MarketRegime::TrendingDown => 3600,
        MarketRegime::Sideways => 1800,
    };

    DynamicThresholds {
        confidence_floor,
        oscillator_low,
        oscillator_high,
        stop_loss_fraction,
        take_profit_fraction,
        lookbacks,
        position_size_multiplier,
        holding_duration_secs,
    }
}
