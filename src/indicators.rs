// Batch indicator math over an observation window
// All functions return None instead of fabricating values when the window
// is too short.

use crate::types::Observation;

/// Simple moving average of closes over the last `period` observations.
pub fn sma_close(observations: &[Observation], period: usize) -> Option<f64> {
    if period == 0 || observations.len() < period {
        return None;
    }
    let sum: f64 = observations
        .iter()
        .rev()
        .take(period)
        .map(|o| o.close)
        .sum();
    Some(sum / period as f64)
}

/// Rolling mean volume over the last `period` observations.
pub fn mean_volume(observations: &[Observation], period: usize) -> Option<f64> {
    if period == 0 || observations.len() < period {
        return None;
    }
    let sum: f64 = observations
        .iter()
        .rev()
        .take(period)
        .map(|o| o.volume)
        .sum();
    Some(sum / period as f64)
}

/// True range for one period given the previous close.
fn true_range(prev_close: f64, obs: &Observation) -> f64 {
    let hl = obs.high - obs.low;
    let hc = (obs.high - prev_close).abs();
    let lc = (obs.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Average True Range: rolling mean of true range over `period`.
/// Needs `period + 1` observations for the previous-close reference.
pub fn atr(observations: &[Observation], period: usize) -> Option<f64> {
    if period == 0 || observations.len() < period + 1 {
        return None;
    }
    let tail = &observations[observations.len() - period - 1..];
    let mut sum = 0.0;
    for i in 1..tail.len() {
        sum += true_range(tail[i - 1].close, &tail[i]);
    }
    Some(sum / period as f64)
}

/// RSI over the last `period` close-to-close changes, [0, 100].
/// Clamped away from the exact extremes the way the live path does, so
/// downstream zone math never sees 0 or 100.
pub fn rsi(observations: &[Observation], period: usize) -> Option<f64> {
    if period == 0 || observations.len() < period + 1 {
        return None;
    }
    let tail = &observations[observations.len() - period - 1..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for i in 1..tail.len() {
        let change = tail[i].close - tail[i - 1].close;
        if change >= 0.0 {
            gain_sum += change;
        } else {
            loss_sum -= change;
        }
    }
    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;
    if avg_loss <= f64::EPSILON {
        return Some(if avg_gain <= f64::EPSILON { 50.0 } else { 99.9 });
    }
    let rs = avg_gain / avg_loss;
    let value = 100.0 - 100.0 / (1.0 + rs);
    Some(value.clamp(0.1, 99.9))
}

/// Population standard deviation of closes over the last `period`.
pub fn stddev_close(observations: &[Observation], period: usize) -> Option<f64> {
    if period == 0 || observations.len() < period {
        return None;
    }
    let closes: Vec<f64> = observations
        .iter()
        .rev()
        .take(period)
        .map(|o| o.close)
        .collect();
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;
    let variance =
        closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / closes.len() as f64;
    Some(variance.sqrt())
}

/// Rate of change of the close over `period` observations, as a fraction.
pub fn rate_of_change(observations: &[Observation], period: usize) -> Option<f64> {
    if period == 0 || observations.len() < period + 1 {
        return None;
    }
    let last = observations.last()?.close;
    let base = observations[observations.len() - 1 - period].close;
    if base <= 0.0 {
        return None;
    }
    Some((last - base) / base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(close: f64) -> Observation {
        Observation {
            open_time: Utc::now(),
            close_time: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    fn window(closes: &[f64]) -> Vec<Observation> {
        closes.iter().copied().map(obs).collect()
    }

    #[test]
    fn sma_uses_most_recent_closes() {
        let w = window(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(sma_close(&w, 2), Some(4.5));
        assert_eq!(sma_close(&w, 5), Some(3.0));
        assert_eq!(sma_close(&w, 6), None);
    }

    #[test]
    fn atr_of_flat_series_is_zero() {
        let w = window(&[10.0; 30]);
        assert_eq!(atr(&w, 14), Some(0.0));
    }

    #[test]
    fn atr_requires_period_plus_one() {
        let w = window(&[10.0; 14]);
        assert_eq!(atr(&w, 14), None);
    }

    #[test]
    fn rsi_is_high_after_straight_gains() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let w = window(&closes);
        let value = rsi(&w, 14).unwrap();
        assert!(value > 95.0);
    }

    #[test]
    fn rsi_of_flat_series_is_neutral() {
        let w = window(&[10.0; 30]);
        assert_eq!(rsi(&w, 14), Some(50.0));
    }

    #[test]
    fn rate_of_change_signs_follow_direction() {
        let up = window(&[100.0, 101.0, 102.0, 103.0]);
        assert!(rate_of_change(&up, 3).unwrap() > 0.0);
        let down = window(&[103.0, 102.0, 101.0, 100.0]);
        assert!(rate_of_change(&down, 3).unwrap() < 0.0);
    }
}
