// Configuration structures and loading logic
// Every tunable is an explicit config value passed in at construction time,
// never read from ambient global state by the pipeline stages.

use anyhow::{anyhow, Result};
use serde::Deserialize;

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryCfg {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Kline interval requested from the collaborator (e.g. "1m", "5m").
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: String,
    /// Observations requested per snapshot.
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    /// Per-request timeout; a fetch exceeding it counts as no data this cycle.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Bounded retries for transient network failures within one fetch.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_requests_per_sec")]
    pub max_requests_per_sec: u32,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            snapshot_interval: default_snapshot_interval(),
            window_size: default_window_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_max_retries(),
            max_requests_per_sec: default_max_requests_per_sec(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimatorCfg {
    /// Minimum observations required before a MarketState is computed.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_volume_period")]
    pub volume_period: usize,
    /// Lookback for the rate-of-change momentum feeding the sentiment index.
    #[serde(default = "default_momentum_period")]
    pub momentum_period: usize,
    /// ATR fraction considered "normal"; volatility score = atr_fraction
    /// divided by this, capped at 3.0.
    #[serde(default = "default_base_volatility")]
    pub base_volatility: f64,
    /// Spread fraction at which liquidity scores zero.
    #[serde(default = "default_spread_reference")]
    pub spread_reference: f64,
    /// ATR fraction above which the regime is forced to Volatile.
    #[serde(default = "default_high_volatility_cutoff")]
    pub high_volatility_cutoff: f64,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            atr_period: default_atr_period(),
            volume_period: default_volume_period(),
            momentum_period: default_momentum_period(),
            base_volatility: default_base_volatility(),
            spread_reference: default_spread_reference(),
            high_volatility_cutoff: default_high_volatility_cutoff(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdCfg {
    /// Upper end of the confidence floor range; activity lowers the floor
    /// from here down to the clamp minimum.
    #[serde(default = "default_base_confidence_floor")]
    pub base_confidence_floor: f64,
    /// Fixed offset subtracted when sentiment is extreme (<=20 or >=80).
    #[serde(default = "default_extreme_sentiment_offset")]
    pub extreme_sentiment_offset: f64,
    #[serde(default = "default_base_stop_fraction")]
    pub base_stop_fraction: f64,
    #[serde(default = "default_base_target_fraction")]
    pub base_target_fraction: f64,
}

impl Default for ThresholdCfg {
    fn default() -> Self {
        Self {
            base_confidence_floor: default_base_confidence_floor(),
            extreme_sentiment_offset: default_extreme_sentiment_offset(),
            base_stop_fraction: default_base_stop_fraction(),
            base_target_fraction: default_base_target_fraction(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScorerCfg {
    /// Baseline minimum risk/reward ratio.
    #[serde(default = "default_min_rr_baseline")]
    pub min_rr_baseline: f64,
    /// Raised minimum when the candidate trades against a trending regime.
    #[serde(default = "default_min_rr_counter_trend")]
    pub min_rr_counter_trend: f64,
    /// Lowered minimum when the candidate rides a confident trend.
    #[serde(default = "default_min_rr_strong_trend")]
    pub min_rr_strong_trend: f64,
    /// Regime confidence at or above which a trend counts as strong.
    #[serde(default = "default_strong_trend_confidence")]
    pub strong_trend_confidence: f64,
}

impl Default for ScorerCfg {
    fn default() -> Self {
        Self {
            min_rr_baseline: default_min_rr_baseline(),
            min_rr_counter_trend: default_min_rr_counter_trend(),
            min_rr_strong_trend: default_min_rr_strong_trend(),
            strong_trend_confidence: default_strong_trend_confidence(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupCfg {
    /// History entries older than this contribute zero similarity weight
    /// and are evicted.
    #[serde(default = "default_decay_window_secs")]
    pub decay_window_secs: i64,
    /// Bounded per-instrument history capacity; oldest evicted first.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Similarity at or above the active threshold suppresses the signal.
    #[serde(default = "default_base_similarity_threshold")]
    pub base_similarity_threshold: f64,
    /// ATR fraction above which the threshold is relaxed.
    #[serde(default = "default_dedup_high_volatility_cutoff")]
    pub high_volatility_cutoff: f64,
    /// Offset subtracted from the base threshold under high volatility.
    #[serde(default = "default_high_volatility_relaxation")]
    pub high_volatility_relaxation: f64,
    /// The relaxed threshold never drops below this floor.
    #[serde(default = "default_min_similarity_threshold")]
    pub min_similarity_threshold: f64,
    /// Price bucket width as a fraction of entry price.
    #[serde(default = "default_price_bucket_fraction")]
    pub price_bucket_fraction: f64,
}

impl Default for DedupCfg {
    fn default() -> Self {
        Self {
            decay_window_secs: default_decay_window_secs(),
            history_capacity: default_history_capacity(),
            base_similarity_threshold: default_base_similarity_threshold(),
            high_volatility_cutoff: default_dedup_high_volatility_cutoff(),
            high_volatility_relaxation: default_high_volatility_relaxation(),
            min_similarity_threshold: default_min_similarity_threshold(),
            price_bucket_fraction: default_price_bucket_fraction(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineCfg {
    #[serde(default)]
    pub instruments: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Poll jitter as a fraction of the interval, applied symmetrically.
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
    #[serde(default)]
    pub telemetry: TelemetryCfg,
    #[serde(default)]
    pub estimator: EstimatorCfg,
    #[serde(default)]
    pub thresholds: ThresholdCfg,
    #[serde(default)]
    pub scorer: ScorerCfg,
    #[serde(default)]
    pub dedup: DedupCfg,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            poll_interval_secs: default_poll_interval_secs(),
            jitter_fraction: default_jitter_fraction(),
            telemetry: TelemetryCfg::default(),
            estimator: EstimatorCfg::default(),
            thresholds: ThresholdCfg::default(),
            scorer: ScorerCfg::default(),
            dedup: DedupCfg::default(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_base_url() -> String {
    "https://fapi.binance.com".to_string()
}
fn default_snapshot_interval() -> String {
    "1m".to_string()
}
fn default_window_size() -> u32 {
    100
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    2
}
fn default_max_requests_per_sec() -> u32 {
    16
}
fn default_min_observations() -> usize {
    20
}
fn default_atr_period() -> usize {
    14
}
fn default_volume_period() -> usize {
    20
}
fn default_momentum_period() -> usize {
    10
}
fn default_base_volatility() -> f64 {
    0.02
}
fn default_spread_reference() -> f64 {
    0.002
}
fn default_high_volatility_cutoff() -> f64 {
    0.05
}
fn default_base_confidence_floor() -> f64 {
    0.40
}
fn default_extreme_sentiment_offset() -> f64 {
    0.03
}
fn default_base_stop_fraction() -> f64 {
    0.02
}
fn default_base_target_fraction() -> f64 {
    0.04
}
fn default_min_rr_baseline() -> f64 {
    1.5
}
fn default_min_rr_counter_trend() -> f64 {
    1.8
}
fn default_min_rr_strong_trend() -> f64 {
    1.3
}
fn default_strong_trend_confidence() -> f64 {
    0.6
}
fn default_decay_window_secs() -> i64 {
    7200
}
fn default_history_capacity() -> usize {
    50
}
fn default_base_similarity_threshold() -> f64 {
    0.65
}
fn default_dedup_high_volatility_cutoff() -> f64 {
    0.05
}
fn default_high_volatility_relaxation() -> f64 {
    0.15
}
fn default_min_similarity_threshold() -> f64 {
    0.30
}
fn default_price_bucket_fraction() -> f64 {
    0.005
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_jitter_fraction() -> f64 {
    0.1
}

// ============================================================================
// Loading & Validation
// ============================================================================

/// Load configuration from the path given by `--config <path>`, falling back
/// to `./config.yaml`.
pub fn load_config() -> Result<EngineCfg> {
    let args: Vec<String> = std::env::args().collect();
    let path = args
        .windows(2)
        .find_map(|w| {
            if w[0] == "--config" {
                Some(w[1].clone())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "./config.yaml".to_string());

    load_config_from(&path)
}

pub fn load_config_from(path: &str) -> Result<EngineCfg> {
    let content = std::fs::read_to_string(path)?;
    let cfg: EngineCfg = serde_yaml::from_str(&content)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Validate configuration values against the documented invariant ranges.
pub fn validate_config(cfg: &EngineCfg) -> Result<()> {
    if cfg.instruments.is_empty() {
        return Err(anyhow!("instruments list must not be empty"));
    }
    if cfg.poll_interval_secs == 0 {
        return Err(anyhow!("poll_interval_secs must be positive"));
    }
    if !(0.0..=0.5).contains(&cfg.jitter_fraction) {
        return Err(anyhow!(
            "jitter_fraction must be in [0.0, 0.5], got {}",
            cfg.jitter_fraction
        ));
    }
    if cfg.estimator.min_observations < 2 {
        return Err(anyhow!("estimator.min_observations must be at least 2"));
    }
    if (cfg.telemetry.window_size as usize) < cfg.estimator.min_observations {
        return Err(anyhow!(
            "telemetry.window_size ({}) is below estimator.min_observations ({})",
            cfg.telemetry.window_size,
            cfg.estimator.min_observations
        ));
    }
    if cfg.estimator.base_volatility <= 0.0 {
        return Err(anyhow!("estimator.base_volatility must be positive"));
    }
    if cfg.estimator.spread_reference <= 0.0 {
        return Err(anyhow!("estimator.spread_reference must be positive"));
    }
    if !(0.15..=0.40).contains(&cfg.thresholds.base_confidence_floor) {
        // The floor is clamped downstream as well; a base outside the
        // documented range is a misconfiguration, not something to clamp.
        return Err(anyhow!(
            "thresholds.base_confidence_floor must be in [0.15, 0.40], got {}",
            cfg.thresholds.base_confidence_floor
        ));
    }
    if cfg.scorer.min_rr_baseline <= 0.0 {
        return Err(anyhow!("scorer.min_rr_baseline must be positive"));
    }
    if cfg.dedup.decay_window_secs <= 0 {
        return Err(anyhow!("dedup.decay_window_secs must be positive"));
    }
    if cfg.dedup.history_capacity == 0 {
        return Err(anyhow!("dedup.history_capacity must be positive"));
    }
    if !(0.0..=1.0).contains(&cfg.dedup.base_similarity_threshold) {
        return Err(anyhow!(
            "dedup.base_similarity_threshold must be in [0.0, 1.0], got {}",
            cfg.dedup.base_similarity_threshold
        ));
    }
    if cfg.dedup.min_similarity_threshold > cfg.dedup.base_similarity_threshold {
        return Err(anyhow!(
            "dedup.min_similarity_threshold must not exceed the base threshold"
        ));
    }
    if cfg.telemetry.max_requests_per_sec == 0 {
        return Err(anyhow!("telemetry.max_requests_per_sec must be positive"));
    }
    Ok(())
}
