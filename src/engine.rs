// Per-instrument pipeline orchestration. One engine per instrument, owned by
// that instrument's worker; a cycle runs stages 1 through 5 in order and
// commits the history update before it returns.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineCfg;
use crate::dedup::SignalHistory;
use crate::error::{EngineError, Result};
use crate::market_state;
use crate::pool::{PoolDecision, SignalPool};
use crate::scorer;
use crate::strategies::{self, Strategy};
use crate::thresholds;
use crate::types::{DynamicThresholds, MarketState, PrecisionSignal, TelemetrySnapshot};

/// What one cycle produced. Absence of a signal is an expected outcome, not
/// an error.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// The signal that entered the pool this cycle, if any.
    pub emitted: Option<PrecisionSignal>,
    /// A winner was selected but discarded as a near-duplicate.
    pub suppressed: bool,
    pub pool_decision: Option<PoolDecision>,
    /// Per-candidate validation failures surfaced by the scorer.
    pub defects: Vec<EngineError>,
    pub candidate_count: usize,
}

pub struct InstrumentEngine {
    instrument: String,
    cfg: EngineCfg,
    registry: Vec<Box<dyn Strategy>>,
    history: SignalHistory,
    latest_state: Option<MarketState>,
    latest_thresholds: Option<DynamicThresholds>,
}

impl InstrumentEngine {
    pub fn new(instrument: &str, cfg: EngineCfg) -> Self {
        Self {
            instrument: instrument.to_string(),
            cfg,
            registry: strategies::default_registry(),
            history: SignalHistory::new(),
            latest_state: None,
            latest_thresholds: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Most recent successfully computed market state, for observers.
    pub fn latest_state(&self) -> Option<&MarketState> {
        self.latest_state.as_ref()
    }

    pub fn latest_thresholds(&self) -> Option<&DynamicThresholds> {
        self.latest_thresholds.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Run one full poll-compute-emit cycle against an already-fetched
    /// snapshot. Estimator failure aborts the cycle before any state is
    /// touched, so history and pool stay exactly as they were.
    pub fn run_cycle(
        &mut self,
        snapshot: &TelemetrySnapshot,
        pool: &mut SignalPool,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let state = market_state::estimate(snapshot, &self.cfg.estimator)?;
        let thresholds = thresholds::derive(&state, &self.cfg.thresholds);

        let candidates =
            strategies::generate_candidates(&self.registry, snapshot, &state, &thresholds);
        let mut outcome = CycleOutcome {
            candidate_count: candidates.len(),
            ..CycleOutcome::default()
        };

        let selection = scorer::select(&candidates, &state, &thresholds, &self.cfg.scorer);
        for defect in &selection.defects {
            warn!(instrument = %self.instrument, error = %defect, "candidate rejected as invalid");
        }
        outcome.defects = selection.defects;

        if let Some(signal) = selection.winner {
            let verdict =
                self.history
                    .check_and_record(&signal, state.atr_fraction, now, &self.cfg.dedup);
            if verdict.suppressed {
                pool.record_suppressed(&self.instrument, now);
                outcome.suppressed = true;
                info!(
                    instrument = %self.instrument,
                    strategy = signal.strategy,
                    similarity = verdict.similarity,
                    threshold = verdict.threshold,
                    "duplicate signal suppressed"
                );
            } else {
                let decision = pool.accept(signal.clone(), now);
                outcome.pool_decision = Some(decision);
                if decision != PoolDecision::KeptExisting {
                    outcome.emitted = Some(signal);
                }
            }
        } else {
            debug!(
                instrument = %self.instrument,
                candidates = outcome.candidate_count,
                "no signal this cycle"
            );
        }

        self.latest_state = Some(state);
        self.latest_thresholds = Some(thresholds);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use chrono::Duration;

    fn snapshot(closes: &[f64], volumes: &[f64], instrument: &str) -> TelemetrySnapshot {
        let start = Utc::now() - Duration::minutes(closes.len() as i64);
        let observations = closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| Observation {
                open_time: start + Duration::minutes(i as i64),
                close_time: start + Duration::minutes(i as i64 + 1),
                open: close * 0.999,
                high: close * 1.002,
                low: close * 0.997,
                close,
                volume,
            })
            .collect();
        let last = *closes.last().unwrap();
        TelemetrySnapshot {
            instrument: instrument.to_string(),
            observations,
            best_bid: last * 0.9999,
            best_ask: last * 1.0001,
            best_bid_qty: 10.0,
            best_ask_qty: 10.0,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn thin_window_aborts_without_touching_state() {
        let cfg = EngineCfg::default();
        let mut engine = InstrumentEngine::new("BTCUSDT", cfg);
        let mut pool = SignalPool::new();
        let thin = snapshot(&[100.0; 5], &[50.0; 5], "BTCUSDT");

        let err = engine
            .run_cycle(&thin, &mut pool, Utc::now())
            .expect_err("five observations are not enough");
        assert!(err.is_data_unavailable());
        assert!(engine.latest_state().is_none());
        assert_eq!(engine.history_len(), 0);
        assert!(pool.snapshot(Utc::now()).is_empty());
    }

    #[test]
    fn quiet_market_produces_no_signal_without_error() {
        let cfg = EngineCfg::default();
        let mut engine = InstrumentEngine::new("BTCUSDT", cfg);
        let mut pool = SignalPool::new();
        let flat = snapshot(&[100.0; 40], &[50.0; 40], "BTCUSDT");

        let outcome = engine
            .run_cycle(&flat, &mut pool, Utc::now())
            .expect("flat market is a valid cycle");
        assert!(outcome.emitted.is_none());
        assert!(!outcome.suppressed);
        assert!(engine.latest_state().is_some());
        assert!(engine.latest_thresholds().is_some());
    }
}
