// Stage 3: Candidate Generation
// Each strategy independently proposes at most one candidate per cycle.
// Strategies never fail the cycle; missing data means no proposal.

mod breakout;
mod momentum;
mod reversal;
mod volume_surge;

pub use breakout::BreakoutStrategy;
pub use momentum::MomentumStrategy;
pub use reversal::ReversalStrategy;
pub use volume_surge::VolumeSurgeStrategy;

use crate::types::{DynamicThresholds, MarketState, SignalCandidate, TelemetrySnapshot};

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Examine the current snapshot under the cycle's thresholds and either
    /// propose one candidate or stand aside.
    fn evaluate(
        &self,
        snapshot: &TelemetrySnapshot,
        state: &MarketState,
        thresholds: &DynamicThresholds,
    ) -> Option<SignalCandidate>;
}

/// The built-in strategy set. Declaration order is the scorer's tie-break
/// order, so it must stay stable.
pub fn default_registry() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(MomentumStrategy),
        Box::new(BreakoutStrategy),
        Box::new(ReversalStrategy),
        Box::new(VolumeSurgeStrategy),
    ]
}

/// Run every registered strategy against the snapshot, in registry order.
pub fn generate_candidates(
    registry: &[Box<dyn Strategy>],
    snapshot: &TelemetrySnapshot,
    state: &MarketState,
    thresholds: &DynamicThresholds,
) -> Vec<SignalCandidate> {
    let mut candidates = Vec::new();
    for strategy in registry {
        if let Some(candidate) = strategy.evaluate(snapshot, state, thresholds) {
            tracing::debug!(
                instrument = %candidate.instrument,
                strategy = strategy.name(),
                direction = ?candidate.direction,
                confidence = candidate.confidence,
                "strategy proposed candidate"
            );
            candidates.push(candidate);
        }
    }
    candidates
}
