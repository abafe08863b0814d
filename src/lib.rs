// Adaptive trading-signal engine.
//
// Five stages run per instrument per cycle: market-state estimation, dynamic
// threshold derivation, multi-strategy candidate generation, precision
// scoring/selection, and cross-window deduplication into the signal pool.
// Instruments are fully independent; workers share only the rate limiter,
// the entropy source, the shutdown flag and the pool.

pub mod config;
pub mod dedup;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod indicators;
pub mod market_state;
pub mod pool;
pub mod rate_limiter;
pub mod scorer;
pub mod strategies;
pub mod telemetry;
pub mod thresholds;
pub mod types;
pub mod worker;

pub use config::EngineCfg;
pub use engine::{CycleOutcome, InstrumentEngine};
pub use error::{EngineError, Result};
pub use pool::{PoolDecision, SignalPool};
pub use types::{
    Direction, DynamicThresholds, MarketRegime, MarketState, PrecisionSignal, SignalCandidate,
    TelemetrySnapshot,
};
