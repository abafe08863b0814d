// Per-instrument async worker: fetch, run the pipeline, sleep, repeat.
// Cooperative shutdown is checked before the fetch and during the sleep so a
// stop request never interrupts a half-finished history update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{EngineCfg, TelemetryCfg};
use crate::engine::InstrumentEngine;
use crate::entropy::EntropySource;
use crate::error::EngineError;
use crate::pool::SignalPool;
use crate::rate_limiter::RateLimiter;
use crate::telemetry::MarketDataSource;

const SHUTDOWN_POLL: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Everything a worker shares with the rest of the process.
pub struct WorkerContext {
    pub source: Arc<dyn MarketDataSource>,
    pub pool: Arc<RwLock<SignalPool>>,
    pub limiter: Arc<RateLimiter>,
    pub shutdown: Arc<AtomicBool>,
    pub entropy: Arc<Mutex<Box<dyn EntropySource>>>,
}

/// Drive one instrument until shutdown. The engine is owned by this task, so
/// cycles for the instrument are strictly sequential.
pub async fn run_instrument_worker(mut engine: InstrumentEngine, cfg: EngineCfg, ctx: WorkerContext) {
    let instrument = engine.instrument().to_string();
    info!(instrument = %instrument, "worker started");
    let mut backoff = Duration::from_secs(1);

    while !ctx.shutdown.load(Ordering::Relaxed) {
        ctx.limiter.wait_if_needed().await;
        if ctx.shutdown.load(Ordering::Relaxed) {
            break;
        }

        let fetched = timeout(fetch_budget(&cfg.telemetry), ctx.source.snapshot(&instrument)).await;

        match fetched {
            Err(_elapsed) => {
                // Stale or partial data is never substituted; the cycle is
                // skipped outright.
                warn!(instrument = %instrument, "telemetry fetch timed out, skipping cycle");
            }
            Ok(Err(EngineError::RateLimited { retry_after })) => {
                let wait = retry_after.unwrap_or(backoff).min(MAX_BACKOFF);
                warn!(
                    instrument = %instrument,
                    wait_secs = wait.as_secs(),
                    "telemetry source throttled, backing off"
                );
                sleep_interruptible(wait, &ctx.shutdown).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
            Ok(Err(err)) if err.is_data_unavailable() => {
                debug!(instrument = %instrument, error = %err, "no usable telemetry this cycle");
            }
            Ok(Err(err)) => {
                error!(instrument = %instrument, error = %err, "telemetry fetch failed");
            }
            Ok(Ok(snapshot)) => {
                backoff = Duration::from_secs(1);
                let now = Utc::now();
                let mut pool = ctx.pool.write().await;
                match engine.run_cycle(&snapshot, &mut pool, now) {
                    Ok(outcome) => {
                        if let Some(signal) = &outcome.emitted {
                            info!(
                                instrument = %instrument,
                                strategy = signal.strategy,
                                direction = ?signal.direction,
                                score = signal.precision_score,
                                entry = signal.entry_price,
                                "signal emitted"
                            );
                        }
                    }
                    Err(err) if err.is_data_unavailable() => {
                        debug!(instrument = %instrument, error = %err, "cycle skipped");
                    }
                    Err(err) => {
                        warn!(instrument = %instrument, error = %err, "cycle failed");
                    }
                }
            }
        }

        let interval = jittered_interval(&cfg, &ctx);
        sleep_interruptible(interval, &ctx.shutdown).await;
    }

    info!(instrument = %instrument, "worker stopped");
}

/// Outer deadline for one snapshot call. The source itself bounds each HTTP
/// attempt with `fetch_timeout_secs` and may retry transient failures, so
/// the whole-call budget must cover every attempt plus the inter-attempt
/// backoff, with one extra second per attempt as margin.
fn fetch_budget(cfg: &TelemetryCfg) -> Duration {
    let attempts = cfg.max_retries as u64 + 1;
    Duration::from_secs(cfg.fetch_timeout_secs * attempts + attempts)
}

/// Poll interval with a bounded jitter so instrument workers drift apart
/// instead of hitting the telemetry source in lockstep.
fn jittered_interval(cfg: &EngineCfg, ctx: &WorkerContext) -> Duration {
    let base = cfg.poll_interval_secs as f64;
    let jitter = match ctx.entropy.lock() {
        Ok(mut entropy) => entropy.jitter(),
        Err(poisoned) => poisoned.into_inner().jitter(),
    };
    let secs = base * (1.0 + cfg.jitter_fraction * jitter);
    Duration::from_secs_f64(secs.max(1.0))
}

/// Sleep in short slices so shutdown is honored promptly.
async fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let slice = remaining.min(SHUTDOWN_POLL);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
}
