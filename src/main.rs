use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use signal_engine::config;
use signal_engine::engine::InstrumentEngine;
use signal_engine::entropy::{EntropySource, SystemEntropy};
use signal_engine::pool::SignalPool;
use signal_engine::rate_limiter::RateLimiter;
use signal_engine::telemetry::HttpMarketData;
use signal_engine::worker::{self, WorkerContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load_config().context("failed to load configuration")?;
    info!(
        instruments = cfg.instruments.len(),
        poll_interval_secs = cfg.poll_interval_secs,
        "starting signal engine"
    );

    let source = Arc::new(
        HttpMarketData::new(&cfg.telemetry, cfg.estimator.min_observations)
            .context("failed to build telemetry client")?,
    );
    let pool = Arc::new(RwLock::new(SignalPool::new()));
    let limiter = Arc::new(RateLimiter::new(cfg.telemetry.max_requests_per_sec));
    let shutdown = Arc::new(AtomicBool::new(false));
    let entropy: Arc<Mutex<Box<dyn EntropySource>>> =
        Arc::new(Mutex::new(Box::new(SystemEntropy)));

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for instrument in &cfg.instruments {
        let engine = InstrumentEngine::new(instrument, cfg.clone());
        let ctx = WorkerContext {
            source: source.clone(),
            pool: pool.clone(),
            limiter: limiter.clone(),
            shutdown: shutdown.clone(),
            entropy: entropy.clone(),
        };
        handles.push(tokio::spawn(worker::run_instrument_worker(
            engine,
            cfg.clone(),
            ctx,
        )));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested, stopping workers");
    shutdown.store(true, Ordering::Relaxed);

    for handle in handles {
        if let Err(err) = handle.await {
            error!(error = %err, "worker task panicked");
        }
    }

    let final_pool = pool.read().await;
    let active = final_pool.snapshot(chrono::Utc::now());
    info!(active_signals = active.len(), "signal engine stopped");
    Ok(())
}
