// Shared fixtures for integration tests: synthetic telemetry windows and an
// in-memory market-data source.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use signal_engine::error::{EngineError, Result};
use signal_engine::telemetry::MarketDataSource;
use signal_engine::types::{Observation, TelemetrySnapshot};

/// Builder for synthetic observation windows.
pub struct WindowBuilder {
    observations: Vec<Observation>,
    cursor: f64,
}

impl WindowBuilder {
    pub fn new(start_price: f64) -> Self {
        Self {
            observations: Vec::new(),
            cursor: start_price,
        }
    }

    /// Append `count` flat bars at the current price.
    pub fn flat(mut self, count: usize, volume: f64) -> Self {
        for _ in 0..count {
            let price = self.cursor;
            self.push(price, price, volume);
        }
        self
    }

    /// Append one bar moving the close by `change_fraction` with the given
    /// volume.
    pub fn bar(mut self, change_fraction: f64, volume: f64) -> Self {
        let open = self.cursor;
        let close = open * (1.0 + change_fraction);
        self.push(open, close, volume);
        self.cursor = close;
        self
    }

    fn push(&mut self, open: f64, close: f64, volume: f64) {
        let i = self.observations.len() as i64;
        let start = Utc::now() - Duration::minutes(200);
        self.observations.push(Observation {
            open_time: start + Duration::minutes(i),
            close_time: start + Duration::minutes(i + 1),
            open,
            high: open.max(close) * 1.001,
            low: open.min(close) * 0.999,
            close,
            volume,
        });
    }

    pub fn snapshot(self, instrument: &str) -> TelemetrySnapshot {
        let last = self.observations.last().map(|o| o.close).unwrap_or(self.cursor);
        TelemetrySnapshot {
            instrument: instrument.to_string(),
            observations: self.observations,
            best_bid: last * 0.9999,
            best_ask: last * 1.0001,
            best_bid_qty: 10.0,
            best_ask_qty: 10.0,
            fetched_at: Utc::now(),
        }
    }
}

/// Serves queued snapshots per instrument; empty queues report
/// DataUnavailable like a real source with no telemetry.
pub struct InMemorySource {
    queues: Mutex<HashMap<String, Vec<TelemetrySnapshot>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, snapshot: TelemetrySnapshot) {
        let mut queues = self.queues.lock().unwrap();
        queues
            .entry(snapshot.instrument.clone())
            .or_default()
            .push(snapshot);
    }
}

#[async_trait]
impl MarketDataSource for InMemorySource {
    async fn snapshot(&self, instrument: &str) -> Result<TelemetrySnapshot> {
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(instrument) {
            Some(queue) if !queue.is_empty() => Ok(queue.remove(0)),
            _ => Err(EngineError::unavailable(instrument, "queue exhausted")),
        }
    }
}
