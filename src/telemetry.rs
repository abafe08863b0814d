// Market-data boundary: the GetSnapshot collaborator
// The engine never fabricates telemetry; anything short or stale surfaces
// as DataUnavailable and the cycle is skipped.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::TelemetryCfg;
use crate::error::{EngineError, Result};
use crate::types::{Observation, TelemetrySnapshot};

/// Boundary trait for the external market-data collaborator.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn snapshot(&self, instrument: &str) -> Result<TelemetrySnapshot>;
}

// ============================================================================
// HTTP implementation (Binance-style REST surface)
// ============================================================================

pub struct HttpMarketData {
    http: Client,
    base_url: Url,
    interval: String,
    window_size: u32,
    min_observations: usize,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "bidQty")]
    bid_qty: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
    #[serde(rename = "askQty")]
    ask_qty: String,
}

impl HttpMarketData {
    pub fn new(cfg: &TelemetryCfg, min_observations: usize) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()?;
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| EngineError::Config(format!("invalid telemetry base_url: {e}")))?;

        Ok(Self {
            http,
            base_url,
            interval: cfg.snapshot_interval.clone(),
            window_size: cfg.window_size,
            min_observations,
            max_retries: cfg.max_retries,
        })
    }

    fn map_status(instrument: &str, status: StatusCode) -> EngineError {
        // Binance signals throttling with 429 and IP bans with 418
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            EngineError::RateLimited { retry_after: None }
        } else {
            EngineError::unavailable(instrument, format!("telemetry HTTP status {status}"))
        }
    }

    async fn fetch_klines(&self, instrument: &str) -> Result<Vec<Observation>> {
        let mut url = self
            .base_url
            .join("/fapi/v1/klines")
            .map_err(|e| EngineError::Config(format!("invalid klines url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("symbol", instrument)
            .append_pair("interval", &self.interval)
            .append_pair("limit", &self.window_size.to_string());

        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            return Err(Self::map_status(instrument, res.status()));
        }

        let raw: Vec<serde_json::Value> = res.json().await?;
        let observations: Vec<Observation> = raw
            .into_iter()
            .filter_map(|row| {
                let row = row.as_array()?;
                if row.len() < 7 {
                    return None;
                }
                Some(Observation {
                    open_time: ts_ms_to_utc(row[0].as_i64()?),
                    close_time: ts_ms_to_utc(row[6].as_i64()?),
                    open: row[1].as_str()?.parse().ok()?,
                    high: row[2].as_str()?.parse().ok()?,
                    low: row[3].as_str()?.parse().ok()?,
                    close: row[4].as_str()?.parse().ok()?,
                    volume: row[5].as_str()?.parse().ok()?,
                })
            })
            .collect();

        Ok(observations)
    }

    async fn fetch_book_ticker(&self, instrument: &str) -> Result<BookTicker> {
        let mut url = self
            .base_url
            .join("/fapi/v1/ticker/bookTicker")
            .map_err(|e| EngineError::Config(format!("invalid bookTicker url: {e}")))?;
        url.query_pairs_mut().append_pair("symbol", instrument);

        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            return Err(Self::map_status(instrument, res.status()));
        }
        Ok(res.json().await?)
    }

    async fn snapshot_once(&self, instrument: &str) -> Result<TelemetrySnapshot> {
        let observations = self.fetch_klines(instrument).await?;
        if observations.len() < self.min_observations {
            return Err(EngineError::unavailable(
                instrument,
                format!(
                    "only {} observations, need {}",
                    observations.len(),
                    self.min_observations
                ),
            ));
        }

        let book = self.fetch_book_ticker(instrument).await?;
        let best_bid: f64 = book.bid_price.parse().map_err(|_| {
            EngineError::unavailable(instrument, "unparseable best bid")
        })?;
        let best_ask: f64 = book.ask_price.parse().map_err(|_| {
            EngineError::unavailable(instrument, "unparseable best ask")
        })?;
        if best_bid <= 0.0 || best_ask <= 0.0 || best_ask < best_bid {
            return Err(EngineError::unavailable(instrument, "degenerate book"));
        }

        Ok(TelemetrySnapshot {
            instrument: instrument.to_string(),
            observations,
            best_bid,
            best_ask,
            best_bid_qty: book.bid_qty.parse().unwrap_or(0.0),
            best_ask_qty: book.ask_qty.parse().unwrap_or(0.0),
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketData {
    /// Fetch one snapshot with bounded retry on transient network errors.
    /// Rate limiting and short windows are not retried here; the worker
    /// owns that policy.
    async fn snapshot(&self, instrument: &str) -> Result<TelemetrySnapshot> {
        let mut attempt = 0u32;
        loop {
            match self.snapshot_once(instrument).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(EngineError::Http(e)) if attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(250 * 2u64.pow(attempt));
                    debug!(
                        instrument = %instrument,
                        attempt,
                        error = %e,
                        "transient telemetry error, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(EngineError::Http(e)) => {
                    warn!(instrument = %instrument, error = %e, "telemetry fetch failed after retries");
                    return Err(EngineError::unavailable(
                        instrument,
                        format!("network failure: {e}"),
                    ));
                }
                Err(other) => return Err(other),
            }
        }
    }
}

fn ts_ms_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}
