use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{de_conid, de_opt_number, GatewayClient};
use crate::services::market_data::{HistoryWindow, MarketDataProvider};
use crate::{Instrument, PricePoint, PriceSeries, Quote, Result, ToolkitError};

/// Snapshot field ids: last, symbol, bid, bid size, ask, ask size, volume.
pub const SNAPSHOT_FIELDS: &str = "31,55,84,85,86,88,7059";

/// History windows tried, in order, when the snapshot has no last price.
const LATEST_PRICE_FALLBACKS: [(&str, &str); 3] = [("1d", "1d"), ("5d", "1d"), ("1w", "1d")];

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    data: Option<Vec<HistoryBar>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct HistoryBar {
    #[serde(default)]
    t: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    c: Option<f64>,
}

#[derive(Deserialize)]
struct SnapshotEntry {
    #[serde(deserialize_with = "de_conid")]
    conid: i64,
    #[serde(rename = "55", default)]
    symbol: Option<String>,
    #[serde(rename = "31", default, deserialize_with = "de_opt_number")]
    last: Option<f64>,
    #[serde(rename = "84", default, deserialize_with = "de_opt_number")]
    bid: Option<f64>,
    #[serde(rename = "85", default, deserialize_with = "de_opt_number")]
    bid_size: Option<f64>,
    #[serde(rename = "86", default, deserialize_with = "de_opt_number")]
    ask: Option<f64>,
    #[serde(rename = "88", default, deserialize_with = "de_opt_number")]
    ask_size: Option<f64>,
    #[serde(rename = "7059", default, deserialize_with = "de_opt_number")]
    volume: Option<f64>,
}

impl From<SnapshotEntry> for Quote {
    fn from(e: SnapshotEntry) -> Self {
        Quote {
            conid: e.conid,
            symbol: e.symbol,
            last: e.last,
            bid: e.bid,
            ask: e.ask,
            bid_size: e.bid_size,
            ask_size: e.ask_size,
            volume: e.volume,
        }
    }
}

impl GatewayClient {
    /// Historical bars for one instrument; each bar's close becomes a price point.
    pub async fn price_history(&self, instrument: &Instrument, window: &HistoryWindow) -> Result<PriceSeries> {
        let endpoint = "iserver/marketdata/history";
        let resp: HistoryResponse = self
            .get_json(
                endpoint,
                &[
                    ("conid", instrument.conid.to_string()),
                    ("period", window.period.clone()),
                    ("bar", window.bar.clone()),
                    ("outsideRth", "true".to_string()),
                ],
            )
            .await?;

        let bars = match resp.data {
            Some(bars) => bars,
            None => {
                return Err(ToolkitError::Response(format!(
                    "{}: no data for {} (conid {}){}",
                    endpoint,
                    instrument.symbol,
                    instrument.conid,
                    resp.error.map(|e| format!(": {}", e)).unwrap_or_default()
                )))
            }
        };
        if let Some(returned) = resp.symbol.as_deref() {
            if returned != instrument.symbol {
                debug!(configured = %instrument.symbol, returned, "gateway reports a different symbol");
            }
        }

        let mut points = Vec::with_capacity(bars.len());
        for (i, bar) in bars.into_iter().enumerate() {
            let (t, price) = match (bar.t, bar.c) {
                (Some(t), Some(c)) => (t, c),
                _ => {
                    return Err(ToolkitError::Response(format!(
                        "{}: bar {} for {} lacks a timestamp or close",
                        endpoint, i, instrument.symbol
                    )))
                }
            };
            let timestamp = Utc.timestamp_millis_opt(t).single().ok_or_else(|| {
                ToolkitError::Response(format!("{}: invalid bar timestamp {}", endpoint, t))
            })?;
            points.push(PricePoint { timestamp, price });
        }
        if points.is_empty() {
            warn!(symbol = %instrument.symbol, "gateway returned no bars");
        }

        Ok(PriceSeries::new(instrument.symbol.clone(), instrument.conid, points))
    }

    /// One snapshot request. The gateway answers the first request for a
    /// contract with little more than the conid; see [`Self::snapshot_with_preflight`].
    pub async fn market_snapshot(&self, conids: &[i64]) -> Result<Vec<Quote>> {
        if conids.is_empty() {
            return Err(ToolkitError::Input("snapshot needs at least one conid".to_string()));
        }
        let joined = conids.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",");
        let entries: Vec<SnapshotEntry> = self
            .get_json(
                "iserver/marketdata/snapshot",
                &[("conids", joined), ("fields", SNAPSHOT_FIELDS.to_string())],
            )
            .await?;
        Ok(entries.into_iter().map(Quote::from).collect())
    }

    /// Issues a preflight snapshot to start the gateway's data stream, waits
    /// `settle`, then requests the snapshot that carries the fields.
    pub async fn snapshot_with_preflight(&self, conids: &[i64], settle: Duration) -> Result<Vec<Quote>> {
        let preflight = self.market_snapshot(conids).await?;
        debug!(entries = preflight.len(), "snapshot preflight done");
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        self.market_snapshot(conids).await
    }

    /// Last traded price from the snapshot, falling back to the latest
    /// historical close over progressively longer windows.
    pub async fn latest_price(&self, instrument: &Instrument) -> Result<Option<f64>> {
        let quotes = self.market_snapshot(&[instrument.conid]).await?;
        if let Some(last) = quotes
            .iter()
            .find(|q| q.conid == instrument.conid)
            .and_then(|q| q.last)
        {
            return Ok(Some(last));
        }

        debug!(symbol = %instrument.symbol, "snapshot has no last price, trying history");
        for (period, bar) in LATEST_PRICE_FALLBACKS {
            match self.price_history(instrument, &HistoryWindow::new(period, bar)).await {
                Ok(series) => {
                    if let Some(point) = series.latest() {
                        return Ok(Some(point.price));
                    }
                }
                Err(ToolkitError::Response(msg)) => {
                    warn!(symbol = %instrument.symbol, period, "history fallback failed: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

impl MarketDataProvider for GatewayClient {
    fn history<'a>(
        &'a self,
        instrument: &'a Instrument,
        window: &'a HistoryWindow,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries>> + Send + 'a>> {
        Box::pin(self.price_history(instrument, window))
    }

    fn snapshot<'a>(&'a self, conids: &'a [i64]) -> Pin<Box<dyn Future<Output = Result<Vec<Quote>>> + Send + 'a>> {
        Box::pin(self.market_snapshot(conids))
    }
}
