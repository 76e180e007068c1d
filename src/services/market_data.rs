use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::{Instrument, PriceSeries, Quote, Result};

/// Lookback window for historical bars, in the gateway's duration syntax
/// (`"2y"`, `"6m"`, `"30d"`) and bar size (`"1d"`, `"1h"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryWindow {
    pub period: String,
    pub bar: String,
}

impl HistoryWindow {
    pub fn new<P: Into<String>, B: Into<String>>(period: P, bar: B) -> Self {
        Self {
            period: period.into(),
            bar: bar.into(),
        }
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new("2y", "1d")
    }
}

// Object-safe so callers can hold `&dyn MarketDataProvider`.
pub trait MarketDataProvider: Send + Sync {
    fn history<'a>(
        &'a self,
        instrument: &'a Instrument,
        window: &'a HistoryWindow,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries>> + Send + 'a>>;

    fn snapshot<'a>(&'a self, conids: &'a [i64]) -> Pin<Box<dyn Future<Output = Result<Vec<Quote>>> + Send + 'a>>;
}

/// Fetches one series per instrument, in order, one request at a time.
pub async fn fetch_price_histories(
    provider: &dyn MarketDataProvider,
    instruments: &[Instrument],
    window: &HistoryWindow,
) -> Result<Vec<PriceSeries>> {
    let mut series = Vec::with_capacity(instruments.len());
    for instrument in instruments {
        let s = provider.history(instrument, window).await?;
        info!(
            symbol = %instrument.symbol,
            conid = instrument.conid,
            bars = s.len(),
            "fetched price history"
        );
        series.push(s);
    }
    Ok(series)
}
