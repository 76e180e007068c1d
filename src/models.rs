use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tradable instrument: ticker symbol plus the broker's contract id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub conid: i64,
}

impl Instrument {
    pub fn new<S: Into<String>>(symbol: S, conid: i64) -> Self {
        Self {
            symbol: symbol.into(),
            conid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Closing prices for one instrument, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub conid: i64,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new<S: Into<String>>(symbol: S, conid: i64, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self {
            symbol: symbol.into(),
            conid,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// Risk-parity weights and the risk contributions they produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub symbols: Vec<String>,
    pub weights: Vec<f64>,
    pub risk_contributions: Vec<f64>,
    pub iterations: usize,
    pub objective: f64,
}

impl Allocation {
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Top-of-book snapshot for one contract. Fields the gateway has not
/// populated yet are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub conid: i64,
    pub symbol: Option<String>,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMatch {
    pub conid: i64,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sec_type: Option<String>,
    pub listing_exchange: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub conid: i64,
    pub description: Option<String>,
    pub position: f64,
    pub market_price: Option<f64>,
    pub market_value: Option<f64>,
    pub currency: Option<String>,
}

impl Position {
    /// Market value as reported, or quantity times price when only the price is known.
    pub fn value(&self) -> Option<f64> {
        self.market_value
            .or_else(|| self.market_price.map(|p| p * self.position))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub connected: bool,
    pub competing: bool,
}
