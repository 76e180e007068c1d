use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PriceSeries, Result, ToolkitError};

/// Period-over-period simple returns: one row per period, one column per instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMatrix {
    symbols: Vec<String>,
    values: DMatrix<f64>,
}

impl ReturnMatrix {
    pub fn new(symbols: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        if values.ncols() != symbols.len() {
            return Err(ToolkitError::Data(format!(
                "return matrix has {} columns but {} symbols",
                values.ncols(),
                symbols.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ToolkitError::Input(format!("non-finite return value {}", bad)));
        }
        Ok(Self { symbols, values })
    }

    /// Builds the matrix from one return column per symbol.
    pub fn from_columns(symbols: Vec<String>, columns: &[Vec<f64>]) -> Result<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != rows) {
            return Err(ToolkitError::Data("Inconsistent number of observations".to_string()));
        }
        let values = DMatrix::from_fn(rows, columns.len(), |r, c| columns[c][r]);
        Self::new(symbols, values)
    }

    /// Aligns the series on the calendar dates they all share and derives
    /// returns between consecutive shared dates. When a series has several
    /// points on one date the latest one is used.
    pub fn from_series(series: &[PriceSeries]) -> Result<Self> {
        if series.is_empty() {
            return Err(ToolkitError::Data("no price series supplied".to_string()));
        }

        let by_date: Vec<BTreeMap<NaiveDate, f64>> = series
            .iter()
            .map(|s| {
                s.points
                    .iter()
                    .map(|p| (p.timestamp.date_naive(), p.price))
                    .collect()
            })
            .collect();

        let mut common: BTreeSet<NaiveDate> = by_date[0].keys().copied().collect();
        for prices in &by_date[1..] {
            common.retain(|d| prices.contains_key(d));
        }
        let dates: Vec<NaiveDate> = common.into_iter().collect();
        debug!(
            series = series.len(),
            common_dates = dates.len(),
            "aligned price series"
        );

        for (s, prices) in series.iter().zip(&by_date) {
            for date in &dates {
                let price = prices[date];
                if !price.is_finite() || price <= 0.0 {
                    return Err(ToolkitError::Input(format!(
                        "{} has a non-positive price {} on {}",
                        s.symbol, price, date
                    )));
                }
            }
        }

        let periods = dates.len().saturating_sub(1);
        if periods < 2 {
            return Err(ToolkitError::Data(format!(
                "need at least 2 return observations, got {} from {} common dates",
                periods,
                dates.len()
            )));
        }

        let values = DMatrix::from_fn(periods, series.len(), |r, c| {
            let prev = by_date[c][&dates[r]];
            let next = by_date[c][&dates[r + 1]];
            next / prev - 1.0
        });
        let symbols = series.iter().map(|s| s.symbol.clone()).collect();
        Self::new(symbols, values)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn periods(&self) -> usize {
        self.values.nrows()
    }

    pub fn assets(&self) -> usize {
        self.values.ncols()
    }
}
