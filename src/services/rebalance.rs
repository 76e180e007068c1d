use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Allocation, Instrument, Position, Result, ToolkitError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEntry {
    pub symbol: String,
    pub actual_pct: f64,
    pub target_pct: f64,
    /// `actual_pct - target_pct`.
    pub diff_pct: f64,
    /// Market value that would have to move to get back on target.
    pub dollar: f64,
    pub breached: bool,
}

impl DriftEntry {
    /// Trade side that would close the gap. Informational only.
    pub fn direction(&self) -> &'static str {
        if self.diff_pct < 0.0 {
            "BUY"
        } else {
            "SELL"
        }
    }
}

/// Current holdings compared with target weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub total_value: f64,
    pub threshold_pct: f64,
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    pub fn build(
        targets: &Allocation,
        instruments: &[Instrument],
        positions: &[Position],
        threshold_pct: f64,
    ) -> Result<Self> {
        let mut values = Vec::with_capacity(targets.symbols.len());
        for symbol in &targets.symbols {
            let instrument = instruments
                .iter()
                .find(|i| &i.symbol == symbol)
                .ok_or_else(|| ToolkitError::Data(format!("{} is not a configured instrument", symbol)))?;

            let value = match positions.iter().find(|p| p.conid == instrument.conid) {
                Some(p) if p.position == 0.0 => 0.0,
                Some(p) => p.value().ok_or_else(|| {
                    ToolkitError::Data(format!("no market value reported for {}", symbol))
                })?,
                None => 0.0,
            };
            values.push(value);
        }

        let total_value: f64 = values.iter().sum();
        if !(total_value > 0.0) {
            return Err(ToolkitError::Data(format!(
                "total portfolio value is {}; nothing to compare",
                total_value
            )));
        }

        let entries: Vec<DriftEntry> = targets
            .symbols
            .iter()
            .zip(&targets.weights)
            .zip(&values)
            .map(|((symbol, weight), value)| {
                let actual_pct = value / total_value * 100.0;
                let target_pct = weight * 100.0;
                let diff_pct = actual_pct - target_pct;
                DriftEntry {
                    symbol: symbol.clone(),
                    actual_pct,
                    target_pct,
                    diff_pct,
                    dollar: diff_pct / 100.0 * total_value,
                    breached: diff_pct.abs() > threshold_pct,
                }
            })
            .collect();

        let breaches = entries.iter().filter(|e| e.breached).count();
        if breaches > 0 {
            warn!(breaches, threshold_pct, "drift threshold breached");
        } else {
            info!(threshold_pct, "all positions within drift tolerance");
        }

        Ok(Self {
            total_value,
            threshold_pct,
            entries,
        })
    }

    pub fn breaches(&self) -> impl Iterator<Item = &DriftEntry> {
        self.entries.iter().filter(|e| e.breached)
    }
}
