//! Process-wide settings, read once from the environment at startup.
//!
//! Every binary builds a [`ToolkitConfig`] with [`ToolkitConfig::from_env`] and
//! hands the relevant pieces to the components that need them. Nothing in the
//! library reads the environment on its own.

use std::collections::HashSet;
use std::env;
use std::time::Duration;

use url::Url;

use crate::{Instrument, Result, ToolkitError};

pub const DEFAULT_HOST: &str = "https://localhost:5002";
pub const DEFAULT_CONIDS: &str = "AZN=4521593,B=780709675,IGLN=86656182,NVDA=4815747";
pub const DEFAULT_HISTORY_PERIOD: &str = "2y";
pub const DEFAULT_HISTORY_BAR: &str = "1d";
pub const DEFAULT_DRIFT_THRESHOLD_PCT: f64 = 5.0;

/// Settings scoped to the gateway HTTP client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
    /// The local gateway serves a self-signed certificate on loopback, so
    /// verification is off unless explicitly enabled.
    pub accept_invalid_certs: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            accept_invalid_certs: true,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }

    /// Parses `host` and applies the default timeouts.
    pub fn from_host(host: &str) -> Result<Self> {
        Ok(Self::new(parse_base_url(host)?))
    }
}

#[derive(Debug, Clone)]
pub struct ToolkitConfig {
    pub gateway: GatewayConfig,
    pub account_id: Option<String>,
    pub instruments: Vec<Instrument>,
    pub history_period: String,
    pub history_bar: String,
    pub drift_threshold_pct: f64,
}

impl ToolkitConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get("IBKR_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let mut gateway = GatewayConfig::from_host(&host)?;

        if let Some(raw) = get("IBKR_ACCEPT_INVALID_CERTS") {
            gateway.accept_invalid_certs = parse_bool("IBKR_ACCEPT_INVALID_CERTS", &raw)?;
        }
        if let Some(raw) = get("IBKR_CONNECT_TIMEOUT_SECS") {
            gateway.connect_timeout = parse_secs("IBKR_CONNECT_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("IBKR_READ_TIMEOUT_SECS") {
            gateway.read_timeout = parse_secs("IBKR_READ_TIMEOUT_SECS", &raw)?;
        }

        let instruments = parse_instruments(
            &get("IBKR_CONIDS").unwrap_or_else(|| DEFAULT_CONIDS.to_string()),
        )?;

        let drift_threshold_pct = match get("DRIFT_THRESHOLD_PCT") {
            Some(raw) => {
                let value: f64 = raw.parse().map_err(|_| {
                    ToolkitError::Config(format!("DRIFT_THRESHOLD_PCT is not a number: {}", raw))
                })?;
                if !value.is_finite() || value < 0.0 {
                    return Err(ToolkitError::Config(format!(
                        "DRIFT_THRESHOLD_PCT must be a non-negative number, got {}",
                        raw
                    )));
                }
                value
            }
            None => DEFAULT_DRIFT_THRESHOLD_PCT,
        };

        Ok(Self {
            gateway,
            account_id: get("ACCOUNT_ID"),
            instruments,
            history_period: get("HISTORY_PERIOD").unwrap_or_else(|| DEFAULT_HISTORY_PERIOD.to_string()),
            history_bar: get("HISTORY_BAR").unwrap_or_else(|| DEFAULT_HISTORY_BAR.to_string()),
            drift_threshold_pct,
        })
    }

    pub fn symbols(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.symbol.clone()).collect()
    }

    pub fn conids(&self) -> Vec<i64> {
        self.instruments.iter().map(|i| i.conid).collect()
    }
}

pub fn parse_base_url(host: &str) -> Result<Url> {
    let url = Url::parse(host)
        .map_err(|e| ToolkitError::Config(format!("IBKR_HOST is not a valid URL ({}): {}", host, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolkitError::Config(format!(
            "IBKR_HOST must use http or https, got {}",
            other
        ))),
    }
}

/// Parses `SYMBOL=CONID` pairs separated by commas, keeping their order.
pub fn parse_instruments(raw: &str) -> Result<Vec<Instrument>> {
    let mut seen = HashSet::new();
    let mut instruments = Vec::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (symbol, conid) = pair.split_once('=').ok_or_else(|| {
            ToolkitError::Config(format!("expected SYMBOL=CONID in IBKR_CONIDS, got {}", pair))
        })?;
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ToolkitError::Config(format!("empty symbol in IBKR_CONIDS entry {}", pair)));
        }
        let conid: i64 = conid.trim().parse().map_err(|_| {
            ToolkitError::Config(format!("conid for {} is not an integer: {}", symbol, conid.trim()))
        })?;
        if !seen.insert(symbol.to_string()) {
            return Err(ToolkitError::Config(format!("duplicate symbol in IBKR_CONIDS: {}", symbol)));
        }
        instruments.push(Instrument::new(symbol, conid));
    }

    if instruments.is_empty() {
        return Err(ToolkitError::Config("IBKR_CONIDS lists no instruments".to_string()));
    }
    Ok(instruments)
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ToolkitError::Config(format!("{} must be true or false, got {}", key, raw))),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ToolkitError::Config(format!(
            "{} must be a positive number of seconds, got {}",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ToolkitConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ToolkitConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_local_gateway() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.gateway.base_url.as_str(), "https://localhost:5002/");
        assert!(config.gateway.accept_invalid_certs);
        assert_eq!(config.gateway.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.gateway.read_timeout, Duration::from_secs(30));
        assert_eq!(config.symbols(), vec!["AZN", "B", "IGLN", "NVDA"]);
        assert_eq!(config.conids(), vec![4521593, 780709675, 86656182, 4815747]);
        assert!(config.account_id.is_none());
        assert_eq!(config.drift_threshold_pct, 5.0);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("IBKR_HOST", "http://127.0.0.1:5000"),
            ("ACCOUNT_ID", "DU123456"),
            ("IBKR_CONIDS", "SPY=756733, TLT=15547841"),
            ("IBKR_ACCEPT_INVALID_CERTS", "false"),
            ("IBKR_READ_TIMEOUT_SECS", "5"),
            ("HISTORY_PERIOD", "1y"),
            ("DRIFT_THRESHOLD_PCT", "2.5"),
        ])
        .unwrap();
        assert_eq!(config.gateway.base_url.port(), Some(5000));
        assert_eq!(config.account_id.as_deref(), Some("DU123456"));
        assert_eq!(config.symbols(), vec!["SPY", "TLT"]);
        assert!(!config.gateway.accept_invalid_certs);
        assert_eq!(config.gateway.read_timeout, Duration::from_secs(5));
        assert_eq!(config.history_period, "1y");
        assert_eq!(config.history_bar, "1d");
        assert_eq!(config.drift_threshold_pct, 2.5);
    }

    #[test]
    fn blank_account_id_is_treated_as_missing() {
        let config = config_from(&[("ACCOUNT_ID", "  ")]).unwrap();
        assert!(config.account_id.is_none());
    }

    #[test]
    fn rejects_malformed_values() {
        let cases: &[(&str, &str)] = &[
            ("IBKR_HOST", "not a url"),
            ("IBKR_HOST", "ftp://localhost:5002"),
            ("IBKR_CONIDS", "AZN=abc"),
            ("IBKR_CONIDS", "AZN4521593"),
            ("IBKR_CONIDS", "AZN=1,AZN=2"),
            ("IBKR_CONIDS", "=1"),
            ("IBKR_CONIDS", ",,"),
            ("IBKR_ACCEPT_INVALID_CERTS", "maybe"),
            ("IBKR_CONNECT_TIMEOUT_SECS", "0"),
            ("DRIFT_THRESHOLD_PCT", "-1"),
        ];
        for (key, value) in cases {
            let err = config_from(&[(key, value)]).unwrap_err();
            assert!(matches!(err, ToolkitError::Config(_)), "{}={} gave {:?}", key, value, err);
        }
    }
}
