//! Client for the broker's local REST gateway (`<host>/v1/api/...`).
//!
//! The gateway listens on loopback behind a self-signed certificate. Whether
//! the client accepts that certificate is decided by
//! [`GatewayConfig::accept_invalid_certs`] and applies to this client only.
//!
//! Every request goes through [`GatewayClient::get_json`], which maps
//! transport failures to `Connection`, unexpected statuses and payloads to
//! `Response`, and decodes into a narrow serde schema per endpoint.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::{AuthStatus, Result, ToolkitError};

pub mod contracts;
pub mod market_data;
pub mod portfolio;

pub use market_data::SNAPSHOT_FIELDS;

const API_PREFIX: &str = "v1/api/";

pub struct GatewayClient {
    client: Client,
    api_base: Url,
}

#[derive(Deserialize)]
struct AuthStatusResponse {
    authenticated: bool,
    connected: bool,
    #[serde(default)]
    competing: bool,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| ToolkitError::Config(format!("cannot build gateway client: {}", e)))?;

        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_base = base
            .join(API_PREFIX)
            .map_err(|e| ToolkitError::Config(format!("invalid gateway base URL: {}", e)))?;

        if config.accept_invalid_certs {
            debug!(base = %api_base, "gateway certificate verification disabled");
        }
        Ok(Self { client, api_base })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| ToolkitError::Input(format!("invalid endpoint path {}: {}", path, e)))
    }

    /// GETs `path` below the API prefix and decodes the body as `T`.
    pub(crate) async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, ?query, "GET");

        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ToolkitError::from_transport(path, e))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ToolkitError::Response(format!(
                "{}: HTTP {}; gateway session expired or not authenticated",
                path, status
            )));
        }
        if !status.is_success() {
            return Err(ToolkitError::Response(format!("{}: HTTP {}", path, status)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ToolkitError::from_transport(path, e))?;
        if body.trim().is_empty() {
            return Err(ToolkitError::Response(format!("{}: empty response body", path)));
        }
        serde_json::from_str(&body)
            .map_err(|e| ToolkitError::Response(format!("{}: unexpected payload: {}", path, e)))
    }

    pub async fn auth_status(&self) -> Result<AuthStatus> {
        let resp: AuthStatusResponse = self.get_json("iserver/auth/status", &[]).await?;
        Ok(AuthStatus {
            authenticated: resp.authenticated,
            connected: resp.connected,
            competing: resp.competing,
        })
    }

    /// Fails unless the gateway session is both authenticated and connected.
    pub async fn ensure_authenticated(&self) -> Result<AuthStatus> {
        let status = self.auth_status().await?;
        if status.competing {
            warn!("another session is competing for this gateway login");
        }
        if !(status.authenticated && status.connected) {
            return Err(ToolkitError::Response(format!(
                "gateway session not authenticated (authenticated={}, connected={}); log in via {}",
                status.authenticated, status.connected, self.api_base
            )));
        }
        info!("authenticated and connected to gateway");
        Ok(status)
    }
}

/// Reads a gateway number that may be sent as JSON number or as a string
/// such as `"C123.45"` (closing), `"H12.1"` (halted), `"1,234.5"` or `"1.2M"`.
pub fn parse_gateway_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim().trim_start_matches(|c: char| c.is_ascii_alphabetic());
            let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
            let (digits, multiplier) = match cleaned.chars().last() {
                Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 1e3),
                Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 1e6),
                Some('B') | Some('b') => (&cleaned[..cleaned.len() - 1], 1e9),
                _ => (cleaned.as_str(), 1.0),
            };
            digits.parse::<f64>().ok().map(|v| v * multiplier)
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub(crate) fn de_opt_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_gateway_number))
}

pub(crate) fn de_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_gateway_number(&value)
        .ok_or_else(|| D::Error::custom(format!("expected a number, got {}", value)))
}

/// Contract ids arrive as integers from most endpoints and as strings from search.
pub(crate) fn de_conid<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let conid = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    conid.ok_or_else(|| D::Error::custom(format!("invalid conid {}", value)))
}
