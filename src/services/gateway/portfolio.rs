use serde::Deserialize;

use super::{de_conid, de_number, de_opt_number, GatewayClient};
use crate::{Position, Result, ToolkitError};

#[derive(Deserialize)]
struct PositionEntry {
    #[serde(deserialize_with = "de_conid")]
    conid: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(deserialize_with = "de_number")]
    position: f64,
    #[serde(rename = "marketPrice", default, deserialize_with = "de_opt_number")]
    market_price: Option<f64>,
    #[serde(rename = "marketValue", default, deserialize_with = "de_opt_number")]
    market_value: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

impl GatewayClient {
    /// Near-real-time positions for `account_id`. Read-only.
    pub async fn positions(&self, account_id: &str) -> Result<Vec<Position>> {
        if account_id.is_empty() || !account_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ToolkitError::Input(format!("invalid account id {:?}", account_id)));
        }
        let entries: Vec<PositionEntry> = self
            .get_json(&format!("portfolio2/{}/positions", account_id), &[])
            .await?;
        Ok(entries
            .into_iter()
            .map(|e| Position {
                conid: e.conid,
                description: e.description,
                position: e.position,
                market_price: e.market_price,
                market_value: e.market_value,
                currency: e.currency,
            })
            .collect())
    }
}
