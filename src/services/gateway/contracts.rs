use serde::Deserialize;
use tracing::{info, warn};

use super::{de_conid, GatewayClient};
use crate::{ContractMatch, Result, ToolkitError};

#[derive(Deserialize)]
struct SearchEntry {
    #[serde(deserialize_with = "de_conid")]
    conid: i64,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "companyName", default)]
    company_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "secType", default)]
    sec_type: Option<String>,
    #[serde(rename = "listingExchange", default)]
    listing_exchange: Option<String>,
}

impl From<SearchEntry> for ContractMatch {
    fn from(e: SearchEntry) -> Self {
        ContractMatch {
            conid: e.conid,
            symbol: e.symbol,
            name: e.name.or(e.company_name),
            description: e.description,
            sec_type: e.sec_type,
            listing_exchange: e.listing_exchange,
        }
    }
}

/// The search answers a miss with `[]`, `null` or `{"error": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchPayload {
    Matches(Vec<SearchEntry>),
    Miss { error: String },
}

impl GatewayClient {
    /// Stock contracts matching `symbol`. A legitimate miss is an empty list.
    pub async fn search_contracts(&self, symbol: &str) -> Result<Vec<ContractMatch>> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ToolkitError::Input("search symbol is empty".to_string()));
        }

        let payload: Option<SearchPayload> = self
            .get_json(
                "iserver/secdef/search",
                &[("symbol", symbol.to_string()), ("secType", "STK".to_string())],
            )
            .await?;
        let entries = match payload {
            Some(SearchPayload::Matches(entries)) => entries,
            Some(SearchPayload::Miss { error }) => {
                warn!(symbol, "contract search: {}", error);
                Vec::new()
            }
            None => Vec::new(),
        };
        let matches: Vec<ContractMatch> = entries.into_iter().map(ContractMatch::from).collect();

        info!(symbol, matches = matches.len(), "contract search");
        Ok(matches)
    }

    /// Searches each symbol in turn, keeping input order.
    pub async fn search_many(&self, symbols: &[String]) -> Result<Vec<(String, Vec<ContractMatch>)>> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let matches = self.search_contracts(symbol).await?;
            results.push((symbol.clone(), matches));
        }
        Ok(results)
    }
}
