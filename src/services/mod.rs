pub mod gateway;
pub mod market_data;
pub mod rebalance;

pub use gateway::GatewayClient;
pub use market_data::{fetch_price_histories, HistoryWindow, MarketDataProvider};
pub use rebalance::{DriftEntry, DriftReport};
