pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use config::{GatewayConfig, ToolkitConfig};
pub use error::{Result, ToolkitError};
pub use models::*;
