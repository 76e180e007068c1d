pub mod covariance;
pub mod optimizer;
pub mod returns;
pub mod risk_parity;

pub use covariance::*;
pub use optimizer::*;
pub use returns::*;
pub use risk_parity::*;
