pub mod analysis;
pub mod cash_flow;
pub mod config;
pub mod error;
pub mod projection;
pub mod scenarios;
pub mod time_value;
pub mod types;
pub mod valuation;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use error::ChaletError;
pub use types::*;

/// Standard result type for all chalet-invest computations
pub type ChaletResult<T> = Result<T, ChaletError>;
