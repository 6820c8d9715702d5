pub mod annual;

pub use annual::{compute_annual_cash_flows, AnnualOptions, AnnualResult};
