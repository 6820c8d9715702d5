pub mod base_case;
pub mod expenses;
pub mod financing;
pub mod loader;
pub mod overrides;
pub mod rental;

pub use base_case::{BaseCaseConfig, InvestmentCase, ProjectionAssumptions, SellingCosts};
pub use expenses::ExpenseParams;
pub use financing::{FinancingParams, LoanTranche, TrancheRate};
pub use overrides::ConfigOverrides;
pub use rental::{RentalParams, SeasonalBreakdown, SeasonalParams};
