use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ChaletError;
use crate::types::{Money, Rate};
use crate::ChaletResult;

/// Notary (0.75%) plus land-registry/legal (0.3%) fees on the purchase price.
pub const DEFAULT_ACQUISITION_COST_RATE: Rate = dec!(0.0105);

const TRANCHE_SHARE_TOLERANCE: Decimal = dec!(0.001);

/// Pricing of a single mortgage tranche.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrancheRate {
    /// Fixed-rate mortgage at `rate`.
    Fixed { rate: Rate },
    /// Money-market mortgage paying the SARON reference rate plus `margin`.
    Saron { margin: Rate },
}

/// One slice of the mortgage, sized as a share of the total loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTranche {
    pub name: String,
    pub share_of_loan: Rate,
    pub rate: TrancheRate,
}

impl LoanTranche {
    pub fn is_saron(&self) -> bool {
        matches!(self.rate, TrancheRate::Saron { .. })
    }

    /// Current coupon given the SARON reference rate (floored at zero).
    pub fn coupon(&self, saron_reference_rate: Rate) -> Rate {
        match &self.rate {
            TrancheRate::Fixed { rate } => *rate,
            TrancheRate::Saron { margin } => saron_reference_rate.max(Decimal::ZERO) + *margin,
        }
    }
}

/// Purchase and mortgage terms.
///
/// Amortization is a constant nominal payment of `amortization_rate` times
/// the *initial* loan every year, not a declining-balance schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancingParams {
    pub purchase_price: Money,
    /// Loan-to-value, strictly between 0 and 1
    pub ltv: Rate,
    /// Single blended mortgage rate, used when no tranches are given
    pub interest_rate: Rate,
    /// Share of the initial loan repaid each year
    pub amortization_rate: Rate,
    pub num_owners: u32,
    #[serde(default = "default_acquisition_cost_rate")]
    pub acquisition_cost_rate: Rate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loan_tranches: Vec<LoanTranche>,
    #[serde(default)]
    pub saron_reference_rate: Rate,
}

fn default_acquisition_cost_rate() -> Rate {
    DEFAULT_ACQUISITION_COST_RATE
}

impl FinancingParams {
    pub fn loan_amount(&self) -> Money {
        self.purchase_price * self.ltv
    }

    pub fn equity_total(&self) -> Money {
        self.purchase_price - self.loan_amount()
    }

    pub fn equity_per_owner(&self) -> Money {
        self.equity_total() / self.owners()
    }

    pub fn acquisition_costs(&self) -> Money {
        self.purchase_price * self.acquisition_cost_rate
    }

    pub fn acquisition_costs_per_owner(&self) -> Money {
        self.acquisition_costs() / self.owners()
    }

    /// Equity plus acquisition costs: the cash the owners actually put in.
    pub fn total_initial_investment(&self) -> Money {
        self.equity_total() + self.acquisition_costs()
    }

    pub fn total_initial_investment_per_owner(&self) -> Money {
        self.total_initial_investment() / self.owners()
    }

    /// Blended rate across tranches, or the single rate without tranches.
    pub fn effective_interest_rate(&self) -> Rate {
        self.interest_rate_at(self.saron_reference_rate)
    }

    /// Blended rate for a given SARON fixing.
    pub fn interest_rate_at(&self, saron_reference_rate: Rate) -> Rate {
        if self.loan_tranches.is_empty() {
            return self.interest_rate;
        }
        self.loan_tranches
            .iter()
            .map(|t| t.share_of_loan * t.coupon(saron_reference_rate))
            .sum()
    }

    /// Combined share of the loan held in SARON tranches.
    pub fn saron_share(&self) -> Rate {
        self.loan_tranches
            .iter()
            .filter(|t| t.is_saron())
            .map(|t| t.share_of_loan)
            .sum()
    }

    /// Share-weighted margin of the SARON tranches, if any.
    pub fn saron_margin(&self) -> Option<Rate> {
        let share = self.saron_share();
        if share.is_zero() {
            return None;
        }
        let weighted: Decimal = self
            .loan_tranches
            .iter()
            .filter_map(|t| match t.rate {
                TrancheRate::Saron { margin } => Some(margin * t.share_of_loan),
                TrancheRate::Fixed { .. } => None,
            })
            .sum();
        Some(weighted / share)
    }

    pub fn annual_interest(&self) -> Money {
        self.loan_amount() * self.effective_interest_rate()
    }

    pub fn annual_amortization(&self) -> Money {
        self.loan_amount() * self.amortization_rate
    }

    pub fn annual_debt_service(&self) -> Money {
        self.annual_interest() + self.annual_amortization()
    }

    fn owners(&self) -> Decimal {
        Decimal::from(self.num_owners.max(1))
    }

    pub fn validate(&self) -> ChaletResult<()> {
        if self.purchase_price <= Decimal::ZERO {
            return Err(ChaletError::invalid(
                "financing.purchase_price",
                "Purchase price must be positive",
            ));
        }
        if self.ltv <= Decimal::ZERO || self.ltv >= Decimal::ONE {
            return Err(ChaletError::invalid(
                "financing.ltv",
                format!("LTV must be strictly between 0 and 1 (got {})", self.ltv),
            ));
        }
        if self.interest_rate < Decimal::ZERO {
            return Err(ChaletError::invalid(
                "financing.interest_rate",
                "Interest rate cannot be negative",
            ));
        }
        if self.amortization_rate < Decimal::ZERO {
            return Err(ChaletError::invalid(
                "financing.amortization_rate",
                "Amortization rate cannot be negative",
            ));
        }
        if self.num_owners < 1 {
            return Err(ChaletError::invalid(
                "financing.num_owners",
                "At least one owner is required",
            ));
        }
        if self.acquisition_cost_rate < Decimal::ZERO {
            return Err(ChaletError::invalid(
                "financing.acquisition_cost_rate",
                "Acquisition cost rate cannot be negative",
            ));
        }
        if !self.loan_tranches.is_empty() {
            for t in &self.loan_tranches {
                if t.share_of_loan < Decimal::ZERO || t.share_of_loan > Decimal::ONE {
                    return Err(ChaletError::invalid(
                        format!("financing.loan_tranches[{}].share_of_loan", t.name),
                        "Tranche share must be between 0 and 1",
                    ));
                }
            }
            let total: Decimal = self.loan_tranches.iter().map(|t| t.share_of_loan).sum();
            if (total - Decimal::ONE).abs() > TRANCHE_SHARE_TOLERANCE {
                return Err(ChaletError::invalid(
                    "financing.loan_tranches",
                    format!("Tranche shares must sum to 1.0 (got {total})"),
                ));
            }
        }
        Ok(())
    }
}
