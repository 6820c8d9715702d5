use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::expenses::{
    ExpenseParams, DEFAULT_MARGINAL_TAX_RATE, DEFAULT_OTA_BOOKING_PERCENTAGE, DEFAULT_OTA_FEE_RATE,
};
use super::financing::{FinancingParams, DEFAULT_ACQUISITION_COST_RATE};
use super::overrides::{apply_overrides, ConfigOverrides};
use super::rental::{days_in_months, RentalParams, SeasonalParams};
use crate::error::ChaletError;
use crate::types::{Money, Rate};
use crate::ChaletResult;

/// Financing, rental and expense assumptions for one property.
///
/// Treated as immutable: variants are produced with [`BaseCaseConfig::with_overrides`],
/// which returns a new validated value and leaves `self` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseCaseConfig {
    pub financing: FinancingParams,
    pub rental: RentalParams,
    pub expenses: ExpenseParams,
}

impl BaseCaseConfig {
    /// Canonical base case: a 1.3M CHF chalet shared by four owners.
    pub fn default_case() -> Self {
        let purchase_price = dec!(1300000);
        let num_owners = 4;
        let seasons = vec![
            default_season(
                "winter_peak",
                "Winter Peak (Ski Season)",
                vec![12, 1, 2, 3],
                dec!(0.75),
                dec!(250),
                dec!(8),
            ),
            default_season(
                "summer_peak",
                "Summer Peak (Hiking Season)",
                vec![6, 7, 8, 9],
                dec!(0.65),
                dec!(200),
                dec!(7),
            ),
            default_season(
                "offpeak",
                "Off-Peak (Shoulder Seasons)",
                vec![4, 5, 10, 11],
                dec!(0.50),
                dec!(150),
                dec!(5),
            ),
        ];

        BaseCaseConfig {
            financing: FinancingParams {
                purchase_price,
                ltv: dec!(0.75),
                interest_rate: dec!(0.013),
                amortization_rate: dec!(0.01),
                num_owners,
                acquisition_cost_rate: DEFAULT_ACQUISITION_COST_RATE,
                loan_tranches: Vec::new(),
                saron_reference_rate: Decimal::ZERO,
            },
            rental: RentalParams {
                owner_nights_per_person: dec!(5),
                num_owners,
                days_per_year: 365,
                occupancy_rate: dec!(0.63),
                average_daily_rate: dec!(200),
                seasons,
            },
            expenses: ExpenseParams {
                property_management_fee_rate: dec!(0.20),
                cleaning_cost_per_stay: dec!(80),
                average_length_of_stay: dec!(1.7),
                tourist_tax_per_person_per_night: dec!(3.0),
                avg_guests_per_night: dec!(2.0),
                insurance_annual: purchase_price * dec!(0.004),
                shared_costs_annual: dec!(2000),
                utilities_annual: dec!(1000),
                maintenance_rate: dec!(0.01),
                property_value: purchase_price,
                ota_booking_percentage: DEFAULT_OTA_BOOKING_PERCENTAGE,
                ota_fee_rate: DEFAULT_OTA_FEE_RATE,
                marginal_tax_rate: DEFAULT_MARGINAL_TAX_RATE,
                vat_rate: None,
            },
        }
    }

    pub fn validate(&self) -> ChaletResult<()> {
        self.financing.validate()?;
        self.rental.validate()?;
        self.expenses.validate()?;
        if self.rental.num_owners != self.financing.num_owners {
            return Err(ChaletError::invalid(
                "rental.num_owners",
                format!(
                    "Must match financing.num_owners ({} vs {})",
                    self.rental.num_owners, self.financing.num_owners
                ),
            ));
        }
        Ok(())
    }

    /// Copy-on-override: a new validated config with `overrides` applied.
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> ChaletResult<BaseCaseConfig> {
        apply_overrides(self, overrides)
    }

    pub fn num_owners(&self) -> u32 {
        self.financing.num_owners
    }
}

fn default_season(
    name: &str,
    label: &str,
    months: Vec<u32>,
    occupancy_rate: Rate,
    average_daily_rate: Money,
    owner_nights: Decimal,
) -> SeasonalParams {
    let nights_available = Decimal::from(days_in_months(&months)) - owner_nights;
    SeasonalParams {
        name: name.into(),
        label: Some(label.into()),
        months,
        occupancy_rate,
        average_daily_rate,
        nights_available,
        owner_nights,
    }
}

/// Selling costs at exit, as shares of the gross sale price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellingCosts {
    pub broker_rate: Rate,
    pub notary_rate: Rate,
    pub transfer_tax_rate: Rate,
}

impl SellingCosts {
    pub fn total_rate(&self) -> Rate {
        self.broker_rate + self.notary_rate + self.transfer_tax_rate
    }
}

impl Default for SellingCosts {
    fn default() -> Self {
        SellingCosts {
            broker_rate: dec!(0.03),
            notary_rate: dec!(0.015),
            transfer_tax_rate: dec!(0.033),
        }
    }
}

/// Recurring renovation: every `frequency_years` years the property is
/// closed for `downtime_months` months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenovationSchedule {
    pub frequency_years: u32,
    pub downtime_months: u32,
}

/// Horizon-level assumptions used by the projection and valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionAssumptions {
    pub inflation_rate: Rate,
    pub property_appreciation_rate: Rate,
    #[serde(default = "default_projection_years")]
    pub projection_years: u32,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_discount_rate")]
    pub discount_rate: Rate,
    #[serde(default)]
    pub selling_costs: SellingCosts,
    /// Months after purchase before the first guest can be hosted
    #[serde(default)]
    pub ramp_up_months: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renovation: Option<RenovationSchedule>,
}

fn default_projection_years() -> u32 {
    15
}

fn default_start_year() -> i32 {
    2026
}

fn default_discount_rate() -> Rate {
    dec!(0.05)
}

impl Default for ProjectionAssumptions {
    fn default() -> Self {
        ProjectionAssumptions {
            inflation_rate: dec!(0.01),
            property_appreciation_rate: dec!(0.015),
            projection_years: default_projection_years(),
            start_year: default_start_year(),
            discount_rate: default_discount_rate(),
            selling_costs: SellingCosts::default(),
            ramp_up_months: 0,
            renovation: None,
        }
    }
}

impl ProjectionAssumptions {
    pub fn validate(&self) -> ChaletResult<()> {
        if self.projection_years == 0 {
            return Err(ChaletError::invalid(
                "projection.projection_years",
                "Horizon must be at least one year",
            ));
        }
        if self.discount_rate <= dec!(-1) {
            return Err(ChaletError::invalid(
                "projection.discount_rate",
                "Discount rate must be greater than -100%",
            ));
        }
        if self.inflation_rate <= dec!(-1) || self.property_appreciation_rate <= dec!(-1) {
            return Err(ChaletError::invalid(
                "projection.inflation_rate",
                "Growth rates must be greater than -100%",
            ));
        }
        let sc = self.selling_costs.total_rate();
        if sc < Decimal::ZERO || sc >= Decimal::ONE {
            return Err(ChaletError::invalid(
                "projection.selling_costs",
                "Total selling costs must be in [0, 1)",
            ));
        }
        if let Some(r) = &self.renovation {
            if r.frequency_years == 0 || r.downtime_months > 12 {
                return Err(ChaletError::invalid(
                    "projection.renovation",
                    "Frequency must be positive and downtime at most 12 months",
                ));
            }
        }
        Ok(())
    }
}

/// Everything needed to analyse one investment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentCase {
    pub config: BaseCaseConfig,
    #[serde(default)]
    pub projection: ProjectionAssumptions,
}

impl InvestmentCase {
    pub fn default_case() -> Self {
        InvestmentCase {
            config: BaseCaseConfig::default_case(),
            projection: ProjectionAssumptions::default(),
        }
    }

    pub fn validate(&self) -> ChaletResult<()> {
        self.config.validate()?;
        self.projection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_case_is_valid() {
        let case = InvestmentCase::default_case();
        case.validate().unwrap();
        assert_eq!(case.config.expenses.insurance_annual, dec!(5200));
        assert_eq!(case.projection.selling_costs.total_rate(), dec!(0.078));
    }

    #[test]
    fn test_default_seasons_net_of_owner_nights() {
        let config = BaseCaseConfig::default_case();
        let nights: Vec<Decimal> = config
            .rental
            .seasons
            .iter()
            .map(|s| s.nights_available)
            .collect();
        assert_eq!(nights, vec![dec!(113), dec!(115), dec!(117)]);
        let owner: Decimal = config.rental.seasons.iter().map(|s| s.owner_nights).sum();
        assert_eq!(owner, config.rental.total_owner_nights());
    }

    #[test]
    fn test_owner_count_mismatch() {
        let mut config = BaseCaseConfig::default_case();
        config.rental.num_owners = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_renovation_needs_frequency() {
        let mut p = ProjectionAssumptions::default();
        p.renovation = Some(RenovationSchedule {
            frequency_years: 0,
            downtime_months: 2,
        });
        assert!(p.validate().is_err());
    }
}
