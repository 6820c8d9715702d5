use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::events::{describe_multipliers, ProjectionEvents};
use crate::cash_flow::annual::{
    operating_lines, operational_fraction, tax_lines, AnnualOptions, OperatingAssumptions,
    YearDrivers,
};
use crate::config::base_case::{ProjectionAssumptions, RenovationSchedule};
use crate::config::BaseCaseConfig;
use crate::error::ChaletError;
use crate::time_value::compounding_factors;
use crate::types::{Money, Nights, Rate};
use crate::ChaletResult;

/// Horizon, growth paths and overlays for one projection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub start_year: i32,
    pub projection_years: u32,
    pub inflation_rate: Rate,
    pub property_appreciation_rate: Rate,
    /// Per-year inflation rates; entry k drives the step into year k + 2.
    /// Missing entries fall back to `inflation_rate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inflation_series: Option<Vec<Rate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appreciation_series: Option<Vec<Rate>>,
    #[serde(default)]
    pub ramp_up_months: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renovation: Option<RenovationSchedule>,
    #[serde(default)]
    pub events: ProjectionEvents,
    /// Expense assumption overrides; `operational_months` is ignored here
    #[serde(default)]
    pub options: AnnualOptions,
}

impl ProjectionParams {
    pub fn from_assumptions(assumptions: &ProjectionAssumptions) -> Self {
        ProjectionParams {
            start_year: assumptions.start_year,
            projection_years: assumptions.projection_years,
            inflation_rate: assumptions.inflation_rate,
            property_appreciation_rate: assumptions.property_appreciation_rate,
            inflation_series: None,
            appreciation_series: None,
            ramp_up_months: assumptions.ramp_up_months,
            renovation: assumptions.renovation.clone(),
            events: ProjectionEvents::default(),
            options: AnnualOptions::default(),
        }
    }

    /// Months lost to ramp-up and renovation in year `k` (1-based), capped at 12.
    pub fn lost_months(&self, k: u32) -> u32 {
        let ramp = self
            .ramp_up_months
            .saturating_sub(12 * (k - 1))
            .min(12);
        let renovation = match &self.renovation {
            Some(r) if r.frequency_years > 0 && k % r.frequency_years == 0 => r.downtime_months,
            _ => 0,
        };
        (ramp + renovation).min(12)
    }
}

/// One projected year. Built once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub year: i32,
    pub year_number: u32,
    pub inflation_factor: Decimal,
    pub appreciation_factor: Decimal,
    pub operational_months: u32,
    pub property_value: Money,
    pub rented_nights: Nights,
    pub gross_rental_income: Money,
    pub ota_fees: Money,
    pub net_rental_income: Money,
    pub cleaning_cost: Money,
    pub property_management_cost: Money,
    pub tourist_tax: Money,
    pub insurance: Money,
    pub shared_costs: Money,
    pub utilities: Money,
    pub maintenance_reserve: Money,
    pub vat: Money,
    /// Major maintenance and refinancing costs charged this year
    pub one_off_costs: Money,
    pub total_operating_expenses: Money,
    pub net_operating_income: Money,
    pub interest_rate: Rate,
    pub interest_payment: Money,
    pub amortization_payment: Money,
    pub debt_service: Money,
    pub cash_flow_after_debt_service: Money,
    pub cash_flow_per_owner: Money,
    pub cumulative_cash_flow_per_owner: Money,
    pub taxable_income: Money,
    pub tax_liability: Money,
    pub tax_savings_total: Money,
    pub tax_savings_per_owner: Money,
    pub after_tax_cash_flow: Money,
    pub after_tax_cash_flow_per_owner: Money,
    /// Balance at year end, after this year's amortization
    pub remaining_loan_balance: Money,
    pub debt_coverage_ratio: Decimal,
    pub cap_rate: Decimal,
    pub refinanced: bool,
    pub shock_active: bool,
}

/// Year-by-year projection of operations, debt and value.
///
/// Revenue and per-night costs are rebuilt from the base-year quantities
/// times the current factor each year rather than compounded off the
/// previous row.
pub fn compute_projection(
    config: &BaseCaseConfig,
    params: &ProjectionParams,
) -> ChaletResult<Vec<ProjectionRow>> {
    if params.projection_years == 0 {
        return Err(ChaletError::invalid(
            "projection_years",
            "Horizon must be at least one year",
        ));
    }
    if config.financing.num_owners < 1 {
        return Err(ChaletError::invalid(
            "financing.num_owners",
            "At least one owner is required",
        ));
    }
    params.events.validate()?;

    let financing = &config.financing;
    let expenses = &config.expenses;
    let n = params.projection_years;
    let owners = Decimal::from(financing.num_owners);
    let assumptions = OperatingAssumptions::resolve(expenses, &params.options);

    let inflation = compounding_factors(
        params.inflation_rate,
        params.inflation_series.as_deref(),
        n,
    );
    let appreciation = compounding_factors(
        params.property_appreciation_rate,
        params.appreciation_series.as_deref(),
        n,
    );

    let base_rented_nights = config.rental.rented_nights();
    let base_gross = config.rental.gross_rental_income();
    let initial_loan = financing.loan_amount();
    let scheduled_amortization = initial_loan * financing.amortization_rate;

    let mut balance = initial_loan;
    let mut cumulative = Decimal::ZERO;
    let mut refinanced_rate: Option<Rate> = None;
    let mut rows = Vec::with_capacity(n as usize);

    for k in 1..=n {
        let idx = (k - 1) as usize;
        let inflation_factor = inflation[idx];
        let appreciation_factor = appreciation[idx];

        let lost = params.lost_months(k);
        let operational_months = 12 - lost;
        let f = operational_fraction(operational_months);

        let shock = params.events.shock_multipliers(k);
        if !shock.is_neutral() {
            debug!(year = k, multipliers = %describe_multipliers(&shock), "market shock active");
        }

        let refinancing = params.events.refinancing_in(k);
        if let Some(r) = refinancing {
            refinanced_rate = Some(r.new_rate);
        }
        let interest_rate = match refinanced_rate {
            Some(rate) => rate,
            None => match &params.events.saron_cycle {
                Some(cycle) => financing.interest_rate_at(cycle.rate_for_year(k)),
                None => financing.effective_interest_rate(),
            },
        };

        // market value tracks the purchase price; `expenses.property_value`
        // only feeds the stand-alone year-1 reserve
        let property_value = financing.purchase_price * appreciation_factor * shock.value;
        let one_off_costs =
            params.events.maintenance_cost(k) + refinancing.map_or(Decimal::ZERO, |r| r.cost);

        let drivers = YearDrivers {
            rented_nights: base_rented_nights * shock.occupancy * f,
            gross_rental_income: base_gross * inflation_factor * shock.occupancy * shock.rate * f,
            cost_index: inflation_factor,
            operational_fraction: f,
            property_value,
            one_off_costs,
        };
        let lines = operating_lines(expenses, &assumptions, &drivers)?;
        let noi = lines.net_operating_income;

        let interest_payment = balance * interest_rate;
        let amortization_payment = scheduled_amortization.min(balance);
        let debt_service = interest_payment + amortization_payment;
        let cash_flow_after_debt_service = noi - debt_service;
        let cash_flow_per_owner = cash_flow_after_debt_service / owners;
        cumulative += cash_flow_per_owner;

        let tax = tax_lines(noi, interest_payment, assumptions.marginal_tax_rate);
        let after_tax_cash_flow = cash_flow_after_debt_service + tax.tax_savings;

        balance -= amortization_payment;

        rows.push(ProjectionRow {
            year: params.start_year + idx as i32,
            year_number: k,
            inflation_factor,
            appreciation_factor,
            operational_months,
            property_value,
            rented_nights: drivers.rented_nights,
            gross_rental_income: drivers.gross_rental_income,
            ota_fees: lines.ota_fees,
            net_rental_income: lines.net_rental_income,
            cleaning_cost: lines.cleaning_cost,
            property_management_cost: lines.property_management_cost,
            tourist_tax: lines.tourist_tax,
            insurance: lines.insurance,
            shared_costs: lines.shared_costs,
            utilities: lines.utilities,
            maintenance_reserve: lines.maintenance_reserve,
            vat: lines.vat,
            one_off_costs: lines.one_off_costs,
            total_operating_expenses: lines.total_operating_expenses,
            net_operating_income: noi,
            interest_rate,
            interest_payment,
            amortization_payment,
            debt_service,
            cash_flow_after_debt_service,
            cash_flow_per_owner,
            cumulative_cash_flow_per_owner: cumulative,
            taxable_income: tax.taxable_income,
            tax_liability: tax.tax_liability,
            tax_savings_total: tax.tax_savings,
            tax_savings_per_owner: tax.tax_savings / owners,
            after_tax_cash_flow,
            after_tax_cash_flow_per_owner: after_tax_cash_flow / owners,
            remaining_loan_balance: balance,
            debt_coverage_ratio: if debt_service > Decimal::ZERO {
                noi / debt_service
            } else {
                Decimal::ZERO
            },
            cap_rate: if property_value > Decimal::ZERO {
                noi / property_value * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            },
            refinanced: refinancing.is_some(),
            shock_active: !shock.is_neutral(),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash_flow::compute_annual_cash_flows;
    use crate::projection::events::{MaintenanceEvent, MarketShock, RefinancingEvent};
    use rust_decimal_macros::dec;

    fn sample_params() -> ProjectionParams {
        ProjectionParams::from_assumptions(&ProjectionAssumptions::default())
    }

    #[test]
    fn test_year_one_matches_annual() {
        let config = BaseCaseConfig::default_case();
        let rows = compute_projection(&config, &sample_params()).unwrap();
        let annual = compute_annual_cash_flows(&config, &AnnualOptions::default()).unwrap();
        let y1 = &rows[0];
        assert_eq!(y1.gross_rental_income, annual.gross_rental_income);
        assert_eq!(y1.net_operating_income, annual.net_operating_income);
        assert_eq!(y1.debt_service, annual.debt_service);
        assert_eq!(y1.cash_flow_per_owner, annual.cash_flow_per_owner);
        assert_eq!(y1.year, 2026);
    }

    #[test]
    fn test_constant_amortization_and_balance() {
        let config = BaseCaseConfig::default_case();
        let rows = compute_projection(&config, &sample_params()).unwrap();
        let loan = config.financing.loan_amount();
        let amort = config.financing.annual_amortization();
        for (k, row) in rows.iter().enumerate() {
            assert_eq!(row.amortization_payment, amort);
            assert_eq!(
                row.remaining_loan_balance,
                loan - Decimal::from(k as u32 + 1) * amort
            );
        }
    }

    #[test]
    fn test_zero_growth_is_flat() {
        let config = BaseCaseConfig::default_case();
        let mut params = sample_params();
        params.inflation_rate = Decimal::ZERO;
        params.property_appreciation_rate = Decimal::ZERO;
        let rows = compute_projection(&config, &params).unwrap();
        for row in &rows {
            assert_eq!(row.gross_rental_income, rows[0].gross_rental_income);
            assert_eq!(row.property_value, dec!(1300000));
        }
    }

    #[test]
    fn test_interest_only_keeps_balance() {
        let mut config = BaseCaseConfig::default_case();
        config.financing.amortization_rate = Decimal::ZERO;
        let rows = compute_projection(&config, &sample_params()).unwrap();
        assert!(rows
            .iter()
            .all(|r| r.remaining_loan_balance == config.financing.loan_amount()));
    }

    #[test]
    fn test_ramp_up_into_second_year() {
        let config = BaseCaseConfig::default_case();
        let mut params = sample_params();
        params.ramp_up_months = 14;
        let rows = compute_projection(&config, &params).unwrap();
        assert_eq!(rows[0].operational_months, 0);
        assert_eq!(rows[0].gross_rental_income, Decimal::ZERO);
        assert_eq!(rows[1].operational_months, 10);
        assert_eq!(rows[2].operational_months, 12);
        // fixed costs still charged in the dead year
        assert_eq!(rows[0].insurance, dec!(5200));
    }

    #[test]
    fn test_renovation_downtime() {
        let config = BaseCaseConfig::default_case();
        let mut params = sample_params();
        params.renovation = Some(RenovationSchedule {
            frequency_years: 5,
            downtime_months: 3,
        });
        let rows = compute_projection(&config, &params).unwrap();
        assert_eq!(rows[4].operational_months, 9);
        assert_eq!(rows[9].operational_months, 9);
        assert_eq!(rows[5].operational_months, 12);
    }

    #[test]
    fn test_events_overlay() {
        let config = BaseCaseConfig::default_case();
        let mut params = sample_params();
        params.events.market_shocks.push(MarketShock {
            year: 2,
            occupancy_impact: dec!(-0.4),
            rate_impact: dec!(-0.2),
            value_impact: dec!(-0.1),
            recovery_years: 2,
        });
        params.events.refinancings.push(RefinancingEvent {
            year: 4,
            new_rate: dec!(0.02),
            cost: dec!(3000),
        });
        params.events.maintenance.push(MaintenanceEvent {
            year: 6,
            cost: dec!(15000),
            description: None,
        });
        let base = compute_projection(&config, &sample_params()).unwrap();
        let rows = compute_projection(&config, &params).unwrap();

        assert!(rows[1].shock_active);
        assert_eq!(
            rows[1].gross_rental_income,
            base[1].gross_rental_income * dec!(0.6) * dec!(0.8)
        );
        assert_eq!(rows[1].property_value, base[1].property_value * dec!(0.9));
        assert!(!rows[4].shock_active);

        assert!(rows[3].refinanced);
        assert_eq!(rows[3].interest_rate, dec!(0.02));
        assert_eq!(rows[10].interest_rate, dec!(0.02));
        assert_eq!(rows[3].one_off_costs, dec!(3000));
        assert_eq!(rows[5].one_off_costs, dec!(15000));
        assert_eq!(rows[4].one_off_costs, Decimal::ZERO);
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let mut params = sample_params();
        params.projection_years = 0;
        assert!(compute_projection(&BaseCaseConfig::default_case(), &params).is_err());
    }
}
