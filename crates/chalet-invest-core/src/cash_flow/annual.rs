use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::{BaseCaseConfig, ExpenseParams, SeasonalBreakdown};
use crate::error::ChaletError;
use crate::types::{Money, Nights, Rate};
use crate::ChaletResult;

/// Share of the normal utilities bill still paid while the property is empty.
pub const VACANT_UTILITIES_SHARE: Rate = dec!(0.25);

const MONTHS_PER_YEAR: Decimal = dec!(12);
const HUNDRED: Decimal = dec!(100);

/// Optional knobs for a single annual calculation. Unset fields fall back
/// to the expense assumptions of the config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnualOptions {
    /// Months (0-12) the property takes guests; `None` means a full year
    #[serde(default)]
    pub operational_months: Option<u32>,
    #[serde(default)]
    pub ota_booking_percentage: Option<Rate>,
    #[serde(default)]
    pub ota_fee_rate: Option<Rate>,
    #[serde(default)]
    pub average_length_of_stay: Option<Nights>,
    #[serde(default)]
    pub avg_guests_per_night: Option<Decimal>,
    #[serde(default)]
    pub cleaning_cost_per_stay: Option<Money>,
    #[serde(default)]
    pub marginal_tax_rate: Option<Rate>,
}

/// One year of operations, financing and tax for the whole property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualResult {
    pub num_owners: u32,
    pub operational_months: u32,
    // Revenue
    pub rentable_nights: Nights,
    pub rented_nights: Nights,
    pub occupancy_rate: Rate,
    pub average_daily_rate: Money,
    pub gross_rental_income: Money,
    pub effective_ota_fee_rate: Rate,
    pub ota_fees: Money,
    pub net_rental_income: Money,
    pub seasonal_breakdown: Vec<SeasonalBreakdown>,
    // Operating expenses
    pub cleaning_cost: Money,
    pub management_fee_base: Money,
    pub property_management_cost: Money,
    pub tourist_tax: Money,
    pub insurance: Money,
    pub shared_costs: Money,
    pub utilities: Money,
    pub maintenance_reserve: Money,
    pub vat: Money,
    pub total_operating_expenses: Money,
    pub net_operating_income: Money,
    // Financing
    pub interest_payment: Money,
    pub amortization_payment: Money,
    pub debt_service: Money,
    pub cash_flow_after_debt_service: Money,
    pub cash_flow_per_owner: Money,
    // Tax
    pub taxable_income: Money,
    pub marginal_tax_rate: Rate,
    pub tax_liability: Money,
    pub tax_savings_total: Money,
    pub tax_savings_per_owner: Money,
    pub after_tax_cash_flow: Money,
    pub after_tax_cash_flow_per_owner: Money,
    // KPIs (percentages)
    pub cap_rate: Decimal,
    pub cash_on_cash_return: Decimal,
    pub debt_coverage_ratio: Decimal,
    pub operating_expense_ratio: Decimal,
}

/// Expense assumptions after applying [`AnnualOptions`].
#[derive(Debug, Clone)]
pub(crate) struct OperatingAssumptions {
    pub ota_booking_percentage: Rate,
    pub ota_fee_rate: Rate,
    pub average_length_of_stay: Nights,
    pub avg_guests_per_night: Decimal,
    pub cleaning_cost_per_stay: Money,
    pub marginal_tax_rate: Rate,
}

impl OperatingAssumptions {
    pub(crate) fn resolve(expenses: &ExpenseParams, options: &AnnualOptions) -> Self {
        OperatingAssumptions {
            ota_booking_percentage: options
                .ota_booking_percentage
                .unwrap_or(expenses.ota_booking_percentage),
            ota_fee_rate: options.ota_fee_rate.unwrap_or(expenses.ota_fee_rate),
            average_length_of_stay: options
                .average_length_of_stay
                .unwrap_or(expenses.average_length_of_stay),
            avg_guests_per_night: options
                .avg_guests_per_night
                .unwrap_or(expenses.avg_guests_per_night),
            cleaning_cost_per_stay: options
                .cleaning_cost_per_stay
                .unwrap_or(expenses.cleaning_cost_per_stay),
            marginal_tax_rate: options.marginal_tax_rate.unwrap_or(expenses.marginal_tax_rate),
        }
    }

    pub(crate) fn effective_ota_fee_rate(&self) -> Rate {
        self.ota_booking_percentage * self.ota_fee_rate
    }
}

/// Physical and price inputs for one year of operations.
#[derive(Debug, Clone)]
pub(crate) struct YearDrivers {
    /// Nights actually rented in the year (after any proration)
    pub rented_nights: Nights,
    pub gross_rental_income: Money,
    /// Price index applied to per-night and fixed costs
    pub cost_index: Decimal,
    /// Share of the year the property takes guests
    pub operational_fraction: Decimal,
    pub property_value: Money,
    pub one_off_costs: Money,
}

#[derive(Debug, Clone)]
pub(crate) struct OperatingLines {
    pub ota_fees: Money,
    pub net_rental_income: Money,
    pub cleaning_cost: Money,
    pub management_fee_base: Money,
    pub property_management_cost: Money,
    pub tourist_tax: Money,
    pub insurance: Money,
    pub shared_costs: Money,
    pub utilities: Money,
    pub maintenance_reserve: Money,
    pub vat: Money,
    pub one_off_costs: Money,
    pub total_operating_expenses: Money,
    pub net_operating_income: Money,
}

/// Revenue-to-NOI pipeline shared by the annual calculator and the
/// projection engine. The management fee is charged on revenue after OTA
/// fees and cleaning.
pub(crate) fn operating_lines(
    expenses: &ExpenseParams,
    assumptions: &OperatingAssumptions,
    drivers: &YearDrivers,
) -> ChaletResult<OperatingLines> {
    let gross = drivers.gross_rental_income;
    let ota_fees = gross * assumptions.effective_ota_fee_rate();
    let net_rental_income = gross - ota_fees;

    let cleaning_cost = if assumptions.cleaning_cost_per_stay > Decimal::ZERO {
        if assumptions.average_length_of_stay <= Decimal::ZERO {
            return Err(ChaletError::DivisionByZero {
                context: "stays per year (average_length_of_stay is zero)".into(),
            });
        }
        drivers.rented_nights / assumptions.average_length_of_stay
            * assumptions.cleaning_cost_per_stay
            * drivers.cost_index
    } else {
        Decimal::ZERO
    };

    let management_fee_base = net_rental_income - cleaning_cost;
    let property_management_cost = expenses.property_management_cost(management_fee_base);
    let tourist_tax = drivers.rented_nights
        * assumptions.avg_guests_per_night
        * expenses.tourist_tax_per_person_per_night
        * drivers.cost_index;
    let insurance = expenses.insurance_annual * drivers.cost_index;
    let shared_costs = expenses.shared_costs_annual * drivers.cost_index;

    let f = drivers.operational_fraction;
    let utilities_factor = f + (Decimal::ONE - f) * VACANT_UTILITIES_SHARE;
    let utilities = expenses.utilities_annual * drivers.cost_index * utilities_factor;

    let maintenance_reserve = drivers.property_value * expenses.maintenance_rate;
    let vat = expenses.vat_rate.map_or(Decimal::ZERO, |v| gross * v);

    let total_operating_expenses = property_management_cost
        + cleaning_cost
        + tourist_tax
        + insurance
        + shared_costs
        + utilities
        + maintenance_reserve
        + vat
        + drivers.one_off_costs;

    Ok(OperatingLines {
        ota_fees,
        net_rental_income,
        cleaning_cost,
        management_fee_base,
        property_management_cost,
        tourist_tax,
        insurance,
        shared_costs,
        utilities,
        maintenance_reserve,
        vat,
        one_off_costs: drivers.one_off_costs,
        total_operating_expenses,
        net_operating_income: net_rental_income - total_operating_expenses,
    })
}

#[derive(Debug, Clone)]
pub(crate) struct TaxLines {
    pub taxable_income: Money,
    pub tax_liability: Money,
    pub tax_savings: Money,
}

/// Only interest is deductible. The saving is reported even when taxable
/// income is negative.
pub(crate) fn tax_lines(noi: Money, interest: Money, marginal_tax_rate: Rate) -> TaxLines {
    let taxable_income = noi - interest;
    TaxLines {
        taxable_income,
        tax_liability: taxable_income.max(Decimal::ZERO) * marginal_tax_rate,
        tax_savings: interest * marginal_tax_rate,
    }
}

pub(crate) fn ratio_pct(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator * HUNDRED
    }
}

/// Share of a year the property operates given `months` (clamped to 12).
pub(crate) fn operational_fraction(months: u32) -> Decimal {
    Decimal::from(months.min(12)) / MONTHS_PER_YEAR
}

/// Annual cash flows for the whole property.
pub fn compute_annual_cash_flows(
    config: &BaseCaseConfig,
    options: &AnnualOptions,
) -> ChaletResult<AnnualResult> {
    let financing = &config.financing;
    let rental = &config.rental;
    let expenses = &config.expenses;

    if financing.num_owners < 1 {
        return Err(ChaletError::invalid(
            "financing.num_owners",
            "At least one owner is required",
        ));
    }
    let operational_months = options.operational_months.unwrap_or(12);
    if operational_months > 12 {
        return Err(ChaletError::invalid(
            "operational_months",
            "Must be between 0 and 12",
        ));
    }

    let assumptions = OperatingAssumptions::resolve(expenses, options);
    let f = operational_fraction(operational_months);

    let full_year_nights = rental.rented_nights();
    let full_year_gross = rental.gross_rental_income();
    let rentable_nights = rental.rentable_nights();

    let drivers = YearDrivers {
        rented_nights: full_year_nights * f,
        gross_rental_income: full_year_gross * f,
        cost_index: Decimal::ONE,
        operational_fraction: f,
        property_value: expenses.property_value,
        one_off_costs: Decimal::ZERO,
    };
    let lines = operating_lines(expenses, &assumptions, &drivers)?;

    let owners = Decimal::from(financing.num_owners);
    let interest_payment = financing.annual_interest();
    let amortization_payment = financing.annual_amortization();
    let debt_service = interest_payment + amortization_payment;
    let noi = lines.net_operating_income;
    let cash_flow_after_debt_service = noi - debt_service;
    let cash_flow_per_owner = cash_flow_after_debt_service / owners;

    let tax = tax_lines(noi, interest_payment, assumptions.marginal_tax_rate);
    let after_tax_cash_flow = cash_flow_after_debt_service + tax.tax_savings;

    let occupancy_rate = if rentable_nights > Decimal::ZERO {
        full_year_nights / rentable_nights
    } else {
        Decimal::ZERO
    };
    let average_daily_rate = if full_year_nights > Decimal::ZERO {
        full_year_gross / full_year_nights
    } else {
        Decimal::ZERO
    };
    let debt_coverage_ratio = if debt_service > Decimal::ZERO {
        noi / debt_service
    } else {
        Decimal::ZERO
    };
    let operating_expense_ratio = if lines.net_rental_income > Decimal::ZERO {
        ratio_pct(lines.total_operating_expenses, lines.net_rental_income)
    } else {
        Decimal::ZERO
    };

    Ok(AnnualResult {
        num_owners: financing.num_owners,
        operational_months,
        rentable_nights,
        rented_nights: drivers.rented_nights,
        occupancy_rate,
        average_daily_rate,
        gross_rental_income: drivers.gross_rental_income,
        effective_ota_fee_rate: assumptions.effective_ota_fee_rate(),
        ota_fees: lines.ota_fees,
        net_rental_income: lines.net_rental_income,
        seasonal_breakdown: rental.seasonal_breakdown(),
        cleaning_cost: lines.cleaning_cost,
        management_fee_base: lines.management_fee_base,
        property_management_cost: lines.property_management_cost,
        tourist_tax: lines.tourist_tax,
        insurance: lines.insurance,
        shared_costs: lines.shared_costs,
        utilities: lines.utilities,
        maintenance_reserve: lines.maintenance_reserve,
        vat: lines.vat,
        total_operating_expenses: lines.total_operating_expenses,
        net_operating_income: noi,
        interest_payment,
        amortization_payment,
        debt_service,
        cash_flow_after_debt_service,
        cash_flow_per_owner,
        taxable_income: tax.taxable_income,
        marginal_tax_rate: assumptions.marginal_tax_rate,
        tax_liability: tax.tax_liability,
        tax_savings_total: tax.tax_savings,
        tax_savings_per_owner: tax.tax_savings / owners,
        after_tax_cash_flow,
        after_tax_cash_flow_per_owner: after_tax_cash_flow / owners,
        cap_rate: ratio_pct(noi, financing.purchase_price),
        cash_on_cash_return: ratio_pct(
            cash_flow_after_debt_service,
            financing.total_initial_investment(),
        ),
        debt_coverage_ratio,
        operating_expense_ratio,
    })
}
