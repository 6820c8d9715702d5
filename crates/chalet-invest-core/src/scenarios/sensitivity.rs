use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::analysis::run_chain;
use crate::config::{ConfigOverrides, InvestmentCase};
use crate::error::ChaletError;
use crate::projection::{compute_projection, ProjectionParams};
use crate::types::*;
use crate::ChaletResult;

/// Result metric a sensitivity pass measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityMetric {
    /// Equity IRR with sale, in percent
    EquityIrr,
    /// Year-1 cash flow per owner divided by 12
    MonthlyCashFlow,
    /// Year-1 cash flow per owner over initial investment per owner, in percent
    CashOnCash,
}

impl SensitivityMetric {
    pub const ALL: [SensitivityMetric; 3] = [
        SensitivityMetric::EquityIrr,
        SensitivityMetric::MonthlyCashFlow,
        SensitivityMetric::CashOnCash,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SensitivityMetric::EquityIrr => "Equity IRR with sale (%)",
            SensitivityMetric::MonthlyCashFlow => "Monthly net cash flow per owner",
            SensitivityMetric::CashOnCash => "Cash-on-cash return (%)",
        }
    }

    fn is_year_one(&self) -> bool {
        !matches!(self, SensitivityMetric::EquityIrr)
    }
}

/// Parameters the tornado analysis can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityParameter {
    MaintenanceRate,
    ManagementFee,
    PurchasePrice,
    Occupancy,
    AverageDailyRate,
    InterestRate,
    Ltv,
    AmortizationRate,
    CleaningCost,
    LengthOfStay,
    InsuranceRate,
    Utilities,
    OwnerNights,
    SaronShare,
    SaronMargin,
    RampUpMonths,
    PropertyAppreciation,
    Inflation,
    SellingCosts,
}

/// Low and high multipliers applied to the parameter's base value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRange {
    pub parameter: SensitivityParameter,
    pub low_factor: Decimal,
    pub high_factor: Decimal,
}

impl ParameterRange {
    pub fn new(parameter: SensitivityParameter, low_factor: Decimal, high_factor: Decimal) -> Self {
        ParameterRange {
            parameter,
            low_factor,
            high_factor,
        }
    }
}

/// The standard tornado table.
pub fn default_ranges() -> Vec<ParameterRange> {
    use SensitivityParameter::*;
    vec![
        ParameterRange::new(MaintenanceRate, dec!(0), dec!(2)),
        ParameterRange::new(ManagementFee, dec!(0.75), dec!(1.25)),
        ParameterRange::new(PurchasePrice, dec!(0.9), dec!(1.1)),
        ParameterRange::new(Occupancy, dec!(0.9), dec!(1.1)),
        ParameterRange::new(AverageDailyRate, dec!(0.8), dec!(1.2)),
        ParameterRange::new(InterestRate, dec!(0.230769), dec!(1.769231)),
        ParameterRange::new(Ltv, dec!(0.9), dec!(1.1)),
        ParameterRange::new(AmortizationRate, dec!(0), dec!(2)),
        ParameterRange::new(CleaningCost, dec!(0.7), dec!(1.3)),
        ParameterRange::new(LengthOfStay, dec!(0.7), dec!(1.3)),
        ParameterRange::new(InsuranceRate, dec!(0.75), dec!(1.25)),
        ParameterRange::new(Utilities, dec!(0.7), dec!(1.3)),
        ParameterRange::new(OwnerNights, dec!(0.6), dec!(1.4)),
        ParameterRange::new(SaronShare, dec!(0.67), dec!(1.17)),
        ParameterRange::new(SaronMargin, dec!(0.75), dec!(1.25)),
        ParameterRange::new(RampUpMonths, dec!(0.43), dec!(1.71)),
        ParameterRange::new(PropertyAppreciation, dec!(0.6), dec!(1.4)),
        ParameterRange::new(Inflation, dec!(0.5), dec!(1.5)),
        ParameterRange::new(SellingCosts, dec!(0.743589), dec!(1.256410)),
    ]
}

impl SensitivityParameter {
    pub fn name(&self) -> &'static str {
        use SensitivityParameter::*;
        match self {
            MaintenanceRate => "maintenance_rate",
            ManagementFee => "management_fee",
            PurchasePrice => "purchase_price",
            Occupancy => "occupancy",
            AverageDailyRate => "average_daily_rate",
            InterestRate => "interest_rate",
            Ltv => "ltv",
            AmortizationRate => "amortization_rate",
            CleaningCost => "cleaning_cost",
            LengthOfStay => "length_of_stay",
            InsuranceRate => "insurance_rate",
            Utilities => "utilities",
            OwnerNights => "owner_nights",
            SaronShare => "saron_share",
            SaronMargin => "saron_margin",
            RampUpMonths => "ramp_up_months",
            PropertyAppreciation => "property_appreciation",
            Inflation => "inflation",
            SellingCosts => "selling_costs",
        }
    }

    fn base_value(&self, case: &InvestmentCase) -> Decimal {
        use SensitivityParameter::*;
        let c = &case.config;
        match self {
            MaintenanceRate => c.expenses.maintenance_rate,
            ManagementFee => c.expenses.property_management_fee_rate,
            PurchasePrice => c.financing.purchase_price,
            Occupancy => aggregate_occupancy(case),
            AverageDailyRate => c.rental.weighted_average_daily_rate(),
            InterestRate => c.financing.effective_interest_rate(),
            Ltv => c.financing.ltv,
            AmortizationRate => c.financing.amortization_rate,
            CleaningCost => c.expenses.cleaning_cost_per_stay,
            LengthOfStay => c.expenses.average_length_of_stay,
            InsuranceRate => {
                if c.financing.purchase_price.is_zero() {
                    Decimal::ZERO
                } else {
                    c.expenses.insurance_annual / c.financing.purchase_price
                }
            }
            Utilities => c.expenses.utilities_annual,
            OwnerNights => c.rental.owner_nights_per_person,
            SaronShare => c.financing.saron_share(),
            SaronMargin => c.financing.saron_margin().unwrap_or(Decimal::ZERO),
            RampUpMonths => Decimal::from(case.projection.ramp_up_months),
            PropertyAppreciation => case.projection.property_appreciation_rate,
            Inflation => case.projection.inflation_rate,
            SellingCosts => case.projection.selling_costs.total_rate(),
        }
    }

    fn clamp(&self, value: Decimal) -> Decimal {
        use SensitivityParameter::*;
        match self {
            PurchasePrice | PropertyAppreciation => value,
            ManagementFee | Occupancy => value.max(Decimal::ZERO).min(Decimal::ONE),
            Ltv => value.max(Decimal::ZERO).min(dec!(0.95)),
            LengthOfStay => value.max(dec!(0.1)),
            OwnerNights => value.max(Decimal::ZERO).round(),
            SaronShare => value.max(dec!(0.3)).min(dec!(0.8)),
            RampUpMonths => value.max(Decimal::ZERO).min(dec!(18)).round(),
            SellingCosts => value.max(dec!(0.05)),
            _ => value.max(Decimal::ZERO),
        }
    }

    /// Whether moving this parameter can change `metric` for `case`.
    fn applies_to(&self, case: &InvestmentCase, metric: SensitivityMetric) -> bool {
        use SensitivityParameter::*;
        let f = &case.config.financing;
        match self {
            PropertyAppreciation | Inflation | SellingCosts => !metric.is_year_one(),
            SaronShare => {
                let share = f.saron_share();
                share > Decimal::ZERO && share < Decimal::ONE
            }
            SaronMargin => f.saron_margin().is_some(),
            _ => true,
        }
    }

    /// A new case with this parameter set to `value`; `base_value` is the
    /// unperturbed value, used to derive scale factors.
    fn apply(
        &self,
        case: &InvestmentCase,
        value: Decimal,
        base_value: Decimal,
    ) -> ChaletResult<InvestmentCase> {
        use SensitivityParameter::*;
        let mut out = case.clone();
        let mut o = ConfigOverrides::default();
        match self {
            MaintenanceRate => o.maintenance_rate = Some(value),
            ManagementFee => o.management_fee_rate = Some(value),
            PurchasePrice => o.purchase_price = Some(value),
            Occupancy => {
                if case.config.rental.is_seasonal() && base_value > Decimal::ZERO {
                    let factor = value / base_value;
                    for s in &case.config.rental.seasons {
                        let occ = (s.occupancy_rate * factor).max(Decimal::ZERO).min(Decimal::ONE);
                        o.season_occupancy.insert(s.name.clone(), occ);
                    }
                } else {
                    o.occupancy_rate = Some(value);
                }
            }
            AverageDailyRate => o.average_daily_rate = Some(value),
            InterestRate => o.interest_rate = Some(value),
            Ltv => o.ltv = Some(value),
            AmortizationRate => o.amortization_rate = Some(value),
            CleaningCost => o.cleaning_cost_per_stay = Some(value),
            LengthOfStay => o.average_length_of_stay = Some(value),
            InsuranceRate => o.insurance_rate = Some(value),
            Utilities => o.utilities_annual = Some(value),
            OwnerNights => o.owner_nights_per_person = Some(value),
            SaronShare => o.saron_share = Some(value),
            SaronMargin => o.saron_margin = Some(value),
            RampUpMonths => {
                out.projection.ramp_up_months = value.to_u32().unwrap_or(0);
            }
            PropertyAppreciation => out.projection.property_appreciation_rate = value,
            Inflation => out.projection.inflation_rate = value,
            SellingCosts => {
                if base_value > Decimal::ZERO {
                    let factor = value / base_value;
                    let sc = &mut out.projection.selling_costs;
                    sc.broker_rate *= factor;
                    sc.notary_rate *= factor;
                    sc.transfer_tax_rate *= factor;
                } else {
                    out.projection.selling_costs.transfer_tax_rate = value;
                }
            }
        }
        out.config = out.config.with_overrides(&o)?;
        out.projection.validate()?;
        Ok(out)
    }
}

/// Rented nights over rentable nights; the legacy rate without seasons.
fn aggregate_occupancy(case: &InvestmentCase) -> Decimal {
    let rental = &case.config.rental;
    if !rental.is_seasonal() {
        return rental.occupancy_rate;
    }
    let rentable = rental.rentable_nights();
    if rentable.is_zero() {
        Decimal::ZERO
    } else {
        rental.rented_nights() / rentable
    }
}

/// Value of `metric` for `case`.
pub fn evaluate_metric(case: &InvestmentCase, metric: SensitivityMetric) -> ChaletResult<Decimal> {
    let config = &case.config;
    match metric {
        SensitivityMetric::EquityIrr => {
            let params = ProjectionParams::from_assumptions(&case.projection);
            let outcome = run_chain(config, &params, &case.projection)?;
            Ok(outcome.returns.equity_irr_with_sale_pct)
        }
        SensitivityMetric::MonthlyCashFlow | SensitivityMetric::CashOnCash => {
            let mut params = ProjectionParams::from_assumptions(&case.projection);
            params.projection_years = 1;
            let rows = compute_projection(config, &params)?;
            let cf = rows
                .first()
                .map(|r| r.cash_flow_per_owner)
                .unwrap_or(Decimal::ZERO);
            if metric == SensitivityMetric::MonthlyCashFlow {
                Ok(cf / dec!(12))
            } else {
                let invested = config.financing.total_initial_investment_per_owner();
                if invested.is_zero() {
                    return Err(ChaletError::DivisionByZero {
                        context: "cash-on-cash: initial investment per owner".into(),
                    });
                }
                Ok(cf / invested * dec!(100))
            }
        }
    }
}

/// Input for a one-at-a-time sensitivity pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    pub case: InvestmentCase,
    pub metric: SensitivityMetric,
    /// Defaults to [`default_ranges`]
    #[serde(default)]
    pub parameters: Option<Vec<ParameterRange>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityEntry {
    pub parameter: SensitivityParameter,
    pub base_value: Decimal,
    pub low_value: Decimal,
    pub low_result: Decimal,
    pub low_delta: Decimal,
    pub low_delta_pct: Decimal,
    pub high_value: Decimal,
    pub high_result: Decimal,
    pub high_delta: Decimal,
    pub high_delta_pct: Decimal,
    /// |high_result - low_result|
    pub impact: Decimal,
    pub applicable: bool,
}

/// Tornado table for one metric, sorted by descending impact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub metric: SensitivityMetric,
    pub metric_label: String,
    pub base_result: Decimal,
    pub entries: Vec<SensitivityEntry>,
}

fn delta_pct(delta: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        Decimal::ZERO
    } else {
        delta / base.abs() * dec!(100)
    }
}

fn sensitivity_pass(
    case: &InvestmentCase,
    metric: SensitivityMetric,
    ranges: &[ParameterRange],
    warnings: &mut Vec<String>,
) -> ChaletResult<SensitivityOutput> {
    let base_result = evaluate_metric(case, metric)?;
    debug!(metric = ?metric, base = %base_result, parameters = ranges.len(), "sensitivity pass");

    let mut entries = Vec::with_capacity(ranges.len());
    for range in ranges {
        let p = range.parameter;
        let base_value = p.base_value(case);

        if !p.applies_to(case, metric) {
            warnings.push(format!(
                "{} does not affect {}; reported with zero impact",
                p.name(),
                metric.label()
            ));
            entries.push(SensitivityEntry {
                parameter: p,
                base_value,
                low_value: base_value,
                low_result: base_result,
                low_delta: Decimal::ZERO,
                low_delta_pct: Decimal::ZERO,
                high_value: base_value,
                high_result: base_result,
                high_delta: Decimal::ZERO,
                high_delta_pct: Decimal::ZERO,
                impact: Decimal::ZERO,
                applicable: false,
            });
            continue;
        }

        let mut side = |factor: Decimal| -> (Decimal, Decimal) {
            let value = p.clamp(base_value * factor);
            let result = p
                .apply(case, value, base_value)
                .and_then(|c| evaluate_metric(&c, metric));
            match result {
                Ok(r) => (value, r),
                Err(e) => {
                    warnings.push(format!("{} = {value}: evaluation failed: {e}", p.name()));
                    (value, base_result)
                }
            }
        };
        let (low_value, low_result) = side(range.low_factor);
        let (high_value, high_result) = side(range.high_factor);

        let low_delta = low_result - base_result;
        let high_delta = high_result - base_result;
        entries.push(SensitivityEntry {
            parameter: p,
            base_value,
            low_value,
            low_result,
            low_delta,
            low_delta_pct: delta_pct(low_delta, base_result),
            high_value,
            high_result,
            high_delta,
            high_delta_pct: delta_pct(high_delta, base_result),
            impact: (high_result - low_result).abs(),
            applicable: true,
        });
    }

    entries.sort_by(|a, b| b.impact.cmp(&a.impact));

    Ok(SensitivityOutput {
        metric,
        metric_label: metric.label().to_string(),
        base_result,
        entries,
    })
}

fn resolve_ranges(parameters: Option<&[ParameterRange]>) -> ChaletResult<Vec<ParameterRange>> {
    match parameters {
        Some([]) => Err(ChaletError::InsufficientData(
            "At least one sensitivity parameter required".into(),
        )),
        Some(list) => Ok(list.to_vec()),
        None => Ok(default_ranges()),
    }
}

/// One-at-a-time sensitivity for a single metric.
pub fn run_sensitivity(
    input: &SensitivityInput,
) -> ChaletResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    input.case.validate()?;
    let ranges = resolve_ranges(input.parameters.as_deref())?;

    let output = sensitivity_pass(&input.case, input.metric, &ranges, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-at-a-time sensitivity (tornado)",
        &serde_json::json!({
            "metric": input.metric,
            "num_parameters": ranges.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// The three standard passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllMetricsOutput {
    pub equity_irr: SensitivityOutput,
    pub monthly_cash_flow: SensitivityOutput,
    pub cash_on_cash: SensitivityOutput,
}

/// Equity IRR, monthly cash flow and cash-on-cash passes over the same ranges.
pub fn run_all_metrics(
    case: &InvestmentCase,
    parameters: Option<&[ParameterRange]>,
) -> ChaletResult<ComputationOutput<AllMetricsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    case.validate()?;
    let ranges = resolve_ranges(parameters)?;

    let output = AllMetricsOutput {
        equity_irr: sensitivity_pass(case, SensitivityMetric::EquityIrr, &ranges, &mut warnings)?,
        monthly_cash_flow: sensitivity_pass(
            case,
            SensitivityMetric::MonthlyCashFlow,
            &ranges,
            &mut warnings,
        )?,
        cash_on_cash: sensitivity_pass(
            case,
            SensitivityMetric::CashOnCash,
            &ranges,
            &mut warnings,
        )?,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-at-a-time sensitivity (tornado), three metrics",
        &serde_json::json!({
            "metrics": SensitivityMetric::ALL,
            "num_parameters": ranges.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
