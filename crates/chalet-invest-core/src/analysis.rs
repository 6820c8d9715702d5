//! End-to-end analysis: annual calculator, projection and return metrics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::cash_flow::{compute_annual_cash_flows, AnnualOptions, AnnualResult};
use crate::config::{BaseCaseConfig, InvestmentCase, ProjectionAssumptions};
use crate::projection::{compute_projection, ProjectionParams, ProjectionRow};
use crate::types::*;
use crate::valuation::{calculate_irrs_from_projection, IrrResult, ReturnsInput};
use crate::ChaletResult;

/// Totals across the horizon, per owner unless stated otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonSummary {
    pub years: u32,
    pub start_year: i32,
    pub end_year: i32,
    pub total_cash_flow_per_owner: Money,
    pub average_cash_flow_per_owner: Money,
    pub total_after_tax_cash_flow_per_owner: Money,
    /// Whole property
    pub total_net_operating_income: Money,
    /// Whole property
    pub total_interest: Money,
    /// Whole property
    pub total_amortization: Money,
    pub final_property_value: Money,
    pub final_loan_balance: Money,
    pub initial_investment_per_owner: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentAnalysis {
    pub annual: AnnualResult,
    pub projection: Vec<ProjectionRow>,
    pub returns: IrrResult,
    pub horizon: HorizonSummary,
}

/// Projection plus return metrics for one config. Shared by the
/// sensitivity, scenario and Monte Carlo drivers.
#[derive(Debug, Clone)]
pub(crate) struct ChainOutcome {
    pub projection: Vec<ProjectionRow>,
    pub returns: IrrResult,
}

pub(crate) fn run_chain(
    config: &BaseCaseConfig,
    params: &ProjectionParams,
    assumptions: &ProjectionAssumptions,
) -> ChaletResult<ChainOutcome> {
    let projection = compute_projection(config, params)?;
    let returns = returns_for(config, &projection, assumptions)?;
    Ok(ChainOutcome {
        projection,
        returns,
    })
}

pub(crate) fn returns_for(
    config: &BaseCaseConfig,
    projection: &[ProjectionRow],
    assumptions: &ProjectionAssumptions,
) -> ChaletResult<IrrResult> {
    let (final_property_value, final_loan_balance) = projection
        .last()
        .map(|r| (r.property_value, r.remaining_loan_balance))
        .unwrap_or((config.financing.purchase_price, config.financing.loan_amount()));
    let input = ReturnsInput {
        initial_equity: config.financing.total_initial_investment_per_owner(),
        final_property_value,
        final_loan_balance,
        num_owners: config.financing.num_owners,
        purchase_price: config.financing.purchase_price,
        selling_costs_rate: assumptions.selling_costs.total_rate(),
        discount_rate: assumptions.discount_rate,
    };
    calculate_irrs_from_projection(projection, &input)
}

fn summarize(
    config: &BaseCaseConfig,
    projection: &[ProjectionRow],
    returns: &IrrResult,
) -> HorizonSummary {
    let years = projection.len() as u32;
    let total_cash_flow_per_owner: Money = projection.iter().map(|r| r.cash_flow_per_owner).sum();
    HorizonSummary {
        years,
        start_year: projection.first().map_or(0, |r| r.year),
        end_year: projection.last().map_or(0, |r| r.year),
        total_cash_flow_per_owner,
        average_cash_flow_per_owner: if years > 0 {
            total_cash_flow_per_owner / Decimal::from(years)
        } else {
            Decimal::ZERO
        },
        total_after_tax_cash_flow_per_owner: projection
            .iter()
            .map(|r| r.after_tax_cash_flow_per_owner)
            .sum(),
        total_net_operating_income: projection.iter().map(|r| r.net_operating_income).sum(),
        total_interest: projection.iter().map(|r| r.interest_payment).sum(),
        total_amortization: projection.iter().map(|r| r.amortization_payment).sum(),
        final_property_value: returns.gross_sale_price,
        final_loan_balance: returns.final_loan_balance,
        initial_investment_per_owner: config.financing.total_initial_investment_per_owner(),
    }
}

/// Full deterministic analysis of one investment case.
pub fn analyze_investment(
    case: &InvestmentCase,
) -> ChaletResult<ComputationOutput<InvestmentAnalysis>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    case.validate()?;

    let config = &case.config;
    let annual = compute_annual_cash_flows(config, &AnnualOptions::default())?;
    let params = ProjectionParams::from_assumptions(&case.projection);
    let ChainOutcome {
        projection,
        returns,
    } = run_chain(config, &params, &case.projection)?;

    if !returns.equity_irr_with_sale.converged {
        warnings.push("Equity IRR (with sale) has no root in range; reported as 0".into());
    }
    if !returns.project_irr_with_sale.converged {
        warnings.push("Project IRR (with sale) has no root in range; reported as 0".into());
    }
    if annual.cash_flow_after_debt_service < Decimal::ZERO {
        warnings.push(format!(
            "Negative year-1 cash flow after debt service: {}",
            annual.cash_flow_after_debt_service.round_dp(0)
        ));
    }
    if annual.debt_coverage_ratio > Decimal::ZERO && annual.debt_coverage_ratio < Decimal::ONE {
        warnings.push(format!(
            "Debt coverage ratio below 1.0: {}",
            annual.debt_coverage_ratio.round_dp(2)
        ));
    }

    let horizon = summarize(config, &projection, &returns);
    let analysis = InvestmentAnalysis {
        annual,
        projection,
        returns,
        horizon,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Co-owned rental property: annual cash flow, multi-year projection, IRR/NPV",
        &serde_json::json!({
            "purchase_price": config.financing.purchase_price.to_string(),
            "ltv": config.financing.ltv.to_string(),
            "num_owners": config.financing.num_owners,
            "projection_years": case.projection.projection_years,
            "inflation_rate": case.projection.inflation_rate.to_string(),
            "property_appreciation_rate": case.projection.property_appreciation_rate.to_string(),
            "discount_rate": case.projection.discount_rate.to_string(),
            "selling_costs_rate": case.projection.selling_costs.total_rate().to_string(),
            "seasonal": config.rental.is_seasonal(),
        }),
        warnings,
        elapsed,
        analysis,
    ))
}
