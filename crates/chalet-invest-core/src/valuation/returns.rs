use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::irr::{calculate_irr, IrrSolution};
use crate::error::ChaletError;
use crate::projection::ProjectionRow;
use crate::types::{Money, Rate};
use crate::ChaletResult;

/// Exit and discounting inputs for [`calculate_irrs_from_projection`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    /// Equity put in by one owner at t = 0
    pub initial_equity: Money,
    pub final_property_value: Money,
    pub final_loan_balance: Money,
    pub num_owners: u32,
    pub purchase_price: Money,
    pub selling_costs_rate: Rate,
    pub discount_rate: Rate,
}

/// Return metrics for one owner. IRRs are percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrResult {
    pub equity_irr_with_sale_pct: Decimal,
    pub equity_irr_without_sale_pct: Decimal,
    pub project_irr_with_sale_pct: Decimal,
    pub project_irr_without_sale_pct: Decimal,
    pub equity_irr_with_sale: IrrSolution,
    pub equity_irr_without_sale: IrrSolution,
    pub project_irr_with_sale: IrrSolution,
    pub project_irr_without_sale: IrrSolution,
    pub discount_rate: Rate,
    pub npv: Money,
    pub moic: Decimal,
    /// First year cumulative cash flow (including the outlay) turns
    /// non-negative; the final year when only the sale gets it there
    pub payback_period_years: Option<u32>,
    pub gross_sale_price: Money,
    pub selling_costs_rate: Rate,
    pub selling_costs: Money,
    pub net_sale_price: Money,
    pub final_loan_balance: Money,
    pub sale_proceeds_per_owner: Money,
}

impl IrrResult {
    /// True when every IRR came out of a real root rather than the zero fallback.
    pub fn all_converged(&self) -> bool {
        self.equity_irr_with_sale.converged
            && self.equity_irr_without_sale.converged
            && self.project_irr_with_sale.converged
            && self.project_irr_without_sale.converged
    }
}

fn pct(solution: &IrrSolution) -> Decimal {
    solution.rate * Decimal::ONE_HUNDRED
}

/// Equity and project IRRs, NPV, MOIC and payback from a projection.
pub fn calculate_irrs_from_projection(
    projection: &[ProjectionRow],
    input: &ReturnsInput,
) -> ChaletResult<IrrResult> {
    if projection.is_empty() {
        return Err(ChaletError::InsufficientData(
            "Return metrics need at least one projected year".into(),
        ));
    }
    if input.num_owners < 1 {
        return Err(ChaletError::invalid("num_owners", "At least one owner is required"));
    }
    if input.discount_rate <= -Decimal::ONE {
        return Err(ChaletError::invalid(
            "discount_rate",
            "Discount rate must be greater than -100%",
        ));
    }

    let owners = Decimal::from(input.num_owners);
    let equity_flows: Vec<Money> = projection.iter().map(|r| r.cash_flow_per_owner).collect();
    let project_flows: Vec<Money> = projection
        .iter()
        .map(|r| r.net_operating_income / owners)
        .collect();

    let selling_costs = input.final_property_value * input.selling_costs_rate;
    let net_sale_price = input.final_property_value - selling_costs;
    let sale_proceeds_per_owner = (net_sale_price - input.final_loan_balance) / owners;
    let project_sale_per_owner = net_sale_price / owners;
    let project_initial = input.purchase_price / owners;

    let equity_irr_with_sale =
        calculate_irr(&equity_flows, input.initial_equity, sale_proceeds_per_owner);
    let equity_irr_without_sale = calculate_irr(&equity_flows, input.initial_equity, Decimal::ZERO);
    let project_irr_with_sale =
        calculate_irr(&project_flows, project_initial, project_sale_per_owner);
    let project_irr_without_sale = calculate_irr(&project_flows, project_initial, Decimal::ZERO);

    let one_plus_r = Decimal::ONE + input.discount_rate;
    let mut discount = Decimal::ONE;
    let mut npv = -input.initial_equity;
    for cf in &equity_flows {
        discount *= one_plus_r;
        npv += cf / discount;
    }
    npv += sale_proceeds_per_owner / discount;

    let total_returned: Money =
        equity_flows.iter().copied().sum::<Money>() + sale_proceeds_per_owner;
    let moic = if input.initial_equity > Decimal::ZERO {
        total_returned / input.initial_equity
    } else {
        Decimal::ZERO
    };

    let mut cumulative = -input.initial_equity;
    let mut payback_period_years = None;
    for (i, cf) in equity_flows.iter().enumerate() {
        cumulative += cf;
        if cumulative >= Decimal::ZERO {
            payback_period_years = Some(i as u32 + 1);
            break;
        }
    }
    if payback_period_years.is_none() && cumulative + sale_proceeds_per_owner >= Decimal::ZERO {
        payback_period_years = Some(equity_flows.len() as u32);
    }

    Ok(IrrResult {
        equity_irr_with_sale_pct: pct(&equity_irr_with_sale),
        equity_irr_without_sale_pct: pct(&equity_irr_without_sale),
        project_irr_with_sale_pct: pct(&project_irr_with_sale),
        project_irr_without_sale_pct: pct(&project_irr_without_sale),
        equity_irr_with_sale,
        equity_irr_without_sale,
        project_irr_with_sale,
        project_irr_without_sale,
        discount_rate: input.discount_rate,
        npv,
        moic,
        payback_period_years,
        gross_sale_price: input.final_property_value,
        selling_costs_rate: input.selling_costs_rate,
        selling_costs,
        net_sale_price,
        final_loan_balance: input.final_loan_balance,
        sale_proceeds_per_owner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaseCaseConfig, ProjectionAssumptions};
    use crate::projection::{compute_projection, ProjectionParams};
    use rust_decimal_macros::dec;

    fn sample_returns() -> (Vec<ProjectionRow>, ReturnsInput) {
        let config = BaseCaseConfig::default_case();
        let rows = compute_projection(
            &config,
            &ProjectionParams::from_assumptions(&ProjectionAssumptions::default()),
        )
        .unwrap();
        let last = rows.last().unwrap();
        let input = ReturnsInput {
            initial_equity: config.financing.equity_per_owner(),
            final_property_value: last.property_value,
            final_loan_balance: last.remaining_loan_balance,
            num_owners: 4,
            purchase_price: config.financing.purchase_price,
            selling_costs_rate: dec!(0.078),
            discount_rate: dec!(0.05),
        };
        (rows, input)
    }

    #[test]
    fn test_sale_decomposition() {
        let (rows, input) = sample_returns();
        let r = calculate_irrs_from_projection(&rows, &input).unwrap();
        assert_eq!(r.selling_costs, input.final_property_value * dec!(0.078));
        assert_eq!(r.net_sale_price, r.gross_sale_price - r.selling_costs);
        assert_eq!(
            r.sale_proceeds_per_owner,
            (r.net_sale_price - input.final_loan_balance) / dec!(4)
        );
    }

    #[test]
    fn test_base_case_irr_flags() {
        let (rows, input) = sample_returns();
        let r = calculate_irrs_from_projection(&rows, &input).unwrap();
        // the sale brings a real root into range
        assert!(r.equity_irr_with_sale.converged);
        assert_eq!(
            r.equity_irr_with_sale_pct,
            r.equity_irr_with_sale.rate * dec!(100)
        );
        // every base-case year loses money, so without the sale there is no root
        if rows.iter().all(|row| row.cash_flow_per_owner < Decimal::ZERO) {
            assert!(!r.equity_irr_without_sale.converged);
            assert_eq!(r.equity_irr_without_sale_pct, Decimal::ZERO);
            assert!(!r.all_converged());
        }
    }

    #[test]
    fn test_moic_definition() {
        let (rows, input) = sample_returns();
        let r = calculate_irrs_from_projection(&rows, &input).unwrap();
        let total: Decimal = rows.iter().map(|row| row.cash_flow_per_owner).sum();
        assert_eq!(r.moic, (total + r.sale_proceeds_per_owner) / input.initial_equity);
    }

    #[test]
    fn test_payback_in_early_year() {
        let (mut rows, mut input) = sample_returns();
        rows.truncate(3);
        input.initial_equity = dec!(100);
        for row in &mut rows {
            row.cash_flow_per_owner = dec!(60);
        }
        let r = calculate_irrs_from_projection(&rows, &input).unwrap();
        assert_eq!(r.payback_period_years, Some(2));
    }

    #[test]
    fn test_payback_at_sale_or_never() {
        let (mut rows, mut input) = sample_returns();
        rows.truncate(3);
        input.initial_equity = dec!(1000);
        for row in &mut rows {
            row.cash_flow_per_owner = dec!(-10);
        }
        let r = calculate_irrs_from_projection(&rows, &input).unwrap();
        // sale proceeds are large enough to recover the outlay
        assert_eq!(r.payback_period_years, Some(3));

        input.final_property_value = Decimal::ZERO;
        let r = calculate_irrs_from_projection(&rows, &input).unwrap();
        assert_eq!(r.payback_period_years, None);
    }

    #[test]
    fn test_empty_projection() {
        let (_, input) = sample_returns();
        assert!(calculate_irrs_from_projection(&[], &input).is_err());
    }
}
