use chalet_invest_core::analysis::analyze_investment;
use chalet_invest_core::config::InvestmentCase;
use chalet_invest_core::time_value::npv;
use chalet_invest_core::valuation::{calculate_irr, IrrMethod};
use chalet_invest_core::ChaletError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Time value
// ===========================================================================

#[test]
fn test_npv_first_flow_undiscounted() {
    let v = npv(dec!(0.10), &[dec!(-1000), dec!(1100)]).unwrap();
    assert_eq!(v, Decimal::ZERO);
    let v = npv(dec!(0), &[dec!(-1000), dec!(300), dec!(300)]).unwrap();
    assert_eq!(v, dec!(-400));
}

#[test]
fn test_npv_rejects_total_loss_rate() {
    match npv(dec!(-1), &[dec!(100)]) {
        Err(ChaletError::InvalidInput { field, .. }) => assert_eq!(field, "rate"),
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

// ===========================================================================
// IRR
// ===========================================================================

#[test]
fn test_irr_zeroes_npv() {
    let flows = [dec!(50), dec!(80), dec!(120), dec!(60)];
    let irr = calculate_irr(&flows, dec!(250), dec!(0));
    assert!(irr.converged);
    assert_eq!(irr.method, IrrMethod::Bisection);

    let mut series = vec![dec!(-250)];
    series.extend(flows);
    let residual = npv(irr.rate, &series).unwrap();
    assert!(residual.abs() < dec!(0.01), "residual {residual}");
}

#[test]
fn test_higher_sale_means_higher_irr() {
    let flows = [dec!(10), dec!(10), dec!(10)];
    let low = calculate_irr(&flows, dec!(100), dec!(90));
    let high = calculate_irr(&flows, dec!(100), dec!(130));
    assert!(high.rate > low.rate);
}

// ===========================================================================
// End-to-end returns
// ===========================================================================

#[test]
fn test_returns_are_consistent_with_projection() {
    let out = analyze_investment(&InvestmentCase::default_case()).unwrap();
    let a = &out.result;
    let r = &a.returns;
    let initial = a.horizon.initial_investment_per_owner;

    // NPV rebuilt from the per-owner flows
    let mut series = vec![-initial];
    series.extend(a.projection.iter().map(|row| row.cash_flow_per_owner));
    if let Some(last) = series.last_mut() {
        *last += r.sale_proceeds_per_owner;
    }
    let rebuilt = npv(dec!(0.05), &series).unwrap();
    assert!((rebuilt - r.npv).abs() < dec!(0.000001), "{rebuilt} vs {}", r.npv);

    let total: Decimal = a.projection.iter().map(|row| row.cash_flow_per_owner).sum();
    assert_eq!(r.moic, (total + r.sale_proceeds_per_owner) / initial);

    assert_eq!(r.gross_sale_price, a.projection[14].property_value);
    assert_eq!(r.final_loan_balance, a.projection[14].remaining_loan_balance);
    assert_eq!(r.selling_costs_rate, dec!(0.078));
}

#[test]
fn test_sale_lifts_equity_irr() {
    let out = analyze_investment(&InvestmentCase::default_case()).unwrap();
    let r = &out.result.returns;
    assert!(r.equity_irr_with_sale.converged);
    if r.equity_irr_without_sale.converged {
        assert!(r.equity_irr_with_sale_pct > r.equity_irr_without_sale_pct);
    } else {
        assert_eq!(r.equity_irr_without_sale_pct, Decimal::ZERO);
    }
}

#[test]
fn test_invalid_case_is_rejected_before_computation() {
    let mut case = InvestmentCase::default_case();
    case.config.financing.ltv = dec!(1.2);
    assert!(analyze_investment(&case).is_err());
}
