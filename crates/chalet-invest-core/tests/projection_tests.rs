use chalet_invest_core::cash_flow::{compute_annual_cash_flows, AnnualOptions};
use chalet_invest_core::config::financing::{LoanTranche, TrancheRate};
use chalet_invest_core::config::{BaseCaseConfig, ConfigOverrides, ProjectionAssumptions};
use chalet_invest_core::projection::{compute_projection, ProjectionParams, SaronCycle};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn default_params() -> ProjectionParams {
    ProjectionParams::from_assumptions(&ProjectionAssumptions::default())
}

// ===========================================================================
// Row identities
// ===========================================================================

#[test]
fn test_every_row_balances() {
    let config = BaseCaseConfig::default_case();
    let rows = compute_projection(&config, &default_params()).unwrap();
    let owners = Decimal::from(config.financing.num_owners);

    assert_eq!(rows.len(), 15);
    let mut cumulative = Decimal::ZERO;
    for row in &rows {
        assert_eq!(row.debt_service, row.interest_payment + row.amortization_payment);
        assert_eq!(
            row.cash_flow_after_debt_service,
            row.net_operating_income - row.debt_service
        );
        assert_eq!(row.cash_flow_per_owner, row.cash_flow_after_debt_service / owners);
        cumulative += row.cash_flow_per_owner;
        assert_eq!(row.cumulative_cash_flow_per_owner, cumulative);
        assert_eq!(
            row.after_tax_cash_flow,
            row.cash_flow_after_debt_service + row.tax_savings_total
        );
    }
}

#[test]
fn test_year_one_equals_annual_calculator() {
    let config = BaseCaseConfig::default_case();
    let rows = compute_projection(&config, &default_params()).unwrap();
    let annual = compute_annual_cash_flows(&config, &AnnualOptions::default()).unwrap();

    assert_eq!(rows[0].year_number, 1);
    assert_eq!(rows[0].inflation_factor, Decimal::ONE);
    assert_eq!(rows[0].total_operating_expenses, annual.total_operating_expenses);
    assert_eq!(rows[0].interest_payment, annual.interest_payment);
    assert_eq!(rows[0].cash_flow_per_owner, annual.cash_flow_per_owner);
}

// ===========================================================================
// Debt and value paths
// ===========================================================================

#[test]
fn test_balance_falls_by_scheduled_amortization() {
    let config = BaseCaseConfig::default_case();
    let rows = compute_projection(&config, &default_params()).unwrap();
    // 975000 loan at 1% amortization
    assert_eq!(config.financing.loan_amount(), dec!(975000));
    assert_eq!(rows[0].amortization_payment, dec!(9750));
    assert_eq!(rows[0].remaining_loan_balance, dec!(965250));
    assert_eq!(rows[14].remaining_loan_balance, dec!(828750));
    // interest accrues on the opening balance
    assert_eq!(rows[1].interest_payment, dec!(965250) * dec!(0.013));
}

#[test]
fn test_property_value_compounds_from_year_two() {
    let config = BaseCaseConfig::default_case();
    let rows = compute_projection(&config, &default_params()).unwrap();
    let mut expected = dec!(1300000);
    for row in &rows {
        assert!(
            (row.property_value - expected).abs() < dec!(0.01),
            "year {}: {} vs {}",
            row.year_number,
            row.property_value,
            expected
        );
        expected *= dec!(1.015);
    }
}

#[test]
fn test_market_value_follows_purchase_price_not_reserve_base() {
    let base = BaseCaseConfig::default_case();
    let o = ConfigOverrides {
        property_value: Some(dec!(1500000)),
        ..Default::default()
    };
    let config = base.with_overrides(&o).unwrap();
    assert_eq!(config.expenses.property_value, dec!(1500000));

    let rows = compute_projection(&config, &default_params()).unwrap();
    let reference = compute_projection(&base, &default_params()).unwrap();
    assert_eq!(rows[0].property_value, config.financing.purchase_price);
    assert_eq!(rows[14].property_value, reference[14].property_value);
    assert_eq!(rows[14].maintenance_reserve, reference[14].maintenance_reserve);
}

#[test]
fn test_interest_rate_override_moves_tranched_loan() {
    let mut base = BaseCaseConfig::default_case();
    base.financing.loan_tranches = vec![
        LoanTranche {
            name: "fixed".into(),
            share_of_loan: dec!(0.5),
            rate: TrancheRate::Fixed { rate: dec!(0.018) },
        },
        LoanTranche {
            name: "saron".into(),
            share_of_loan: dec!(0.5),
            rate: TrancheRate::Saron { margin: dec!(0.008) },
        },
    ];
    let o = ConfigOverrides {
        interest_rate: Some(dec!(0.05)),
        ..Default::default()
    };
    let config = base.with_overrides(&o).unwrap();
    assert!((config.financing.effective_interest_rate() - dec!(0.05)).abs() < dec!(0.0000001));

    let before = compute_projection(&base, &default_params()).unwrap();
    let after = compute_projection(&config, &default_params()).unwrap();
    assert!(after[0].interest_payment > before[0].interest_payment);
    let expected = config.financing.loan_amount() * dec!(0.05);
    assert!((after[0].interest_payment - expected).abs() < dec!(0.01));
}

#[test]
fn test_inflation_series_overrides_constant_rate() {
    let config = BaseCaseConfig::default_case();
    let mut params = default_params();
    params.projection_years = 3;
    params.inflation_series = Some(vec![dec!(0.10), dec!(0)]);
    let rows = compute_projection(&config, &params).unwrap();

    assert_eq!(rows[0].inflation_factor, Decimal::ONE);
    assert_eq!(rows[1].inflation_factor, dec!(1.10));
    assert_eq!(rows[2].inflation_factor, dec!(1.10));
    assert_eq!(
        rows[1].gross_rental_income,
        rows[0].gross_rental_income * dec!(1.10)
    );
}

#[test]
fn test_saron_cycle_keeps_rate_in_band() {
    let mut config = BaseCaseConfig::default_case();
    config.financing.saron_reference_rate = dec!(0.01);
    let mut params = default_params();
    params.events.saron_cycle = Some(SaronCycle {
        min_rate: dec!(0.0),
        max_rate: dec!(0.02),
        cycle_years: 8,
    });
    let rows = compute_projection(&config, &params).unwrap();
    // no tranches: the whole loan is fixed, the cycle has nothing to move
    assert!(rows.iter().all(|r| r.interest_rate == dec!(0.013)));

    config.financing.loan_tranches = vec![
        LoanTranche {
            name: "fixed".into(),
            share_of_loan: dec!(0.5),
            rate: TrancheRate::Fixed { rate: dec!(0.015) },
        },
        LoanTranche {
            name: "saron".into(),
            share_of_loan: dec!(0.5),
            rate: TrancheRate::Saron { margin: dec!(0.008) },
        },
    ];
    let rows = compute_projection(&config, &params).unwrap();
    // blended rate spans 0.5 * 0.015 + 0.5 * (0.008 + [0, 0.02])
    for row in &rows {
        assert!(row.interest_rate >= dec!(0.0115) - dec!(0.000001), "{}", row.interest_rate);
        assert!(row.interest_rate <= dec!(0.0215) + dec!(0.000001), "{}", row.interest_rate);
    }
    assert!(rows.iter().any(|r| r.interest_rate != rows[0].interest_rate));
}

#[test]
fn test_more_owners_smaller_shares() {
    let base = BaseCaseConfig::default_case();
    let mut wider = base.clone();
    wider.financing.num_owners = 5;
    wider.rental.num_owners = 5;
    let a = compute_projection(&base, &default_params()).unwrap();
    let b = compute_projection(&wider, &default_params()).unwrap();
    assert_eq!(a[0].debt_service, b[0].debt_service);
    assert_eq!(
        b[0].cash_flow_per_owner,
        b[0].cash_flow_after_debt_service / dec!(5)
    );
}
