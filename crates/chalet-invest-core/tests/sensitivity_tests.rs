use chalet_invest_core::cash_flow::{compute_annual_cash_flows, AnnualOptions};
use chalet_invest_core::config::{ConfigOverrides, InvestmentCase};
use chalet_invest_core::projection::MarketShock;
use chalet_invest_core::scenarios::scenario::{
    compare_scenarios, ProjectionOverrides, Scenario, ScenarioInput,
};
use chalet_invest_core::scenarios::sensitivity::{
    default_ranges, evaluate_metric, run_all_metrics, run_sensitivity, ParameterRange,
    SensitivityInput, SensitivityMetric, SensitivityParameter,
};
use chalet_invest_core::ChaletError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Tornado
// ===========================================================================

#[test]
fn test_entries_sorted_by_impact() {
    let out = run_sensitivity(&SensitivityInput {
        case: InvestmentCase::default_case(),
        metric: SensitivityMetric::MonthlyCashFlow,
        parameters: None,
    })
    .unwrap();
    let entries = &out.result.entries;
    assert_eq!(entries.len(), default_ranges().len());
    for pair in entries.windows(2) {
        assert!(pair[0].impact >= pair[1].impact);
    }
    for e in entries {
        assert_eq!(e.impact, (e.high_result - e.low_result).abs());
    }
}

#[test]
fn test_year_one_metrics_ignore_horizon_parameters() {
    let out = run_sensitivity(&SensitivityInput {
        case: InvestmentCase::default_case(),
        metric: SensitivityMetric::CashOnCash,
        parameters: Some(vec![
            ParameterRange::new(SensitivityParameter::PropertyAppreciation, dec!(0.6), dec!(1.4)),
            ParameterRange::new(SensitivityParameter::Occupancy, dec!(0.9), dec!(1.1)),
        ]),
    })
    .unwrap();
    let appreciation = out
        .result
        .entries
        .iter()
        .find(|e| e.parameter == SensitivityParameter::PropertyAppreciation)
        .unwrap();
    assert!(!appreciation.applicable);
    assert_eq!(appreciation.impact, Decimal::ZERO);
    assert!(!out.warnings.is_empty());

    let occupancy = &out.result.entries[0];
    assert_eq!(occupancy.parameter, SensitivityParameter::Occupancy);
    assert!(occupancy.applicable);
    assert!(occupancy.high_result > occupancy.low_result);
}

#[test]
fn test_saron_parameters_need_a_saron_tranche() {
    let out = run_sensitivity(&SensitivityInput {
        case: InvestmentCase::default_case(),
        metric: SensitivityMetric::EquityIrr,
        parameters: Some(vec![ParameterRange::new(
            SensitivityParameter::SaronMargin,
            dec!(0.75),
            dec!(1.25),
        )]),
    })
    .unwrap();
    assert!(!out.result.entries[0].applicable);
}

#[test]
fn test_higher_interest_lowers_cash_flow() {
    let out = run_sensitivity(&SensitivityInput {
        case: InvestmentCase::default_case(),
        metric: SensitivityMetric::MonthlyCashFlow,
        parameters: Some(vec![ParameterRange::new(
            SensitivityParameter::InterestRate,
            dec!(0.5),
            dec!(2),
        )]),
    })
    .unwrap();
    let e = &out.result.entries[0];
    assert_eq!(e.base_value, dec!(0.013));
    assert_eq!(e.low_value, dec!(0.0065));
    assert_eq!(e.high_value, dec!(0.026));
    assert!(e.low_delta > Decimal::ZERO);
    assert!(e.high_delta < Decimal::ZERO);
}

#[test]
fn test_empty_parameter_list_rejected() {
    let err = run_sensitivity(&SensitivityInput {
        case: InvestmentCase::default_case(),
        metric: SensitivityMetric::EquityIrr,
        parameters: Some(Vec::new()),
    })
    .unwrap_err();
    assert!(matches!(err, ChaletError::InsufficientData(_)));
}

#[test]
fn test_all_metrics_share_a_base() {
    let case = InvestmentCase::default_case();
    let ranges = vec![ParameterRange::new(
        SensitivityParameter::CleaningCost,
        dec!(0.7),
        dec!(1.3),
    )];
    let out = run_all_metrics(&case, Some(&ranges)).unwrap();
    let annual = compute_annual_cash_flows(&case.config, &AnnualOptions::default()).unwrap();

    assert_eq!(
        out.result.monthly_cash_flow.base_result,
        annual.cash_flow_per_owner / dec!(12)
    );
    assert_eq!(
        out.result.equity_irr.base_result,
        evaluate_metric(&case, SensitivityMetric::EquityIrr).unwrap()
    );
    // dearer cleaning, thinner margin
    let e = &out.result.cash_on_cash.entries[0];
    assert!(e.high_result < e.low_result);
}

// ===========================================================================
// Scenarios
// ===========================================================================

fn scenario(name: &str, probability: Decimal, overrides: ConfigOverrides) -> Scenario {
    Scenario {
        name: name.into(),
        description: None,
        probability,
        overrides,
        projection: ProjectionOverrides::default(),
    }
}

#[test]
fn test_probability_weighted_metrics() {
    let input = ScenarioInput {
        case: InvestmentCase::default_case(),
        scenarios: vec![
            scenario("base", dec!(0.5), ConfigOverrides::default()),
            scenario(
                "busy",
                dec!(0.3),
                ConfigOverrides {
                    occupancy_rate: Some(dec!(0.8)),
                    ..Default::default()
                },
            ),
            scenario(
                "quiet",
                dec!(0.2),
                ConfigOverrides {
                    occupancy_rate: Some(dec!(0.4)),
                    ..Default::default()
                },
            ),
        ],
    };
    let out = compare_scenarios(&input).unwrap().result;

    let unchanged = &out.results[0];
    assert_eq!(unchanged.metrics, out.base);
    assert_eq!(unchanged.npv_deviation, Decimal::ZERO);

    let busy = &out.results[1].metrics;
    let quiet = &out.results[2].metrics;
    assert!(busy.monthly_cash_flow_per_owner > quiet.monthly_cash_flow_per_owner);

    let expected_npv = dec!(0.5) * out.base.npv + dec!(0.3) * busy.npv + dec!(0.2) * quiet.npv;
    assert_eq!(out.probability_weighted.npv, expected_npv);
}

#[test]
fn test_probabilities_must_sum_to_one() {
    let input = ScenarioInput {
        case: InvestmentCase::default_case(),
        scenarios: vec![
            scenario("a", dec!(0.5), ConfigOverrides::default()),
            scenario("b", dec!(0.3), ConfigOverrides::default()),
        ],
    };
    match compare_scenarios(&input) {
        Err(ChaletError::InvalidInput { field, .. }) => assert_eq!(field, "probabilities"),
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn test_scenario_events_reach_the_projection() {
    let mut crash = scenario("crash", dec!(1), ConfigOverrides::default());
    crash.projection.events.market_shocks.push(MarketShock {
        year: 1,
        occupancy_impact: dec!(-0.5),
        rate_impact: dec!(-0.2),
        value_impact: dec!(-0.15),
        recovery_years: 3,
    });
    let out = compare_scenarios(&ScenarioInput {
        case: InvestmentCase::default_case(),
        scenarios: vec![crash],
    })
    .unwrap()
    .result;
    assert!(out.results[0].monthly_cash_flow_deviation < Decimal::ZERO);
    assert!(out.results[0].npv_deviation < Decimal::ZERO);
}
