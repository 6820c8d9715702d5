use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::analysis::{run_chain, ChainOutcome};
use crate::config::{ConfigOverrides, InvestmentCase};
use crate::error::ChaletError;
use crate::projection::{ProjectionEvents, ProjectionParams};
use crate::types::*;
use crate::ChaletResult;

const PROBABILITY_TOLERANCE: Decimal = dec!(0.001);

/// Horizon-level changes a scenario may carry on top of config overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionOverrides {
    pub inflation_rate: Option<Rate>,
    pub property_appreciation_rate: Option<Rate>,
    pub discount_rate: Option<Rate>,
    pub projection_years: Option<u32>,
    pub ramp_up_months: Option<u32>,
    pub events: ProjectionEvents,
}

/// A named alternative world with its probability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub probability: Rate,
    #[serde(default)]
    pub overrides: ConfigOverrides,
    #[serde(default)]
    pub projection: ProjectionOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInput {
    pub case: InvestmentCase,
    pub scenarios: Vec<Scenario>,
}

/// Headline figures compared across scenarios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub equity_irr_pct: Decimal,
    /// Year-1 cash flow per owner / 12
    pub monthly_cash_flow_per_owner: Money,
    pub npv: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub probability: Rate,
    pub metrics: ScenarioMetrics,
    pub irr_converged: bool,
    pub irr_deviation: Decimal,
    pub monthly_cash_flow_deviation: Money,
    pub npv_deviation: Money,
    pub npv_deviation_pct: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutput {
    pub base: ScenarioMetrics,
    pub results: Vec<ScenarioResult>,
    pub probability_weighted: ScenarioMetrics,
}

fn metrics_of(outcome: &ChainOutcome) -> ScenarioMetrics {
    ScenarioMetrics {
        equity_irr_pct: outcome.returns.equity_irr_with_sale_pct,
        monthly_cash_flow_per_owner: outcome
            .projection
            .first()
            .map_or(Decimal::ZERO, |r| r.cash_flow_per_owner / dec!(12)),
        npv: outcome.returns.npv,
    }
}

fn evaluate(case: &InvestmentCase, events: &ProjectionEvents) -> ChaletResult<ChainOutcome> {
    let mut params = ProjectionParams::from_assumptions(&case.projection);
    params.events = events.clone();
    run_chain(&case.config, &params, &case.projection)
}

/// Build the scenario's case from the base without touching the base.
pub fn scenario_case(base: &InvestmentCase, scenario: &Scenario) -> ChaletResult<InvestmentCase> {
    let mut case = InvestmentCase {
        config: base.config.with_overrides(&scenario.overrides)?,
        projection: base.projection.clone(),
    };
    let p = &scenario.projection;
    let proj = &mut case.projection;
    if let Some(v) = p.inflation_rate {
        proj.inflation_rate = v;
    }
    if let Some(v) = p.property_appreciation_rate {
        proj.property_appreciation_rate = v;
    }
    if let Some(v) = p.discount_rate {
        proj.discount_rate = v;
    }
    if let Some(v) = p.projection_years {
        proj.projection_years = v;
    }
    if let Some(v) = p.ramp_up_months {
        proj.ramp_up_months = v;
    }
    case.projection.validate()?;
    Ok(case)
}

/// Run each named scenario through the full chain and compare it with the base.
pub fn compare_scenarios(input: &ScenarioInput) -> ChaletResult<ComputationOutput<ScenarioOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.scenarios.is_empty() {
        return Err(ChaletError::InsufficientData(
            "At least one scenario required".into(),
        ));
    }
    for s in &input.scenarios {
        if s.probability < Decimal::ZERO || s.probability > Decimal::ONE {
            return Err(ChaletError::invalid(
                format!("scenario:{} probability", s.name),
                "Probability must be between 0 and 1",
            ));
        }
    }
    let total_prob: Decimal = input.scenarios.iter().map(|s| s.probability).sum();
    if (total_prob - Decimal::ONE).abs() > PROBABILITY_TOLERANCE {
        return Err(ChaletError::invalid(
            "probabilities",
            format!("Probabilities must sum to 1.0 (got {total_prob})"),
        ));
    }
    if total_prob != Decimal::ONE {
        warnings.push(format!(
            "Probabilities sum to {total_prob}; treated as approximately 1.0"
        ));
    }

    input.case.validate()?;
    let base_outcome = evaluate(&input.case, &ProjectionEvents::default())?;
    let base = metrics_of(&base_outcome);

    let mut results = Vec::with_capacity(input.scenarios.len());
    let mut weighted = ScenarioMetrics::default();
    for scenario in &input.scenarios {
        let case = scenario_case(&input.case, scenario)?;
        let outcome = evaluate(&case, &scenario.projection.events)?;
        let metrics = metrics_of(&outcome);
        let irr_converged = outcome.returns.equity_irr_with_sale.converged;
        if !irr_converged {
            warnings.push(format!(
                "Scenario '{}': equity IRR has no root in range; reported as 0",
                scenario.name
            ));
        }

        weighted.equity_irr_pct += scenario.probability * metrics.equity_irr_pct;
        weighted.monthly_cash_flow_per_owner +=
            scenario.probability * metrics.monthly_cash_flow_per_owner;
        weighted.npv += scenario.probability * metrics.npv;

        let npv_deviation = metrics.npv - base.npv;
        results.push(ScenarioResult {
            name: scenario.name.clone(),
            probability: scenario.probability,
            irr_converged,
            irr_deviation: metrics.equity_irr_pct - base.equity_irr_pct,
            monthly_cash_flow_deviation: metrics.monthly_cash_flow_per_owner
                - base.monthly_cash_flow_per_owner,
            npv_deviation,
            npv_deviation_pct: if base.npv.is_zero() {
                Decimal::ZERO
            } else {
                npv_deviation / base.npv.abs()
            },
            metrics,
        });
    }

    let output = ScenarioOutput {
        base,
        results,
        probability_weighted: weighted,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Probability-weighted scenario comparison",
        &serde_json::json!({
            "num_scenarios": input.scenarios.len(),
            "scenarios": input.scenarios.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::MarketShock;
    use rust_decimal_macros::dec;

    fn bear_base_bull() -> ScenarioInput {
        ScenarioInput {
            case: InvestmentCase::default_case(),
            scenarios: vec![
                Scenario {
                    name: "Bear".into(),
                    description: None,
                    probability: dec!(0.25),
                    overrides: ConfigOverrides {
                        occupancy_rate: Some(dec!(0.45)),
                        ..Default::default()
                    },
                    projection: ProjectionOverrides {
                        property_appreciation_rate: Some(dec!(0.0)),
                        ..Default::default()
                    },
                },
                Scenario {
                    name: "Base".into(),
                    description: None,
                    probability: dec!(0.50),
                    overrides: ConfigOverrides::default(),
                    projection: ProjectionOverrides::default(),
                },
                Scenario {
                    name: "Bull".into(),
                    description: None,
                    probability: dec!(0.25),
                    overrides: ConfigOverrides {
                        average_daily_rate: Some(dec!(260)),
                        ..Default::default()
                    },
                    projection: ProjectionOverrides::default(),
                },
            ],
        }
    }

    #[test]
    fn test_unchanged_scenario_matches_base() {
        let out = compare_scenarios(&bear_base_bull()).unwrap();
        let base_row = &out.result.results[1];
        assert_eq!(base_row.metrics, out.result.base);
        assert_eq!(base_row.npv_deviation, Decimal::ZERO);
    }

    #[test]
    fn test_ordering_and_weighting() {
        let out = compare_scenarios(&bear_base_bull()).unwrap();
        let r = &out.result.results;
        assert!(r[0].metrics.npv < r[1].metrics.npv);
        assert!(r[2].metrics.npv > r[1].metrics.npv);
        let expected = dec!(0.25) * r[0].metrics.npv
            + dec!(0.5) * r[1].metrics.npv
            + dec!(0.25) * r[2].metrics.npv;
        assert_eq!(out.result.probability_weighted.npv, expected);
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let mut input = bear_base_bull();
        input.scenarios[0].probability = dec!(0.4);
        assert!(compare_scenarios(&input).is_err());
    }

    #[test]
    fn test_near_miss_probabilities_warn() {
        let mut input = bear_base_bull();
        input.scenarios[1].probability = dec!(0.5005);
        let out = compare_scenarios(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("approximately")));
    }

    #[test]
    fn test_scenario_events_are_applied() {
        let mut input = bear_base_bull();
        input.scenarios[1].projection.events.market_shocks.push(MarketShock {
            year: 1,
            occupancy_impact: dec!(-0.5),
            rate_impact: dec!(-0.3),
            value_impact: dec!(-0.2),
            recovery_years: 3,
        });
        let out = compare_scenarios(&input).unwrap();
        let shocked = &out.result.results[1];
        assert!(shocked.monthly_cash_flow_deviation < Decimal::ZERO);
        // base case itself carries no events
        let plain = compare_scenarios(&bear_base_bull()).unwrap();
        assert_eq!(out.result.base.npv, plain.result.base.npv);
    }
}
