use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use super::correlation::{default_correlations, factorize, CorrelationMatrix};
use super::distributions::{Bounds, McDistribution, McVariable};
use super::paths::{PathContext, PathModel};
use super::sampling::{sample_variables, SamplingMethod};
use super::statistics::{summarize, MetricSummary};
use crate::analysis::run_chain;
use crate::cash_flow::{compute_annual_cash_flows, AnnualOptions};
use crate::config::{BaseCaseConfig, ConfigOverrides, InvestmentCase, SeasonalParams};
use crate::error::ChaletError;
use crate::projection::ProjectionParams;
use crate::types::{from_f64, to_f64, with_metadata_f64, ComputationOutput};
use crate::ChaletResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Top-level input for a Monte Carlo run over an investment case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloInput {
    pub case: InvestmentCase,
    /// Number of trials (minimum 100).
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Optional seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Replaces the default variable set when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<McVariable>>,
    /// Must list exactly the active variables. Defaults to the built-in pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationMatrix>,
    #[serde(default = "enabled")]
    pub use_seasonality: bool,
    #[serde(default = "enabled")]
    pub use_expense_variation: bool,
    #[serde(default = "enabled")]
    pub use_correlations: bool,
    #[serde(default)]
    pub sampling: SamplingMethod,
    /// Per-trial growth paths and events; off when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathModel>,
    #[serde(default = "enabled")]
    pub parallel: bool,
    /// Worker threads; defaults to available cores minus one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default)]
    pub check_convergence: bool,
}

fn default_num_simulations() -> u32 {
    10_000
}

fn enabled() -> bool {
    true
}

impl MonteCarloInput {
    pub fn new(case: InvestmentCase) -> Self {
        MonteCarloInput {
            case,
            num_simulations: default_num_simulations(),
            seed: None,
            variables: None,
            correlation: None,
            use_seasonality: true,
            use_expense_variation: true,
            use_correlations: true,
            sampling: SamplingMethod::default(),
            paths: None,
            parallel: true,
            workers: None,
            check_convergence: false,
        }
    }
}

/// One trial's sampled inputs and outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// 1-based
    pub trial: usize,
    pub sampled: BTreeMap<String, f64>,
    pub npv: f64,
    pub equity_irr_with_sale_pct: f64,
    pub equity_irr_without_sale_pct: f64,
    pub irr_converged: bool,
    /// Stabilised year-1 figures
    pub annual_cash_flow: f64,
    pub cash_flow_per_owner: f64,
    pub monthly_cash_flow_per_owner: f64,
    pub gross_rental_income: f64,
    pub net_operating_income: f64,
    pub final_property_value: f64,
    pub sale_proceeds_per_owner: f64,
    pub market_shocks: usize,
    pub maintenance_events: usize,
    pub refinanced: bool,
}

/// Distribution of each headline metric across surviving trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McSummary {
    pub npv: MetricSummary,
    pub equity_irr_with_sale_pct: MetricSummary,
    pub equity_irr_without_sale_pct: MetricSummary,
    pub annual_cash_flow: MetricSummary,
    pub cash_flow_per_owner: MetricSummary,
    pub monthly_cash_flow_per_owner: MetricSummary,
    pub gross_rental_income: MetricSummary,
    pub net_operating_income: MetricSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceCheckpoint {
    pub trials: usize,
    pub mean_npv: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceDiagnostics {
    pub interval: usize,
    pub checkpoints: Vec<ConvergenceCheckpoint>,
    /// Coefficient of variation of the last three checkpoint means
    pub final_cv: Option<f64>,
    pub converged: bool,
    /// First trial count at which a three-checkpoint window fell below 1%
    pub converged_at: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
}

/// Output of a Monte Carlo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloOutput {
    pub num_simulations: u32,
    pub completed_trials: usize,
    pub skipped_trials: usize,
    pub variables: Vec<String>,
    pub sampling: SamplingMethod,
    pub execution_mode: ExecutionMode,
    pub workers: usize,
    pub correlation_regularized: bool,
    pub summary: McSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceDiagnostics>,
    pub trials: Vec<TrialResult>,
}

// ---------------------------------------------------------------------------
// Variable set
// ---------------------------------------------------------------------------

const GLOBAL_VARIABLES: &[&str] = &[
    "occupancy_rate",
    "daily_rate",
    "management_fee_rate",
    "interest_rate",
    "ota_booking_percentage",
    "ota_fee_rate",
    "average_length_of_stay",
    "avg_guests_per_night",
    "cleaning_cost_per_stay",
    "marginal_tax_rate",
    "discount_rate",
    "inflation_rate",
    "property_appreciation",
    "utilities_annual",
    "shared_costs_annual",
    "maintenance_rate",
    "owner_nights_per_person",
    "ramp_up_months",
];

/// Variable names a run over `config` can drive.
pub fn recognised_variables(config: &BaseCaseConfig) -> Vec<String> {
    let mut names: Vec<String> = GLOBAL_VARIABLES.iter().map(|s| s.to_string()).collect();
    for s in &config.rental.seasons {
        names.push(season_variable(&s.name, "occupancy"));
        names.push(season_variable(&s.name, "rate"));
    }
    names
}

fn season_variable(season: &str, field: &str) -> String {
    format!("{season}_{field}")
}

fn triangular(min: f64, mode: f64, max: f64) -> McDistribution {
    McDistribution::Triangular { min, mode, max }
}

fn normal(mean: f64, std_dev: f64) -> McDistribution {
    McDistribution::Normal { mean, std_dev }
}

fn lognormal(median: f64, sigma: f64) -> McDistribution {
    McDistribution::LogNormal {
        mu: median.ln(),
        sigma,
    }
}

/// Occupancy and rate distributions for one season.
fn season_distributions(s: &SeasonalParams) -> (McDistribution, McDistribution, Bounds) {
    let name = s.name.to_lowercase();
    if name.contains("winter") {
        (
            triangular(0.60, 0.75, 0.90),
            normal(250.0, 40.0),
            Bounds { min: 180.0, max: 350.0 },
        )
    } else if name.contains("summer") {
        (
            triangular(0.50, 0.65, 0.80),
            normal(200.0, 30.0),
            Bounds { min: 150.0, max: 280.0 },
        )
    } else if name.contains("off") {
        (
            triangular(0.35, 0.50, 0.65),
            normal(150.0, 25.0),
            Bounds { min: 100.0, max: 220.0 },
        )
    } else {
        let occ = to_f64(s.occupancy_rate);
        let rate = to_f64(s.average_daily_rate).max(1.0);
        (
            triangular((occ - 0.15).max(0.0), occ, (occ + 0.15).min(1.0)),
            normal(rate, 0.16 * rate),
            Bounds {
                min: 0.0,
                max: 3.0 * rate,
            },
        )
    }
}

/// The built-in variable set for `config`.
pub fn default_variables(
    config: &BaseCaseConfig,
    use_seasonality: bool,
    use_expense_variation: bool,
) -> Vec<McVariable> {
    let mut vars = vec![
        McVariable::new(
            "occupancy_rate",
            McDistribution::Beta {
                alpha: 2.5,
                beta: 1.8,
                min: 0.30,
                max: 0.75,
            },
        )
        .bounded(0.30, 0.75),
        McVariable::new("daily_rate", lognormal(300.0, 0.25)).bounded(150.0, 450.0),
        McVariable::new(
            "ota_booking_percentage",
            McDistribution::Beta {
                alpha: 3.0,
                beta: 3.0,
                min: 0.3,
                max: 0.7,
            },
        )
        .bounded(0.3, 0.7),
        McVariable::new("ota_fee_rate", triangular(0.25, 0.30, 0.35)),
        McVariable::new("average_length_of_stay", lognormal(1.7, 0.15)).bounded(1.0, 3.0),
        McVariable::new("avg_guests_per_night", normal(2.0, 0.3)).bounded(1.0, 4.0),
        McVariable::new("cleaning_cost_per_stay", normal(100.0, 15.0)).bounded(60.0, 130.0),
        McVariable::new("marginal_tax_rate", triangular(0.25, 0.30, 0.35)),
        McVariable::new("discount_rate", normal(0.03, 0.005)).bounded(0.02, 0.05),
        McVariable::new("inflation_rate", normal(0.015, 0.0075)).bounded(0.0, 0.03),
        McVariable::new("property_appreciation", normal(0.035, 0.0275)).bounded(-0.02, 0.09),
        McVariable::new("ramp_up_months", triangular(4.0, 7.0, 10.0)).bounded(4.0, 10.0),
    ];

    if use_seasonality {
        for s in &config.rental.seasons {
            let (occupancy, rate, rate_bounds) = season_distributions(s);
            vars.push(McVariable::new(season_variable(&s.name, "occupancy"), occupancy));
            vars.push(
                McVariable::new(season_variable(&s.name, "rate"), rate)
                    .bounded(rate_bounds.min, rate_bounds.max),
            );
        }
    }

    if use_expense_variation {
        vars.push(
            McVariable::new("utilities_annual", lognormal(1000.0, 0.2)).bounded(600.0, 2000.0),
        );
        vars.push(McVariable::new("maintenance_rate", normal(0.01, 0.003)).bounded(0.005, 0.02));
    }
    vars
}

// ---------------------------------------------------------------------------
// Per-trial mapping
// ---------------------------------------------------------------------------

/// Sampled values routed onto the config and projection.
#[derive(Debug, Default)]
struct TrialDrivers {
    overrides: ConfigOverrides,
    discount_rate: Option<f64>,
    inflation_rate: Option<f64>,
    appreciation_rate: Option<f64>,
    ramp_up_months: Option<u32>,
}

impl TrialDrivers {
    /// Route one sampled value. Season variables are resolved against the
    /// exact `seasons` names, never by suffix.
    fn apply(&mut self, name: &str, value: f64, seasons: &[String]) {
        let d = from_f64(value).round_dp(8);
        let o = &mut self.overrides;
        match name {
            "occupancy_rate" => o.occupancy_rate = Some(d),
            "daily_rate" => o.average_daily_rate = Some(d),
            "management_fee_rate" => o.management_fee_rate = Some(d),
            "interest_rate" => o.interest_rate = Some(d),
            "ota_booking_percentage" => o.ota_booking_percentage = Some(d),
            "ota_fee_rate" => o.ota_fee_rate = Some(d),
            "average_length_of_stay" => o.average_length_of_stay = Some(d),
            "avg_guests_per_night" => o.avg_guests_per_night = Some(d),
            "cleaning_cost_per_stay" => o.cleaning_cost_per_stay = Some(d),
            "marginal_tax_rate" => o.marginal_tax_rate = Some(d),
            "utilities_annual" => o.utilities_annual = Some(d),
            "shared_costs_annual" => o.shared_costs_annual = Some(d),
            "maintenance_rate" => o.maintenance_rate = Some(d),
            "owner_nights_per_person" => o.owner_nights_per_person = Some(d.round()),
            "discount_rate" => self.discount_rate = Some(value),
            "inflation_rate" => self.inflation_rate = Some(value),
            "property_appreciation" => self.appreciation_rate = Some(value),
            "ramp_up_months" => self.ramp_up_months = Some(value.round().max(0.0) as u32),
            other => {
                for season in seasons {
                    if other == season_variable(season, "occupancy") {
                        o.season_occupancy.insert(season.clone(), d);
                    } else if other == season_variable(season, "rate") {
                        o.season_rates.insert(season.clone(), d);
                    }
                }
            }
        }
    }
}

/// Read-only state shared by every trial.
struct TrialContext<'a> {
    case: &'a InvestmentCase,
    names: &'a [String],
    seasons: &'a [String],
    paths: Option<&'a PathModel>,
}

fn run_trial(
    ctx: &TrialContext<'_>,
    index: usize,
    sample: &[f64],
    seed: u64,
) -> ChaletResult<TrialResult> {
    let mut drivers = TrialDrivers::default();
    for (name, value) in ctx.names.iter().zip(sample) {
        drivers.apply(name, *value, ctx.seasons);
    }

    let config = ctx.case.config.with_overrides(&drivers.overrides)?;
    let mut assumptions = ctx.case.projection.clone();
    if let Some(r) = drivers.discount_rate {
        assumptions.discount_rate = from_f64(r).round_dp(8);
    }
    if let Some(r) = drivers.inflation_rate {
        assumptions.inflation_rate = from_f64(r).round_dp(8);
    }
    if let Some(r) = drivers.appreciation_rate {
        assumptions.property_appreciation_rate = from_f64(r).round_dp(8);
    }
    if let Some(m) = drivers.ramp_up_months {
        assumptions.ramp_up_months = m;
    }
    assumptions.validate()?;

    let mut params = ProjectionParams::from_assumptions(&assumptions);
    let (mut shocks, mut maintenance, mut refinanced) = (0, 0, false);
    if let Some(model) = ctx.paths {
        let mut rng = StdRng::seed_from_u64(seed);
        let realised = model.realise(
            &PathContext {
                years: assumptions.projection_years,
                inflation_rate: to_f64(assumptions.inflation_rate),
                appreciation_rate: to_f64(assumptions.property_appreciation_rate),
                interest_rate: to_f64(config.financing.effective_interest_rate()),
                initial_loan: to_f64(config.financing.loan_amount()),
                annual_amortization: to_f64(config.financing.annual_amortization()),
            },
            &mut rng,
        )?;
        shocks = realised.shock_count();
        maintenance = realised.maintenance_count();
        refinanced = realised.refinanced();
        params.inflation_series = realised.inflation_series;
        params.appreciation_series = realised.appreciation_series;
        params.events = realised.events;
    }

    let outcome = run_chain(&config, &params, &assumptions)?;
    let annual = compute_annual_cash_flows(&config, &AnnualOptions::default())?;
    let r = &outcome.returns;
    let per_owner = to_f64(annual.cash_flow_per_owner);

    Ok(TrialResult {
        trial: index + 1,
        sampled: ctx
            .names
            .iter()
            .cloned()
            .zip(sample.iter().copied())
            .collect(),
        npv: to_f64(r.npv),
        equity_irr_with_sale_pct: to_f64(r.equity_irr_with_sale_pct),
        equity_irr_without_sale_pct: to_f64(r.equity_irr_without_sale_pct),
        irr_converged: r.equity_irr_with_sale.converged,
        annual_cash_flow: to_f64(annual.cash_flow_after_debt_service),
        cash_flow_per_owner: per_owner,
        monthly_cash_flow_per_owner: per_owner / 12.0,
        gross_rental_income: to_f64(annual.gross_rental_income),
        net_operating_income: to_f64(annual.net_operating_income),
        final_property_value: to_f64(r.gross_sale_price),
        sale_proceeds_per_owner: to_f64(r.sale_proceeds_per_owner),
        market_shocks: shocks,
        maintenance_events: maintenance,
        refinanced,
    })
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean.abs() < f64::EPSILON {
        return None;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(var.sqrt() / mean.abs())
}

/// Running NPV mean every `max(500, n / 20)` trials, in trial order.
pub fn convergence_diagnostics(npvs: &[f64], num_simulations: usize) -> ConvergenceDiagnostics {
    let interval = (num_simulations / 20).max(500);
    let mut checkpoints = Vec::new();
    let mut sum = 0.0;
    for (i, v) in npvs.iter().enumerate() {
        sum += v;
        let count = i + 1;
        if count % interval == 0 {
            checkpoints.push(ConvergenceCheckpoint {
                trials: count,
                mean_npv: sum / count as f64,
            });
        }
    }

    let means: Vec<f64> = checkpoints.iter().map(|c| c.mean_npv).collect();
    let converged_at = means
        .windows(3)
        .position(|w| coefficient_of_variation(w).is_some_and(|cv| cv < 0.01))
        .map(|i| checkpoints[i + 2].trials);
    let final_cv = if means.len() >= 3 {
        coefficient_of_variation(&means[means.len() - 3..])
    } else {
        None
    };

    ConvergenceDiagnostics {
        interval,
        checkpoints,
        final_cv,
        converged: final_cv.is_some_and(|cv| cv < 0.01),
        converged_at,
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

fn validate_variables(variables: &[McVariable], config: &BaseCaseConfig) -> ChaletResult<()> {
    if variables.is_empty() {
        return Err(ChaletError::invalid(
            "variables",
            "At least one variable is required",
        ));
    }
    let recognised = recognised_variables(config);
    for (i, v) in variables.iter().enumerate() {
        if !recognised.contains(&v.name) {
            return Err(ChaletError::invalid(
                "variables",
                format!("Unrecognised variable '{}'", v.name),
            ));
        }
        let is_global = GLOBAL_VARIABLES.contains(&v.name.as_str());
        let shadowing = config.rental.seasons.iter().find(|s| {
            v.name == season_variable(&s.name, "occupancy")
                || v.name == season_variable(&s.name, "rate")
        });
        if let (true, Some(season)) = (is_global, shadowing) {
            return Err(ChaletError::invalid(
                "variables",
                format!(
                    "Variable '{}' is ambiguous: season '{}' shadows a model-wide variable",
                    v.name, season.name
                ),
            ));
        }
        if variables[..i].iter().any(|other| other.name == v.name) {
            return Err(ChaletError::invalid(
                "variables",
                format!("Duplicate variable '{}'", v.name),
            ));
        }
    }
    Ok(())
}

/// Run a Monte Carlo simulation over an investment case.
///
/// Each trial samples one parameter vector through a Gaussian copula,
/// optionally realises growth paths and events, then runs the full
/// deterministic chain. Trials whose overridden config is invalid are
/// skipped and counted.
pub fn run_monte_carlo(
    input: &MonteCarloInput,
) -> ChaletResult<ComputationOutput<MonteCarloOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    if input.num_simulations < 100 {
        return Err(ChaletError::invalid(
            "num_simulations",
            "Must be at least 100",
        ));
    }
    input.case.validate()?;
    if let Some(model) = &input.paths {
        model.validate()?;
    }

    let config = &input.case.config;
    let variables = match &input.variables {
        Some(v) => v.clone(),
        None => default_variables(config, input.use_seasonality, input.use_expense_variation),
    };
    validate_variables(&variables, config)?;

    let marginals = variables
        .iter()
        .map(McVariable::compile)
        .collect::<ChaletResult<Vec<_>>>()?;
    let names: Vec<String> = variables.iter().map(|v| v.name.clone()).collect();

    // ------------------------------------------------------------------
    // Correlation
    // ------------------------------------------------------------------
    let factor = if input.use_correlations {
        let matrix = match &input.correlation {
            Some(m) => m.aligned_to(&names)?,
            None => {
                let seasons: Vec<String> =
                    config.rental.seasons.iter().map(|s| s.name.clone()).collect();
                default_correlations(&names, &seasons).matrix
            }
        };
        let f = factorize(&matrix)?;
        if f.regularized {
            warnings.push(
                "Correlation matrix was not positive-definite; diagonal regularized".into(),
            );
        }
        Some(f)
    } else {
        None
    };
    let regularized = factor.as_ref().is_some_and(|f| f.regularized);

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------
    let n = input.num_simulations as usize;
    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let samples = sample_variables(
        &marginals,
        factor.as_ref().map(|f| f.lower.as_slice()),
        n,
        input.sampling,
        &mut rng,
    )?;
    let seeds: Vec<u64> = (0..n).map(|_| rng.gen()).collect();

    // ------------------------------------------------------------------
    // Trials
    // ------------------------------------------------------------------
    let workers = input.workers.unwrap_or_else(default_workers).max(1);
    let season_names: Vec<String> =
        config.rental.seasons.iter().map(|s| s.name.clone()).collect();
    let ctx = TrialContext {
        case: &input.case,
        names: &names,
        seasons: &season_names,
        paths: input.paths.as_ref(),
    };
    let run = |i: usize| run_trial(&ctx, i, &samples.rows[i], seeds[i]);

    info!(
        trials = n,
        variables = names.len(),
        sampling = ?input.sampling,
        parallel = input.parallel,
        "starting Monte Carlo run"
    );

    let mut execution_mode = ExecutionMode::Sequential;
    let outcomes: Vec<ChaletResult<TrialResult>> = if input.parallel && n > 100 && workers > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => {
                execution_mode = ExecutionMode::Parallel;
                let chunk = (n / (workers * 4)).max(1);
                pool.install(|| {
                    (0..n)
                        .into_par_iter()
                        .with_min_len(chunk)
                        .map(run)
                        .collect()
                })
            }
            Err(e) => {
                warn!(error = %e, "worker pool unavailable; running sequentially");
                warnings.push(format!("Worker pool unavailable ({e}); ran sequentially"));
                (0..n).map(run).collect()
            }
        }
    } else {
        (0..n).map(run).collect()
    };

    let mut trials = Vec::with_capacity(n);
    let mut skipped = 0usize;
    let mut first_failure: Option<String> = None;
    for outcome in outcomes {
        match outcome {
            Ok(t) => trials.push(t),
            Err(e) => {
                skipped += 1;
                first_failure.get_or_insert_with(|| e.to_string());
            }
        }
    }
    let first_failure = first_failure.unwrap_or_default();
    if trials.is_empty() {
        return Err(ChaletError::InsufficientData(format!(
            "All {n} trials failed; first error: {first_failure}"
        )));
    }
    if skipped > 0 {
        warn!(skipped, "skipped degenerate trials");
        warnings.push(format!(
            "{skipped} of {n} trials skipped as invalid; first error: {first_failure}"
        ));
    }
    let non_converged = trials.iter().filter(|t| !t.irr_converged).count();
    if non_converged > 0 {
        warnings.push(format!(
            "{non_converged} trials had no equity IRR root in range; reported as 0"
        ));
    }

    // ------------------------------------------------------------------
    // Summary
    // ------------------------------------------------------------------
    let column = |f: fn(&TrialResult) -> f64| -> Vec<f64> { trials.iter().map(f).collect() };
    let convergence = input
        .check_convergence
        .then(|| convergence_diagnostics(&column(|t| t.npv), n));

    let summary = McSummary {
        npv: summarize("npv", &mut column(|t| t.npv)),
        equity_irr_with_sale_pct: summarize(
            "equity_irr_with_sale_pct",
            &mut column(|t| t.equity_irr_with_sale_pct),
        ),
        equity_irr_without_sale_pct: summarize(
            "equity_irr_without_sale_pct",
            &mut column(|t| t.equity_irr_without_sale_pct),
        ),
        annual_cash_flow: summarize("annual_cash_flow", &mut column(|t| t.annual_cash_flow)),
        cash_flow_per_owner: summarize(
            "cash_flow_per_owner",
            &mut column(|t| t.cash_flow_per_owner),
        ),
        monthly_cash_flow_per_owner: summarize(
            "monthly_cash_flow_per_owner",
            &mut column(|t| t.monthly_cash_flow_per_owner),
        ),
        gross_rental_income: summarize(
            "gross_rental_income",
            &mut column(|t| t.gross_rental_income),
        ),
        net_operating_income: summarize(
            "net_operating_income",
            &mut column(|t| t.net_operating_income),
        ),
    };

    info!(
        completed = trials.len(),
        skipped,
        mode = ?execution_mode,
        mean_npv = summary.npv.mean,
        "Monte Carlo run finished"
    );

    let assumptions = serde_json::json!({
        "num_simulations": input.num_simulations,
        "seed": input.seed,
        "variables": &names,
        "sampling": input.sampling,
        "use_correlations": input.use_correlations,
        "use_seasonality": input.use_seasonality,
        "use_expense_variation": input.use_expense_variation,
        "stochastic_paths": input.paths.is_some(),
        "projection_years": input.case.projection.projection_years,
    });

    let output = MonteCarloOutput {
        num_simulations: input.num_simulations,
        completed_trials: trials.len(),
        skipped_trials: skipped,
        variables: names,
        sampling: input.sampling,
        execution_mode,
        workers: match execution_mode {
            ExecutionMode::Parallel => workers,
            ExecutionMode::Sequential => 1,
        },
        correlation_regularized: regularized,
        summary,
        convergence,
        trials,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo simulation: Gaussian copula sampling over the full cash-flow and valuation chain",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn small_input(seed: u64) -> MonteCarloInput {
        MonteCarloInput {
            num_simulations: 200,
            seed: Some(seed),
            ..MonteCarloInput::new(InvestmentCase::default_case())
        }
    }

    #[test]
    fn test_too_few_simulations() {
        let input = MonteCarloInput {
            num_simulations: 50,
            ..small_input(1)
        };
        assert!(run_monte_carlo(&input).is_err());
    }

    #[test]
    fn test_default_run_completes() {
        let out = run_monte_carlo(&small_input(42)).unwrap();
        let r = &out.result;
        assert_eq!(r.completed_trials + r.skipped_trials, 200);
        assert!(r.completed_trials > 0);
        assert_eq!(r.trials.len(), r.completed_trials);
        assert_eq!(r.trials[0].trial, 1);
        assert_eq!(out.metadata.precision, "ieee754_f64");
        assert!(r.variables.contains(&"winter_peak_occupancy".to_string()));
        assert!(r.variables.contains(&"utilities_annual".to_string()));
    }

    #[test]
    fn test_seeded_runs_match_across_modes() {
        let parallel = run_monte_carlo(&MonteCarloInput {
            workers: Some(3),
            ..small_input(7)
        })
        .unwrap();
        let sequential = run_monte_carlo(&MonteCarloInput {
            parallel: false,
            ..small_input(7)
        })
        .unwrap();
        let a: Vec<f64> = parallel.result.trials.iter().map(|t| t.npv).collect();
        let b: Vec<f64> = sequential.result.trials.iter().map(|t| t.npv).collect();
        assert_eq!(a, b);
        assert_eq!(parallel.result.execution_mode, ExecutionMode::Parallel);
        assert_eq!(sequential.result.execution_mode, ExecutionMode::Sequential);
    }

    #[test]
    fn test_unknown_variable_fails_before_sampling() {
        let input = MonteCarloInput {
            variables: Some(vec![McVariable::new("snowfall", normal(1.0, 0.1))]),
            ..small_input(1)
        };
        match run_monte_carlo(&input) {
            Err(ChaletError::InvalidInput { reason, .. }) => assert!(reason.contains("snowfall")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let v = McVariable::new("interest_rate", normal(0.013, 0.002));
        let input = MonteCarloInput {
            variables: Some(vec![v.clone(), v]),
            ..small_input(1)
        };
        assert!(run_monte_carlo(&input).is_err());
    }

    #[test]
    fn test_flags_shrink_the_variable_set() {
        let config = BaseCaseConfig::default_case();
        let full = default_variables(&config, true, true);
        let lean = default_variables(&config, false, false);
        assert_eq!(lean.len(), 12);
        assert_eq!(full.len(), lean.len() + 2 * config.rental.seasons.len() + 2);
    }

    #[test]
    fn test_invalid_trials_are_skipped() {
        // part of the mass pushes the management fee above 100%
        let input = MonteCarloInput {
            variables: Some(vec![McVariable::new(
                "management_fee_rate",
                McDistribution::Uniform { min: 0.5, max: 1.5 },
            )]),
            use_correlations: false,
            ..small_input(3)
        };
        let out = run_monte_carlo(&input).unwrap();
        assert!(out.result.skipped_trials > 0);
        assert!(out.result.completed_trials > 0);
        assert!(out.warnings.iter().any(|w| w.contains("skipped")));
    }

    #[test]
    fn test_convergence_checkpoints() {
        let npvs = vec![100.0; 2000];
        let d = convergence_diagnostics(&npvs, 2000);
        assert_eq!(d.interval, 500);
        assert_eq!(d.checkpoints.len(), 4);
        assert!(d.converged);
        assert_eq!(d.converged_at, Some(1500));
    }

    #[test]
    fn test_trial_drivers_route_seasons() {
        let seasons = vec!["winter_peak".to_string()];
        let mut d = TrialDrivers::default();
        d.apply("winter_peak_occupancy", 0.8, &seasons);
        d.apply("winter_peak_rate", 260.0, &seasons);
        d.apply("ramp_up_months", 6.6, &seasons);
        assert_eq!(d.overrides.season_occupancy.len(), 1);
        assert_eq!(d.overrides.season_rates.len(), 1);
        assert_eq!(d.ramp_up_months, Some(7));
    }

    #[test]
    fn test_unlisted_season_suffix_is_ignored() {
        let seasons = vec!["winter_peak".to_string()];
        let mut d = TrialDrivers::default();
        d.apply("shoulder_rate", 180.0, &seasons);
        assert!(d.overrides.season_rates.is_empty());
        d.apply("interest_rate", 0.02, &seasons);
        assert!(d.overrides.season_rates.is_empty());
        assert_eq!(d.overrides.interest_rate, Some(dec!(0.02)));
    }

    #[test]
    fn test_season_shadowing_a_global_variable_is_rejected() {
        let mut case = InvestmentCase::default_case();
        case.config.rental.seasons[0].name = "interest".into();
        let input = MonteCarloInput {
            num_simulations: 200,
            seed: Some(5),
            variables: Some(vec![McVariable::new("interest_rate", normal(0.013, 0.002))]),
            ..MonteCarloInput::new(case)
        };
        match run_monte_carlo(&input) {
            Err(ChaletError::InvalidInput { reason, .. }) => {
                assert!(reason.contains("ambiguous"))
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }
}
