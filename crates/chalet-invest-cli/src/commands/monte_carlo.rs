use clap::{Args, ValueEnum};
use serde_json::Value;

use chalet_invest_core::monte_carlo::{run_monte_carlo, MonteCarloInput, PathModel, SamplingMethod};

use crate::input::{self, CaseArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SamplingArg {
    Random,
    LatinHypercube,
}

/// Arguments for the Monte Carlo simulation
#[derive(Args)]
pub struct MonteCarloArgs {
    #[command(flatten)]
    pub case: CaseArgs,

    /// JSON/YAML simulation settings (variables, correlation, paths, ...).
    /// Flags below override what the file says
    #[arg(long)]
    pub input: Option<String>,

    /// Number of trials
    #[arg(long, short = 'n')]
    pub simulations: Option<u32>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum)]
    pub sampling: Option<SamplingArg>,

    /// Realise per-trial inflation/appreciation paths, maintenance events,
    /// market shocks and refinancing with the standard model
    #[arg(long)]
    pub paths: bool,

    /// Sample every variable independently
    #[arg(long)]
    pub no_correlations: bool,

    /// Drop the per-season occupancy and rate variables
    #[arg(long)]
    pub no_seasonality: bool,

    /// Drop the utilities and maintenance variables
    #[arg(long)]
    pub no_expense_variation: bool,

    /// Run every trial on the calling thread
    #[arg(long)]
    pub sequential: bool,

    #[arg(long)]
    pub workers: Option<usize>,

    /// Record running NPV means and report whether they settled
    #[arg(long)]
    pub check_convergence: bool,

    /// Keep the per-trial rows in the output
    #[arg(long)]
    pub include_trials: bool,
}

/// Settings document plus flags, with the case slotted in.
fn build_input(
    args: &MonteCarloArgs,
    settings: Value,
    case: Value,
) -> Result<MonteCarloInput, Box<dyn std::error::Error>> {
    let mut doc = match settings {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        _ => return Err("Simulation settings must be a JSON/YAML object".into()),
    };
    doc.insert("case".into(), case);
    let mut mc: MonteCarloInput = serde_json::from_value(Value::Object(doc))?;

    if let Some(n) = args.simulations {
        mc.num_simulations = n;
    }
    if args.seed.is_some() {
        mc.seed = args.seed;
    }
    if let Some(s) = args.sampling {
        mc.sampling = match s {
            SamplingArg::Random => SamplingMethod::Random,
            SamplingArg::LatinHypercube => SamplingMethod::LatinHypercube,
        };
    }
    if args.paths && mc.paths.is_none() {
        mc.paths = Some(PathModel::default());
    }
    if args.no_correlations {
        mc.use_correlations = false;
    }
    if args.no_seasonality {
        mc.use_seasonality = false;
    }
    if args.no_expense_variation {
        mc.use_expense_variation = false;
    }
    if args.sequential {
        mc.parallel = false;
    }
    if args.workers.is_some() {
        mc.workers = args.workers;
    }
    if args.check_convergence {
        mc.check_convergence = true;
    }
    Ok(mc)
}

pub fn run_monte_carlo_cmd(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let case = input::resolve_case(&args.case)?;
    let settings = match &args.input {
        Some(path) => input::file::read_document(path)?,
        None => Value::Null,
    };
    let mc = build_input(&args, settings, serde_json::to_value(&case)?)?;
    let result = run_monte_carlo(&mc)?;

    let mut value = serde_json::to_value(result)?;
    if !args.include_trials {
        if let Some(result) = value.get_mut("result").and_then(Value::as_object_mut) {
            result.remove("trials");
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chalet_invest_core::config::InvestmentCase;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: MonteCarloArgs,
    }

    fn sample_case() -> Value {
        serde_json::to_value(InvestmentCase::default_case()).unwrap()
    }

    #[test]
    fn test_flags_override_settings() {
        let h = Harness::parse_from([
            "mc",
            "-n",
            "500",
            "--seed",
            "7",
            "--sampling",
            "latin-hypercube",
            "--paths",
            "--sequential",
        ]);
        let settings = json!({ "num_simulations": 2000, "seed": 1, "check_convergence": true });
        let mc = build_input(&h.args, settings, sample_case()).unwrap();
        assert_eq!(mc.num_simulations, 500);
        assert_eq!(mc.seed, Some(7));
        assert_eq!(mc.sampling, SamplingMethod::LatinHypercube);
        assert!(mc.paths.is_some());
        assert!(!mc.parallel);
        assert!(mc.check_convergence);
    }

    #[test]
    fn test_defaults_without_settings() {
        let h = Harness::parse_from(["mc"]);
        let mc = build_input(&h.args, Value::Null, sample_case()).unwrap();
        assert_eq!(mc.num_simulations, 10_000);
        assert!(mc.use_correlations);
        assert!(mc.paths.is_none());
    }

    #[test]
    fn test_settings_must_be_an_object() {
        let h = Harness::parse_from(["mc"]);
        assert!(build_input(&h.args, json!([1, 2]), sample_case()).is_err());
    }
}
