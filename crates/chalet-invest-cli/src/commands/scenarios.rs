use clap::Args;
use serde_json::Value;

use chalet_invest_core::scenarios::scenario::{compare_scenarios, Scenario, ScenarioInput};

use crate::input::{self, CaseArgs};

/// Arguments for the probability-weighted scenario comparison
#[derive(Args)]
pub struct ScenariosArgs {
    #[command(flatten)]
    pub case: CaseArgs,

    /// JSON/YAML file with the list of scenarios (probabilities summing to 1)
    #[arg(long)]
    pub scenarios: String,
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let case = input::resolve_case(&args.case)?;
    let scenarios: Vec<Scenario> = input::file::read_document_as(&args.scenarios)?;
    let result = compare_scenarios(&ScenarioInput { case, scenarios })?;
    Ok(serde_json::to_value(result)?)
}
