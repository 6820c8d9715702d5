use clap::{Args, ValueEnum};
use serde_json::Value;

use chalet_invest_core::analysis::analyze_investment;

use crate::input::{self, CaseArgs};

/// Which part of the analysis to print
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum AnalyzeView {
    /// Everything: year-1 figures, projection, returns and horizon totals
    #[default]
    Full,
    /// Year-1 cash flow only
    Annual,
    /// One row per projected year
    Projection,
    /// IRR, NPV, MOIC and sale figures
    Returns,
}

impl AnalyzeView {
    fn key(&self) -> Option<&'static str> {
        match self {
            AnalyzeView::Full => None,
            AnalyzeView::Annual => Some("annual"),
            AnalyzeView::Projection => Some("projection"),
            AnalyzeView::Returns => Some("returns"),
        }
    }
}

/// Arguments for the deterministic analysis
#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub case: CaseArgs,

    /// Projection horizon in years (overrides the document)
    #[arg(long)]
    pub years: Option<u32>,

    #[arg(long, value_enum, default_value_t = AnalyzeView::Full)]
    pub view: AnalyzeView,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut case = input::resolve_case(&args.case)?;
    if let Some(years) = args.years {
        case.projection.projection_years = years;
    }
    let output = analyze_investment(&case)?;
    let value = serde_json::to_value(output)?;
    Ok(select_view(value, args.view))
}

/// Narrow the envelope's `result` to one section, keeping the metadata.
fn select_view(mut value: Value, view: AnalyzeView) -> Value {
    let Some(key) = view.key() else {
        return value;
    };
    if let Some(map) = value.as_object_mut() {
        if let Some(section) = map.get_mut("result").and_then(|r| r.get_mut(key)).map(Value::take) {
            map.insert("result".into(), section);
        }
    }
    value
}
