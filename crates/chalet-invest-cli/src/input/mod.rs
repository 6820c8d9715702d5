pub mod file;
pub mod stdin;

use clap::Args;
use serde_json::Value;
use tracing::debug;

use chalet_invest_core::config::loader::{load_case, load_case_with_overrides, to_document};
use chalet_invest_core::config::InvestmentCase;

/// Where the investment case comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct CaseArgs {
    /// Assumptions document (JSON or YAML). Falls back to stdin, then to
    /// the built-in base case
    #[arg(long)]
    pub config: Option<String>,

    /// Document merged section-by-section over the assumptions
    #[arg(long)]
    pub overrides: Option<String>,
}

/// Build the investment case the flags point at.
pub fn resolve_case(args: &CaseArgs) -> Result<InvestmentCase, Box<dyn std::error::Error>> {
    let base = match &args.config {
        Some(path) => file::read_document(path)?,
        None => match stdin::read_stdin()? {
            Some(doc) => doc,
            None => {
                debug!("no assumptions document given; using the built-in base case");
                to_document(&InvestmentCase::default_case())
            }
        },
    };
    let overlay = args
        .overrides
        .as_deref()
        .map(file::read_document)
        .transpose()?;
    case_from_documents(&base, overlay.as_ref())
}

pub fn case_from_documents(
    base: &Value,
    overlay: Option<&Value>,
) -> Result<InvestmentCase, Box<dyn std::error::Error>> {
    let case = match overlay {
        Some(o) => load_case_with_overrides(base, o)?,
        None => load_case(base)?,
    };
    Ok(case)
}
