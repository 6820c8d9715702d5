use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use chalet_invest_core::scenarios::sensitivity::{
    self, ParameterRange, SensitivityInput, SensitivityMetric, SensitivityParameter,
};

use crate::input::{self, CaseArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MetricArg {
    EquityIrr,
    MonthlyCashFlow,
    CashOnCash,
    /// All three passes over the same ranges
    All,
}

/// Arguments for the tornado analysis
#[derive(Args)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub case: CaseArgs,

    #[arg(long, value_enum, default_value_t = MetricArg::EquityIrr)]
    pub metric: MetricArg,

    /// Parameter range as name:low_factor:high_factor
    /// (e.g. "occupancy:0.9:1.1"); repeat for several. Replaces the
    /// standard table
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// JSON/YAML file with a list of parameter ranges
    #[arg(long)]
    pub ranges: Option<String>,
}

fn parse_range(spec: &str) -> Result<ParameterRange, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        return Err(format!(
            "Parameter range must be name:low_factor:high_factor, got '{}'",
            spec
        )
        .into());
    }
    let parameter: SensitivityParameter = serde_json::from_value(Value::String(parts[0].into()))
        .map_err(|_| format!("Unknown sensitivity parameter '{}'", parts[0]))?;
    let low: Decimal = parts[1].parse()?;
    let high: Decimal = parts[2].parse()?;
    Ok(ParameterRange::new(parameter, low, high))
}

fn collect_ranges(
    args: &SensitivityArgs,
) -> Result<Option<Vec<ParameterRange>>, Box<dyn std::error::Error>> {
    let mut ranges: Vec<ParameterRange> = match &args.ranges {
        Some(path) => input::file::read_document_as(path)?,
        None => Vec::new(),
    };
    for spec in &args.params {
        ranges.push(parse_range(spec)?);
    }
    if ranges.is_empty() {
        Ok(None)
    } else {
        Ok(Some(ranges))
    }
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let case = input::resolve_case(&args.case)?;
    let ranges = collect_ranges(&args)?;

    let metric = match args.metric {
        MetricArg::EquityIrr => SensitivityMetric::EquityIrr,
        MetricArg::MonthlyCashFlow => SensitivityMetric::MonthlyCashFlow,
        MetricArg::CashOnCash => SensitivityMetric::CashOnCash,
        MetricArg::All => {
            let result = sensitivity::run_all_metrics(&case, ranges.as_deref())?;
            return Ok(serde_json::to_value(result)?);
        }
    };
    let result = sensitivity::run_sensitivity(&SensitivityInput {
        case,
        metric,
        parameters: ranges,
    })?;
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_range() {
        let r = parse_range("average_daily_rate:0.8:1.2").unwrap();
        assert_eq!(r.parameter, SensitivityParameter::AverageDailyRate);
        assert_eq!(r.low_factor, dec!(0.8));
        assert_eq!(r.high_factor, dec!(1.2));
    }

    #[test]
    fn test_parse_range_errors() {
        assert!(parse_range("occupancy:0.9").is_err());
        assert!(parse_range("snowfall:0.9:1.1").is_err());
        assert!(parse_range("occupancy:low:1.1").is_err());
    }
}
