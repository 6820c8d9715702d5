use serde_json::Value;

use super::format_scalar;

/// Headline figure per command, tried in order.
const PRIORITY_PATHS: [&str; 8] = [
    "returns.equity_irr_with_sale_pct",
    "equity_irr_with_sale_pct",
    "summary.npv.mean",
    "probability_weighted.npv",
    "equity_irr.base_result",
    "base_result",
    "cash_flow_per_owner",
    "npv",
];

/// Print just the key answer value from the output.
///
/// Looks for well-known result fields by dotted path, then falls back to
/// the first field in the result object.
pub fn print_minimal(value: &Value) {
    println!("{}", minimal_value(value));
}

pub(crate) fn minimal_value(value: &Value) -> String {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for path in PRIORITY_PATHS {
        if let Some(v) = lookup(result, path) {
            if !v.is_null() {
                return format_scalar(v);
            }
        }
    }

    if let Value::Object(map) = result {
        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_scalar(val));
        }
    }
    format_scalar(result)
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_analysis_reports_equity_irr() {
        let v = json!({
            "result": {
                "annual": {},
                "returns": { "equity_irr_with_sale_pct": "4.21", "npv": "9" }
            }
        });
        assert_eq!(minimal_value(&v), "4.21");
    }

    #[test]
    fn test_monte_carlo_reports_mean_npv() {
        let v = json!({ "result": { "summary": { "npv": { "mean": 1520.25 } } } });
        assert_eq!(minimal_value(&v), "1520.25");
    }

    #[test]
    fn test_falls_back_to_first_field() {
        let v = json!({ "result": { "alpha": 1, "beta": 2 } });
        assert_eq!(minimal_value(&v), "alpha: 1");
    }
}
