pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Scalar leaves of `value` as dotted paths, skipping arrays of objects
/// (those are rendered as their own row sections).
pub(crate) fn flatten_scalars(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_scalars(val, &path, out);
            }
        }
        Value::Array(arr) if is_row_list(arr) => {}
        _ => out.push((prefix.to_string(), format_scalar(value))),
    }
}

/// Arrays of objects inside `value`, keyed by their dotted path.
pub(crate) fn row_sections<'a>(
    value: &'a Value,
    prefix: &str,
    out: &mut Vec<(String, &'a [Value])>,
) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                row_sections(val, &path, out);
            }
        }
        Value::Array(arr) if is_row_list(arr) => out.push((prefix.to_string(), arr.as_slice())),
        _ => {}
    }
}

fn is_row_list(arr: &[Value]) -> bool {
    !arr.is_empty() && arr.iter().all(Value::is_object)
}

/// Column headers for a list of rows: the first row's scalar paths.
pub(crate) fn row_headers(rows: &[Value]) -> Vec<String> {
    let mut cells = Vec::new();
    if let Some(first) = rows.first() {
        flatten_scalars(first, "", &mut cells);
    }
    cells.into_iter().map(|(k, _)| k).collect()
}

/// One row's cells in `headers` order.
pub(crate) fn row_cells(row: &Value, headers: &[String]) -> Vec<String> {
    let mut cells = Vec::new();
    flatten_scalars(row, "", &mut cells);
    headers
        .iter()
        .map(|h| {
            cells
                .iter()
                .find(|(k, _)| k == h)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        })
        .collect()
}

pub(crate) fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_scalar).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
