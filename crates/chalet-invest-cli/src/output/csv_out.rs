use serde_json::Value;
use std::io;

use super::{flatten_scalars, format_scalar, row_cells, row_headers, row_sections};

/// Write output as CSV to stdout.
///
/// A result holding a list of rows (projection years, tornado entries,
/// scenarios, trials) is written as that list; anything else becomes a
/// two-column field/value sheet.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    for record in csv_records(value) {
        let _ = wtr.write_record(&record);
    }
    let _ = wtr.flush();
}

pub(crate) fn csv_records(value: &Value) -> Vec<Vec<String>> {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Array(rows) = result {
        return array_records(rows);
    }

    let mut sections = Vec::new();
    row_sections(result, "", &mut sections);
    if let Some((_, rows)) = sections.first() {
        return array_records(rows);
    }

    let mut cells = Vec::new();
    flatten_scalars(result, "", &mut cells);
    let mut records = vec![vec!["field".to_string(), "value".to_string()]];
    records.extend(cells.into_iter().map(|(k, v)| vec![k, v]));
    records
}

fn array_records(rows: &[Value]) -> Vec<Vec<String>> {
    if rows.is_empty() {
        return Vec::new();
    }
    if rows.iter().all(Value::is_object) {
        let headers = row_headers(rows);
        let mut records = vec![headers.clone()];
        records.extend(rows.iter().map(|r| row_cells(r, &headers)));
        records
    } else {
        rows.iter().map(|v| vec![format_scalar(v)]).collect()
    }
}
