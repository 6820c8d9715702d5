use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{flatten_scalars, format_scalar, row_cells, row_headers, row_sections};

/// Format output as tables using the tabled crate: one Field/Value table
/// for the scalar figures, then one table per list of rows.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result(result);
                print_envelope_notes(map);
            } else {
                print_result(value);
            }
        }
        Value::Array(arr) => print_rows(arr),
        _ => println!("{}", value),
    }
}

fn print_result(result: &Value) {
    match result {
        Value::Array(rows) => print_rows(rows),
        Value::Object(_) => {
            let mut scalars = Vec::new();
            flatten_scalars(result, "", &mut scalars);
            if !scalars.is_empty() {
                println!("{}", field_value_table(&scalars));
            }
            let mut sections = Vec::new();
            row_sections(result, "", &mut sections);
            for (name, rows) in sections {
                println!("\n{}:", name);
                print_rows(rows);
            }
        }
        other => println!("{}", format_scalar(other)),
    }
}

fn print_envelope_notes(envelope: &serde_json::Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

pub(crate) fn field_value_table(cells: &[(String, String)]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in cells {
        builder.push_record([key.as_str(), val.as_str()]);
    }
    Table::from(builder).to_string()
}

pub(crate) fn rows_table(rows: &[Value]) -> String {
    let headers = row_headers(rows);
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for row in rows {
        builder.push_record(row_cells(row, &headers));
    }
    Table::from(builder).to_string()
}

fn print_rows(rows: &[Value]) {
    if rows.is_empty() {
        println!("(empty)");
        return;
    }
    if rows.iter().all(Value::is_object) {
        println!("{}", rows_table(rows));
    } else {
        for item in rows {
            println!("{}", format_scalar(item));
        }
    }
}
