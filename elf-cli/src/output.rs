//! Output formatting: text, json, and csv renderings of query results.

use clap::ValueEnum;
use serde_json::Value;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Key/value text for humans
    Text,
    /// JSON for scripting
    Json,
    /// CSV for list results
    Csv,
}

/// Render a JSON value in the selected format.
pub fn render(value: &Value, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Csv => Ok(render_csv(value)),
        OutputFormat::Text => Ok(render_text(value, 0)),
    }
}

fn render_csv(value: &Value) -> String {
    let Value::Array(items) = value else {
        return render_text(value, 0);
    };
    let Some(Value::Object(first)) = items.first() else {
        return items.iter().map(|v| scalar_to_string(v)).collect::<Vec<_>>().join("\n");
    };

    let headers: Vec<&String> = first.keys().collect();
    let mut out = String::new();
    out.push_str(
        &headers.iter().map(|h| csv_escape(h)).collect::<Vec<_>>().join(","),
    );
    out.push('\n');
    for item in items {
        let row: Vec<String> = headers
            .iter()
            .map(|h| {
                item.get(h.as_str())
                    .map(|v| csv_escape(&scalar_to_string(v)))
                    .unwrap_or_default()
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_text(value: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            let mut out = String::new();
            for (key, inner) in map {
                match inner {
                    Value::Object(_) | Value::Array(_) => {
                        let _ = writeln!(out, "{pad}{key}:");
                        out.push_str(&render_text(inner, indent + 1));
                    }
                    _ => {
                        let _ = writeln!(out, "{pad}{key}: {}", scalar_to_string(inner));
                    }
                }
            }
            out
        }
        Value::Array(items) => {
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                let _ = writeln!(out, "{pad}--- Item {} ---", i + 1);
                out.push_str(&render_text(item, indent));
            }
            out
        }
        other => format!("{pad}{}\n", scalar_to_string(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn csv_renders_object_arrays_with_header() {
        let value = json!([
            {"id": 1, "rule": "Always validate"},
            {"id": 2, "rule": "Say \"no\" to quoting bugs"}
        ]);
        let csv = render(&value, OutputFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "id,rule");
        assert_eq!(lines.next().unwrap(), "1,Always validate");
        assert!(lines.next().unwrap().contains("\"Say \"\"no\"\""));
    }

    #[test]
    fn text_renders_nested_maps() {
        let value = json!({"domain": "auth", "count": {"heuristics": 2}});
        let text = render(&value, OutputFormat::Text).unwrap();
        assert!(text.contains("domain: auth"));
        assert!(text.contains("heuristics: 2"));
    }
}
