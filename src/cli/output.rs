// Output formatting for CLI

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::cli::config::OutputFormat;

/// Format and output reports
pub struct OutputFormatter {
    format: OutputFormat,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    /// Output any serializable report in the selected format
    pub fn output<T: Serialize>(&self, report: &T, writer: &mut impl Write) -> Result<()> {
        let value = serde_json::to_value(report)?;
        match self.format {
            OutputFormat::Pretty => writeln!(writer, "{}", serde_json::to_string_pretty(&value)?)?,
            OutputFormat::Json => writeln!(writer, "{}", serde_json::to_string(&value)?)?,
            OutputFormat::KeyValue => self.output_key_value(&value, writer)?,
            OutputFormat::Table => self.output_table(&value, writer)?,
        }
        Ok(())
    }

    /// Output as key-value pairs, nested objects flattened with dotted keys
    fn output_key_value(&self, value: &serde_json::Value, writer: &mut impl Write) -> Result<()> {
        let mut items = Vec::new();
        flatten("", value, &mut items);
        items.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, value) in items {
            writeln!(writer, "{}: {}", key, value)?;
        }
        Ok(())
    }

    /// Output as table
    fn output_table(&self, value: &serde_json::Value, writer: &mut impl Write) -> Result<()> {
        if let Some(obj) = value.as_object() {
            let max_key_len = obj.keys().map(|k| k.len()).max().unwrap_or(0);

            writeln!(writer, "{}", "=".repeat(max_key_len + 30))?;

            for (key, value) in obj {
                writeln!(
                    writer,
                    "{:<width$} {}",
                    format!("{}:", key),
                    format_value(value),
                    width = max_key_len + 2
                )?;
            }

            writeln!(writer, "{}", "=".repeat(max_key_len + 30))?;
        }
        Ok(())
    }

    /// Print success message
    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            println!("✓ {}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, items: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(obj) if !obj.is_empty() => {
            for (key, nested) in obj {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&key, nested, items);
            }
        }
        serde_json::Value::Array(arr) if arr.iter().any(|v| v.is_object()) => {
            for (index, nested) in arr.iter().enumerate() {
                flatten(&format!("{}.{}", prefix, index), nested, items);
            }
        }
        other => items.push((prefix.to_string(), format_value(other))),
    }
}

/// Format a JSON value for display
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "(null)".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Array(arr) => {
            if arr.iter().all(|v| !v.is_object() && !v.is_array()) {
                let items: Vec<String> = arr.iter().map(format_value).collect();
                format!("[{}]", items.join(", "))
            } else {
                format!("[{} items]", arr.len())
            }
        }
        serde_json::Value::Object(obj) => {
            if obj.is_empty() {
                "{}".to_string()
            } else {
                format!("{{{} items}}", obj.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(format: OutputFormat, value: &serde_json::Value) -> String {
        let mut out = Vec::new();
        OutputFormatter::new(format, false).output(value, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_key_value_flattens() {
        let value = json!({
            "valid": true,
            "header": {"timestamp": 42, "chapter_pages": [0, 5]},
            "chapters": [{"page_no": 0}, {"page_no": 5}]
        });
        let out = render(OutputFormat::KeyValue, &value);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "chapters.0.page_no: 0",
                "chapters.1.page_no: 5",
                "header.chapter_pages: [0, 5]",
                "header.timestamp: 42",
                "valid: true",
            ]
        );
    }

    #[test]
    fn test_json_and_table() {
        let value = json!({"pages": 3, "hash": null});
        assert_eq!(render(OutputFormat::Json, &value).trim(), r#"{"hash":null,"pages":3}"#);

        let table = render(OutputFormat::Table, &value);
        assert!(table.contains("hash:   (null)"));
        assert!(table.starts_with("===="));
    }
}
