use colored::*;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use crate::cli::cli_args::OutputFormat;
use crate::engine::catalog::{CatalogEntry, QueryCatalog};
use crate::engine::presenter::{DurationSummary, LogReport, Presentation};
use crate::utils::{
    error::BenchError,
    types::{ResultTable, Value},
};

/// Formats results, log summaries and messages for CLI output
pub struct OutputFormatter;

impl OutputFormatter {
    /// Format a result table according to the specified format
    pub fn format_result(result: &ResultTable, format: &OutputFormat) -> String {
        let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
        let rows: Vec<Vec<Value>> = result.rows.iter().map(|r| r.values.clone()).collect();

        match format {
            OutputFormat::Table => {
                if result.is_empty() {
                    return "No results found.".dimmed().to_string();
                }
                let mut output = Self::format_table(&headers, &rows);
                output.push_str(&format!(
                    "\n{} {}\n",
                    result.row_count().to_string().green().bold(),
                    if result.row_count() == 1 { "row" } else { "rows" }
                ));
                output
            }
            OutputFormat::Json => {
                serde_json::to_string_pretty(&Self::result_json(result)).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Csv => Self::format_csv(&headers, &rows),
        }
    }

    /// Result table plus the measured query time. JSON carries the time as
    /// `metadata.duration_seconds`; CSV stays plain rows and callers report
    /// the time out of band.
    pub fn format_timed_result(result: &ResultTable, duration: Duration, format: &OutputFormat) -> String {
        match format {
            OutputFormat::Table => format!(
                "{}\n{}\n",
                Self::format_result(result, format),
                Self::format_duration(duration)
            ),
            OutputFormat::Json => {
                let mut output = Self::result_json(result);
                output["metadata"]["duration_seconds"] = json!(duration.as_secs_f64());
                serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Csv => Self::format_result(result, format),
        }
    }

    fn result_json(result: &ResultTable) -> JsonValue {
        json!({
            "data": result.to_json_rows(),
            "metadata": {
                "columns": result.columns.iter().map(|col| {
                    json!({
                        "name": col.name,
                        "type": format!("{:?}", col.data_type),
                        "nullable": col.nullable
                    })
                }).collect::<Vec<_>>(),
                "row_count": result.row_count()
            }
        })
    }

    /// One-line timing footer for a completed query
    pub fn format_duration(duration: Duration) -> String {
        let seconds = duration.as_secs_f64();
        format!(
            "Query executed in {} ({:.3} ms)",
            format!("{:.4} seconds", seconds).yellow().bold(),
            seconds * 1000.0
        )
    }

    /// Chart specification as pretty JSON, or the empty-result notice
    pub fn format_presentation(presentation: &Presentation) -> String {
        match presentation {
            Presentation::NoResults => Self::format_info("No results found for the selected filters."),
            Presentation::Chart(chart) => serde_json::to_string_pretty(chart).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// Query log summaries, one block per dataset
    pub fn format_reports(reports: &[LogReport], format: &OutputFormat, with_charts: bool) -> String {
        match format {
            OutputFormat::Json => {
                let value: Vec<JsonValue> = reports
                    .iter()
                    .map(|report| {
                        let mut entry = json!({
                            "dataset": report.dataset.label(),
                            "summary": report.summary,
                        });
                        if with_charts {
                            entry["chart"] = serde_json::to_value(&report.chart).unwrap_or(JsonValue::Null);
                        }
                        entry
                    })
                    .collect();
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Csv => {
                let mut headers = vec!["dataset".to_string()];
                headers.extend(Self::summary_headers());
                let rows: Vec<Vec<Value>> = reports
                    .iter()
                    .flat_map(|report| {
                        report.summary.iter().map(move |s| {
                            let mut row = vec![Value::Text(report.dataset.label().to_string())];
                            row.extend(Self::summary_row(s));
                            row
                        })
                    })
                    .collect();
                Self::format_csv(&headers, &rows)
            }
            OutputFormat::Table => {
                if reports.is_empty() {
                    return Self::format_info("The query log is empty.");
                }
                let mut output = String::new();
                for report in reports {
                    output.push_str(&format!("{}\n", report.dataset.label().bold()));
                    let rows: Vec<Vec<Value>> = report.summary.iter().map(Self::summary_row).collect();
                    output.push_str(&Self::format_table(&Self::summary_headers(), &rows));
                    if with_charts {
                        output.push_str(&serde_json::to_string_pretty(&report.chart).unwrap_or_default());
                        output.push('\n');
                    }
                    output.push('\n');
                }
                output
            }
        }
    }

    /// Every catalog entry with its query summary
    pub fn format_catalog(catalog: &QueryCatalog) -> String {
        let mut output = format!("{}\n", "Query Catalog:".bold());
        for (key, entry) in catalog.entries() {
            let target = format!("{} / {} / {}", key.dataset, key.backend, key.complexity);
            match entry {
                CatalogEntry::Query(descriptor) => {
                    output.push_str(&format!("  {} {}\n", "•".green(), target.cyan().bold()));
                    output.push_str(&format!("    {}\n", descriptor.summary()));
                }
                CatalogEntry::Unsupported(reason) => {
                    output.push_str(&format!("  {} {} {}\n", "•".red(), target.dimmed(), format!("({})", reason).dimmed()));
                }
            }
        }
        output
    }

    fn summary_headers() -> Vec<String> {
        ["data_source", "query_complexity", "count", "mean", "std", "min", "25%", "50%", "75%", "max"]
            .iter()
            .map(|h| h.to_string())
            .collect()
    }

    fn summary_row(summary: &DurationSummary) -> Vec<Value> {
        vec![
            Value::Text(summary.data_source.label().to_string()),
            Value::Text(summary.query_complexity.label().to_string()),
            Value::Integer(summary.count as i64),
            Value::Float(summary.mean),
            summary.std.map(Value::Float).unwrap_or(Value::Null),
            Value::Float(summary.min),
            Value::Float(summary.p25),
            Value::Float(summary.p50),
            Value::Float(summary.p75),
            Value::Float(summary.max),
        ]
    }

    /// Format rows as a colored table
    fn format_table(headers: &[String], rows: &[Vec<Value>]) -> String {
        let mut output = String::new();

        let mut col_widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, value) in row.iter().enumerate() {
                if i < col_widths.len() {
                    col_widths[i] = col_widths[i].max(value.to_string().len());
                }
            }
        }
        for width in &mut col_widths {
            *width = (*width).max(8);
        }

        output.push_str(&Self::format_table_separator(&col_widths, true));
        output.push('|');
        for (i, header) in headers.iter().enumerate() {
            output.push_str(&format!(" {:<width$} |", header.bold().cyan(), width = col_widths[i]));
        }
        output.push('\n');
        output.push_str(&Self::format_table_separator(&col_widths, false));

        for row in rows {
            output.push('|');
            for (i, value) in row.iter().enumerate() {
                if i < col_widths.len() {
                    output.push_str(&format!(
                        " {:<width$} |",
                        Self::format_value_colored(value),
                        width = col_widths[i]
                    ));
                }
            }
            output.push('\n');
        }

        output.push_str(&Self::format_table_separator(&col_widths, true));
        output
    }

    fn format_table_separator(col_widths: &[usize], is_border: bool) -> String {
        let edge = if is_border { '+' } else { '|' };
        let mut separator = String::new();
        separator.push(edge);
        for &width in col_widths {
            separator.push_str(&"-".repeat(width + 2));
            separator.push(edge);
        }
        separator.push('\n');
        separator
    }

    fn format_csv(headers: &[String], rows: &[Vec<Value>]) -> String {
        let mut output = String::new();

        let headers: Vec<String> = headers.iter().map(|h| Self::escape_csv_field(h)).collect();
        output.push_str(&headers.join(","));
        output.push('\n');

        for row in rows {
            let values: Vec<String> = row.iter().map(|v| Self::escape_csv_field(&Self::csv_value(v))).collect();
            output.push_str(&values.join(","));
            output.push('\n');
        }

        output
    }

    /// Full precision for CSV; NULL becomes an empty field
    fn csv_value(value: &Value) -> String {
        match value {
            Value::Float(f) => f.to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    fn format_value_colored(value: &Value) -> ColoredString {
        match value {
            Value::Text(s) => s.normal(),
            Value::Integer(i) => i.to_string().blue(),
            Value::Float(f) => format!("{:.2}", f).blue(),
            Value::Boolean(true) => "true".green(),
            Value::Boolean(false) => "false".red(),
            Value::Json(j) => j.magenta(),
            Value::Null => "NULL".dimmed(),
        }
    }

    /// Escape CSV field if it contains special characters
    fn escape_csv_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    /// Format error message for CLI display
    pub fn format_error(error: &BenchError) -> String {
        format!("{} {}", "Error:".red().bold(), error.to_string().red())
    }

    /// Format warning message for CLI display
    pub fn format_warning(message: &str) -> String {
        format!("{} {}", "Warning:".yellow().bold(), message)
    }

    /// Format success message for CLI display
    pub fn format_success(message: &str) -> String {
        format!("{} {}", "Success:".green().bold(), message)
    }

    /// Format info message for CLI display
    pub fn format_info(message: &str) -> String {
        format!("{} {}", "Info:".blue().bold(), message)
    }
}
