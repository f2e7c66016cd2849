//! Table formatting utilities

use super::fmt_float;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, *};
use llm_eval_domain::Summary;

/// Table formatter
pub struct TableFormatter;

impl TableFormatter {
    /// Create a new table with default styling
    pub fn new() -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table
    }

    /// Create a simple table with headers and rows
    pub fn simple(headers: Vec<&str>, rows: Vec<Vec<String>>) -> String {
        let mut table = Self::new();
        table.set_header(headers);

        for row in rows {
            table.add_row(row);
        }

        table.to_string()
    }

    /// Create a key-value table
    pub fn key_value(items: Vec<(&str, String)>) -> String {
        let mut table = Self::new();

        for (key, value) in items {
            table.add_row(vec![key, &value]);
        }

        table.to_string()
    }
}

/// Render a run summary as two tables: per-model performance, then one
/// column per metric.
pub fn summary_tables(summary: &Summary) -> (String, String) {
    let performance = TableFormatter::simple(
        vec![
            "Model",
            "Attempts",
            "Succeeded",
            "Failed",
            "Avg latency (s)",
            "Avg TTFT (s)",
            "Tokens/s",
            "Avg tokens",
            "Total cost",
        ],
        summary
            .model_summaries
            .values()
            .map(|m| {
                vec![
                    m.model_id.to_string(),
                    m.attempt_count.to_string(),
                    m.success_count.to_string(),
                    m.failure_count.to_string(),
                    fmt_float(m.avg_latency, 3),
                    fmt_float(m.avg_time_to_first_token, 3),
                    fmt_float(m.avg_tokens_per_second, 1),
                    fmt_float(m.avg_tokens, 1),
                    fmt_float(m.total_cost, 4),
                ]
            })
            .collect(),
    );

    let mut headers = vec!["Model"];
    headers.extend(summary.metrics.iter().map(|m| m.as_str()));
    let scores = TableFormatter::simple(
        headers,
        summary
            .model_summaries
            .values()
            .map(|m| {
                let mut row = vec![m.model_id.to_string()];
                row.extend(summary.metrics.iter().map(|metric| {
                    m.metric_scores
                        .get(metric)
                        .map(|score| fmt_float(*score, 3))
                        .unwrap_or_else(|| "-".to_string())
                }));
                row
            })
            .collect(),
    );

    (performance, scores)
}
