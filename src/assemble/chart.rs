//! Default chart specifications per query function.
//!
//! Every catalog entry declares its chart kind and value field; this module
//! turns a row set into the `{labels, datasets}` shape the frontend renders
//! directly. Charts are descriptive defaults: a function with no declared
//! chart, or a row set with no usable values, simply yields no chart.

use serde_json::Value;

use crate::catalog::QueryFunction;
use crate::executor::Row;
use crate::model::{ChartColor, ChartConfig, ChartDataset, ChartKind};

/// Bar and line charts render at most this many rows.
const MAX_BAR_POINTS: usize = 20;

const DEFAULT_FILL: &str = "rgba(54, 162, 235, 0.6)";
const DEFAULT_BORDER: &str = "rgba(54, 162, 235, 1)";

/// Slice palette for pie and doughnut charts, cycled when rows exceed it.
const PALETTE: [&str; 10] = [
    "rgba(255, 99, 132, 0.6)",
    "rgba(54, 162, 235, 0.6)",
    "rgba(255, 206, 86, 0.6)",
    "rgba(75, 192, 192, 0.6)",
    "rgba(153, 102, 255, 0.6)",
    "rgba(255, 159, 64, 0.6)",
    "rgba(199, 199, 199, 0.6)",
    "rgba(83, 102, 255, 0.6)",
    "rgba(255, 99, 255, 0.6)",
    "rgba(99, 255, 132, 0.6)",
];

/// Columns tried for a row's label, in priority order.
const LABEL_COLUMNS: [&str; 9] = [
    "Project Name",
    "Company",
    "tag",
    "Status",
    "size_tier",
    "size_category",
    "Request Category",
    "Client",
    "year",
];

/// Build the default chart for a function's result rows.
pub fn build_chart(function: QueryFunction, rows: &[Row]) -> Option<ChartConfig> {
    let spec = function.spec().chart?;
    if rows.is_empty() {
        return None;
    }

    let shown = match spec.kind {
        ChartKind::Pie | ChartKind::Doughnut => rows,
        _ => &rows[..rows.len().min(MAX_BAR_POINTS)],
    };

    let mut labels = Vec::with_capacity(shown.len());
    let mut data = Vec::with_capacity(shown.len());
    for row in shown {
        let Some(value) = numeric(row, spec.value_field) else {
            continue;
        };
        labels.push(label_for(row));
        data.push(value);
    }
    if data.is_empty() {
        return None;
    }

    let background_color = match spec.kind {
        ChartKind::Pie | ChartKind::Doughnut => ChartColor::Palette(
            (0..data.len())
                .map(|i| PALETTE[i % PALETTE.len()].to_string())
                .collect(),
        ),
        _ => ChartColor::Single(DEFAULT_FILL.to_string()),
    };
    let border_color = match spec.kind {
        ChartKind::Pie | ChartKind::Doughnut => None,
        _ => Some(DEFAULT_BORDER.to_string()),
    };

    Some(ChartConfig {
        kind: spec.kind,
        title: title_for(function),
        labels,
        datasets: vec![ChartDataset {
            label: Some(spec.value_field.to_string()),
            data,
            background_color,
            border_color,
            border_width: Some(1),
        }],
    })
}

/// Chart title derived from the wire name: "get_largest_projects" becomes
/// "Largest Projects".
pub fn title_for(function: QueryFunction) -> String {
    let name = function.name();
    let trimmed = name.strip_prefix("get_").unwrap_or(name);
    trimmed
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Numeric view of a row value; numeric strings coerce, commas stripped.
pub fn numeric(row: &Row, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.trim().replace([',', '$'], "");
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

fn label_for(row: &Row) -> String {
    for column in LABEL_COLUMNS {
        match row.get(column) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    "(unnamed)".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn project(name: &str, fee: Value) -> Row {
        row(&[("Project Name", json!(name)), ("Fee", fee)])
    }

    #[test]
    fn bar_chart_uses_one_fill_color_and_caps_rows() {
        let rows: Vec<Row> = (0..30)
            .map(|i| project(&format!("P{i}"), json!(1000.0 + i as f64)))
            .collect();
        let chart = build_chart(QueryFunction::GetLargestProjects, &rows).unwrap();
        assert_eq!(chart.kind, ChartKind::Bar);
        assert_eq!(chart.labels.len(), 20);
        assert_eq!(chart.title, "Largest Projects");
        assert!(matches!(
            chart.datasets[0].background_color,
            ChartColor::Single(_)
        ));
    }

    #[test]
    fn pie_chart_gets_a_palette() {
        let rows = vec![
            row(&[("Status", json!("Won")), ("project_count", json!(12))]),
            row(&[("Status", json!("Lost")), ("project_count", json!(7))]),
        ];
        let chart = build_chart(QueryFunction::GetStatusBreakdown, &rows).unwrap();
        assert_eq!(chart.kind, ChartKind::Pie);
        assert_eq!(chart.labels, vec!["Won", "Lost"]);
        assert_eq!(chart.datasets[0].data, vec![12.0, 7.0]);
        match &chart.datasets[0].background_color {
            ChartColor::Palette(colors) => assert_eq!(colors.len(), 2),
            other => panic!("expected palette, got {other:?}"),
        }
    }

    #[test]
    fn numeric_strings_coerce_into_chart_values() {
        let rows = vec![project("Terminal", json!("1,500,000"))];
        let chart = build_chart(QueryFunction::GetLargestProjects, &rows).unwrap();
        assert_eq!(chart.datasets[0].data, vec![1_500_000.0]);
    }

    #[test]
    fn rows_without_values_yield_no_chart() {
        assert!(build_chart(QueryFunction::GetLargestProjects, &[]).is_none());

        let rows = vec![project("Terminal", json!(""))];
        assert!(build_chart(QueryFunction::GetLargestProjects, &rows).is_none());
    }

    #[test]
    fn functions_without_a_chart_spec_yield_none() {
        let rows = vec![project("Terminal", json!(100.0))];
        assert!(build_chart(QueryFunction::GetAllProjects, &rows).is_none());
    }

    #[test]
    fn label_priority_prefers_project_name() {
        let mixed = row(&[
            ("Company", json!("Acme")),
            ("Project Name", json!("Terminal")),
            ("Fee", json!(5.0)),
        ]);
        assert_eq!(label_for(&mixed), "Terminal");

        let aggregate = row(&[("year", json!(2024)), ("total_revenue", json!(9.0))]);
        assert_eq!(label_for(&aggregate), "2024");
    }
}
