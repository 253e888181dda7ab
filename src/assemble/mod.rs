//! Response assembly: summary statistics, chart spec, optional narrative.
//!
//! The assembler is the last pipeline stage and never changes what upstream
//! computed: rows pass through untouched, the summary and chart are derived
//! views. The narrative is the one non-deterministic piece; its failure
//! degrades to "no narrative" rather than failing the response.

pub mod chart;

pub use chart::build_chart;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::QueryFunction;
use crate::classifier::ChatModel;
use crate::executor::Row;
use crate::model::SummaryStats;

/// Breakdown maps carry at most this many entries.
const TOP_COMPANIES: usize = 5;

/// Rows shown to the narrative model.
const NARRATIVE_SAMPLE: usize = 10;

/// Summary statistics over the result rows.
///
/// Project listings (rows with a `"Fee"` column) get the full fee and
/// win-rate statistics; aggregate rows fall back to whichever of their
/// value columns is present, and a row set with neither still reports its
/// record count.
pub fn summarize(rows: &[Row]) -> SummaryStats {
    let mut summary = SummaryStats {
        total_records: rows.len(),
        ..Default::default()
    };
    if rows.is_empty() {
        return summary;
    }

    let mut fees: Vec<f64> = rows.iter().filter_map(|r| chart::numeric(r, "Fee")).collect();
    if fees.is_empty() {
        // Aggregate templates report totals instead of per-project fees.
        let total: f64 = rows
            .iter()
            .filter_map(|r| {
                chart::numeric(r, "total_value").or_else(|| chart::numeric(r, "total_revenue"))
            })
            .sum();
        if total > 0.0 {
            summary.total_value = Some(total);
        }
    } else {
        fees.sort_by(f64::total_cmp);
        let count = fees.len() as f64;
        summary.total_value = Some(fees.iter().sum());
        summary.avg_fee = Some(fees.iter().sum::<f64>() / count);
        summary.median_fee = Some(fees[fees.len() / 2]);
        summary.min_fee = Some(fees[0]);
        summary.max_fee = Some(fees[fees.len() - 1]);
    }

    let wins: Vec<f64> = rows
        .iter()
        .filter_map(|r| chart::numeric(r, "Win %").or_else(|| chart::numeric(r, "avg_win_rate")))
        .collect();
    if !wins.is_empty() {
        summary.avg_win_rate = Some(wins.iter().sum::<f64>() / wins.len() as f64);
    }

    summary.status_breakdown = count_by(rows, "Status");
    summary.top_companies = count_by(rows, "Company").map(|counts| {
        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(TOP_COMPANIES);
        ranked.into_iter().collect()
    });

    summary
}

fn count_by(rows: &[Row], column: &str) -> Option<BTreeMap<String, u64>> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        if let Some(Value::String(value)) = row.get(column) {
            if !value.is_empty() {
                *counts.entry(value.clone()).or_default() += 1;
            }
        }
    }
    (!counts.is_empty()).then_some(counts)
}

/// One-line result message for the response envelope.
pub fn result_message(row_count: usize) -> String {
    if row_count == 1 {
        "Found 1 result".to_string()
    } else {
        format!("Found {row_count} results")
    }
}

const NARRATIVE_SYSTEM: &str = "You are a business analyst summarizing sales pipeline query \
    results. Answer the user's question in two to four plain sentences using only the data \
    provided. Mention concrete numbers. No headings, no bullet points, no speculation beyond \
    the rows shown.";

/// One optional language-model call over the result set.
///
/// Any failure here is logged and swallowed; a response without insights is
/// still a successful response.
pub async fn narrative(
    model: &dyn ChatModel,
    question: &str,
    function: QueryFunction,
    summary: &SummaryStats,
    rows: &[Row],
) -> Option<String> {
    let sample: Vec<&Row> = rows.iter().take(NARRATIVE_SAMPLE).collect();
    let prompt = format!(
        "Question: {question}\nQuery type: {}\nSummary: {}\nFirst rows ({} of {} total): {}",
        function.name(),
        serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string()),
        sample.len(),
        rows.len(),
        serde_json::to_string(&sample).unwrap_or_else(|_| "[]".to_string()),
    );

    match model.complete(NARRATIVE_SYSTEM, &prompt).await {
        Ok(text) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                debug!("Narrative call returned empty text");
                None
            } else {
                Some(text)
            }
        }
        Err(err) => {
            warn!(error = %err, "Narrative generation failed, continuing without insights");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
