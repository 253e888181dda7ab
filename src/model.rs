//! Core value types shared across the pipeline
//!
//! Everything here is a plain serde type: the request/response envelopes,
//! the conversation context a caller re-threads between turns, the merged
//! filter map, and the chart/summary structures the assembler fills in.
//! Behavior lives in the modules that produce these values.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// Incoming question plus the optional prior turn for follow-ups.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
    #[serde(rename = "previousContext", alias = "previous_context", default)]
    pub previous_context: Option<ConversationContext>,
}

/// The prior turn's resolved call, supplied by the caller on follow-ups.
///
/// There is no server-side session state; the client threads this value
/// back verbatim. `depth` counts refinements already applied and defaults
/// to zero so contexts from older callers keep deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub question: String,
    pub function_name: String,
    pub arguments: FilterSet,
    #[serde(default)]
    pub depth: u32,
}

/// A concrete date window produced by the temporal resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
        }
    }
}

/// The merged argument map for a resolved query.
///
/// Values arrive from the language model as loose JSON, so the typed
/// getters coerce where that is safe: numeric strings parse as numbers
/// and a bare string counts as a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(serde_json::Map<String, Value>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: serde_json::Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &serde_json::Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> serde_json::Map<String, Value> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// String view of a value; numbers render through their JSON form.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// List view of a value. A bare string is treated as a singleton list;
    /// non-string array items are skipped.
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect(),
            ),
            Value::String(s) => Some(vec![s.clone()]),
            _ => None,
        }
    }

    /// Integer list view; numeric strings coerce, anything else is skipped.
    pub fn get_i64_list(&self, key: &str) -> Option<Vec<i64>> {
        let as_int = |v: &Value| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        match self.0.get(key)? {
            Value::Array(items) => Some(items.iter().filter_map(as_int).collect()),
            scalar => as_int(scalar).map(|n| vec![n]),
        }
    }

    pub fn get_date(&self, key: &str) -> Option<NaiveDate> {
        self.get_str(key)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }
}

impl FromIterator<(String, Value)> for FilterSet {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Summary statistics computed over the result rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_win_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_breakdown: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_companies: Option<BTreeMap<String, u64>>,
}

/// Chart kinds the frontend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Doughnut,
    Scatter,
    Area,
    Radar,
    Bubble,
}

/// Background color: one color for bar-style charts, a palette for pies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartColor {
    Single(String),
    Palette(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub data: Vec<f64>,
    #[serde(rename = "backgroundColor")]
    pub background_color: ChartColor,
    #[serde(rename = "borderColor", skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(rename = "borderWidth", skip_serializing_if = "Option::is_none")]
    pub border_width: Option<u32>,
}

/// Ready-to-render chart specification (Chart.js-shaped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

/// Response envelope. Failures collapse to `success: false` plus a stable
/// error code; everything else is optional so the envelope serializes
/// without noise.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<FilterSet>,
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<ChartConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_params: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ConversationContext>,
}

impl QueryResponse {
    pub fn failure(err: &QueryError) -> Self {
        Self {
            success: false,
            error: Some(err.code().to_string()),
            message: Some(err.user_message()),
            ..Default::default()
        }
    }
}
