//! End-to-end pipeline tests with a scripted model and an in-memory
//! executor: classify, merge, resolve, execute and assemble without any
//! network or database.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use pipeline_nlq::catalog::ResolvedQuery;
use pipeline_nlq::classifier::{ChatModel, ToolDefinition, ToolSelection};
use pipeline_nlq::engine::{QueryEngine, StaticBoundaries};
use pipeline_nlq::executor::{ExecuteQuery, Row};
use pipeline_nlq::model::{ConversationContext, QueryRequest};
use pipeline_nlq::percentile::SizeBoundaries;

const TODAY: (i32, u32, u32) = (2024, 11, 15);

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(TODAY.0, TODAY.1, TODAY.2).unwrap()
}

// =============================================================================
// Test doubles
// =============================================================================

/// Replays a scripted sequence of tool selections; narratives either
/// succeed with a fixed sentence or fail, per construction.
struct ScriptedModel {
    selections: Mutex<VecDeque<Option<ToolSelection>>>,
    narrative: Result<&'static str, &'static str>,
}

impl ScriptedModel {
    fn selections(calls: Vec<Option<(&str, Value)>>) -> VecDeque<Option<ToolSelection>> {
        calls
            .into_iter()
            .map(|call| {
                call.map(|(name, arguments)| ToolSelection {
                    name: name.to_string(),
                    arguments,
                })
            })
            .collect()
    }

    fn selecting(calls: Vec<Option<(&str, Value)>>) -> Arc<Self> {
        Arc::new(Self {
            selections: Mutex::new(Self::selections(calls)),
            narrative: Ok("Scripted narrative."),
        })
    }

    fn with_failing_narrative(calls: Vec<Option<(&str, Value)>>) -> Arc<Self> {
        Arc::new(Self {
            selections: Mutex::new(Self::selections(calls)),
            narrative: Err("narrative endpoint down"),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn select_tool(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _tools: &[ToolDefinition],
    ) -> Result<Option<ToolSelection>> {
        self.selections
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model ran out of selections"))
    }

    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        self.narrative
            .map(str::to_string)
            .map_err(|e| anyhow!("{e}"))
    }

    fn model_name(&self) -> &str {
        "scripted-test-model"
    }
}

/// Serves a fixed row set and records the last resolved query.
struct FixedRows {
    rows: Vec<Row>,
    last: Mutex<Option<ResolvedQuery>>,
}

impl FixedRows {
    fn new(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            last: Mutex::new(None),
        })
    }

    fn last_query(&self) -> ResolvedQuery {
        self.last.lock().unwrap().clone().expect("no query executed")
    }
}

#[async_trait]
impl ExecuteQuery for FixedRows {
    async fn execute(&self, query: &ResolvedQuery) -> pipeline_nlq::QueryResult<Vec<Row>> {
        *self.last.lock().unwrap() = Some(query.clone());
        Ok(self.rows.clone())
    }
}

fn project_row(name: &str, fee: f64, status: &str) -> Row {
    [
        ("Project Name".to_string(), json!(name)),
        ("Fee".to_string(), json!(fee)),
        ("Status".to_string(), json!(status)),
        ("Company".to_string(), json!("Acme")),
        ("Win %".to_string(), json!(55.0)),
    ]
    .into_iter()
    .collect()
}

fn sample_rows() -> Vec<Row> {
    vec![
        project_row("Terminal Expansion", 12_000_000.0, "Submitted"),
        project_row("Station Modernization", 4_000_000.0, "Won"),
        project_row("Depot Upgrade", 1_000_000.0, "Submitted"),
    ]
}

fn engine(model: Arc<ScriptedModel>, executor: Arc<FixedRows>) -> QueryEngine {
    QueryEngine::new(
        model,
        executor,
        Arc::new(StaticBoundaries(SizeBoundaries::fallback())),
    )
}

fn question(text: &str) -> QueryRequest {
    QueryRequest {
        question: text.to_string(),
        previous_context: None,
    }
}

fn follow_up(text: &str, context: ConversationContext) -> QueryRequest {
    QueryRequest {
        question: text.to_string(),
        previous_context: Some(context),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn quarter_question_binds_a_concrete_date_range() {
    let model = ScriptedModel::selecting(vec![Some((
        "get_projects_by_quarter",
        json!({"year": 2024, "quarter": 3}),
    ))]);
    let executor = FixedRows::new(sample_rows());
    let engine = engine(model, Arc::clone(&executor));

    let response = engine.answer_at(&question("Projects in Q3 2024"), today()).await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(
        response.function_name.as_deref(),
        Some("get_projects_by_date_range")
    );
    let query = executor.last_query();
    assert!(query.sql.contains(r#""Start Date" BETWEEN $1 AND $2"#));
    assert_eq!(
        response.sql_params,
        Some(vec![json!("2024-07-01"), json!("2024-09-30")])
    );
    assert_eq!(response.row_count, Some(3));
    assert_eq!(response.message.as_deref(), Some("Found 3 results"));
}

#[tokio::test]
async fn top_ten_largest_ranks_by_fee_with_the_extracted_limit() {
    let model = ScriptedModel::selecting(vec![Some(("get_largest_projects", json!({})))]);
    let executor = FixedRows::new(sample_rows());
    let engine = engine(model, Arc::clone(&executor));

    let response = engine
        .answer_at(&question("Top 10 largest projects"), today())
        .await;

    assert!(response.success);
    assert_eq!(response.function_name.as_deref(), Some("get_largest_projects"));
    let query = executor.last_query();
    assert!(query.sql.contains(r#"ORDER BY CAST("Fee" AS NUMERIC) DESC"#));
    assert!(query.sql.ends_with("LIMIT $1"));
    assert_eq!(response.sql_params, Some(vec![json!(10)]));

    // summary and chart come from the executed rows
    let summary = response.summary.unwrap();
    assert_eq!(summary.total_records, 3);
    assert_eq!(summary.total_value, Some(17_000_000.0));
    let chart = response.chart_config.unwrap();
    assert_eq!(chart.labels[0], "Terminal Expansion");
}

#[tokio::test]
async fn follow_up_chain_inherits_and_overrides_filters() {
    let model = ScriptedModel::selecting(vec![
        Some(("get_projects_by_combined_filters", json!({"size": "Large"}))),
        Some(("get_projects_by_combined_filters", json!({"state_code": "CA"}))),
        Some(("get_projects_by_combined_filters", json!({"size": "Mega"}))),
    ]);
    let executor = FixedRows::new(sample_rows());
    let engine = engine(model, Arc::clone(&executor));

    let first = engine.answer_at(&question("Large projects"), today()).await;
    assert!(first.success);
    let context = first.context.clone().unwrap();
    assert_eq!(context.depth, 0);
    assert_eq!(context.arguments.get_str("size"), Some("Large"));

    let second = engine
        .answer_at(&follow_up("in California", context), today())
        .await;
    assert!(second.success);
    let context = second.context.clone().unwrap();
    assert_eq!(context.depth, 1);
    assert_eq!(context.arguments.get_str("size"), Some("Large"));
    assert_eq!(context.arguments.get_str("state_code"), Some("CA"));

    let third = engine
        .answer_at(&follow_up("mega sized only", context), today())
        .await;
    assert!(third.success);
    let context = third.context.clone().unwrap();
    assert_eq!(context.depth, 2);
    assert_eq!(context.arguments.get_str("size"), Some("Mega"));
    assert_eq!(context.arguments.get_str("state_code"), Some("CA"));

    // nothing downstream mutates what classification and merge computed
    assert_eq!(third.function_name.as_deref(), Some(context.function_name.as_str()));
    assert_eq!(third.arguments.as_ref(), Some(&context.arguments));

    // the Mega tier bound and the inherited state both reach the SQL
    let query = executor.last_query();
    assert!(query.sql.contains(">= $1"));
    assert!(query.sql.contains(r#""State Lookup" = $2"#));
}

#[tokio::test]
async fn multi_tag_question_requires_every_tag() {
    let model = ScriptedModel::selecting(vec![Some((
        "get_projects_by_multiple_tags",
        json!({"tags": ["Rail", "Transit"]}),
    ))]);
    let executor = FixedRows::new(sample_rows());
    let engine = engine(model, Arc::clone(&executor));

    let response = engine
        .answer_at(&question("Projects with Rail AND Transit tags"), today())
        .await;

    assert!(response.success);
    let query = executor.last_query();
    assert!(query.sql.contains(r#""Tags" ILIKE $1 AND "Tags" ILIKE $2"#));
    assert_eq!(
        response.sql_params,
        Some(vec![json!("%Rail%"), json!("%Transit%")])
    );
}

#[tokio::test]
async fn empty_question_is_rejected_before_classification() {
    // no scripted selections: reaching the model would fail the test
    let model = ScriptedModel::selecting(vec![]);
    let engine = engine(model, FixedRows::new(vec![]));

    let response = engine.answer_at(&question("   "), today()).await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("invalid_request"));
    assert!(response.message.is_some());
    assert!(response.data.is_empty());
}

#[tokio::test]
async fn fourth_follow_up_is_rejected() {
    let model = ScriptedModel::selecting(vec![Some((
        "get_projects_by_combined_filters",
        json!({"status": "won"}),
    ))]);
    let engine = engine(model, FixedRows::new(sample_rows()));

    let exhausted = ConversationContext {
        question: "third refinement".to_string(),
        function_name: "get_projects_by_combined_filters".to_string(),
        arguments: [("size".to_string(), json!("Large"))].into_iter().collect(),
        depth: 3,
    };
    let response = engine
        .answer_at(&follow_up("which did we win", exhausted), today())
        .await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("follow_up_limit_exceeded"));
}

#[tokio::test]
async fn out_of_catalog_selection_is_a_classification_error() {
    let model = ScriptedModel::selecting(vec![Some(("drop_table", json!({})))]);
    let engine = engine(model, FixedRows::new(vec![]));

    let response = engine.answer_at(&question("anything"), today()).await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("classification_error"));
}

#[tokio::test]
async fn inverted_bounds_after_merge_are_a_distinct_error() {
    // the follow-up wording carries no digits, so no fee re-extraction
    // runs and the inherited 20M minimum meets the new 9M maximum
    let model = ScriptedModel::selecting(vec![Some((
        "get_projects_by_fee_range",
        json!({"max_fee": 9_000_000.0}),
    ))]);
    let engine = engine(model, FixedRows::new(sample_rows()));

    let inherited = ConversationContext {
        question: "projects over 20 million".to_string(),
        function_name: "get_projects_by_fee_range".to_string(),
        arguments: [("min_fee".to_string(), json!(20_000_000.0))]
            .into_iter()
            .collect(),
        depth: 0,
    };
    let response = engine
        .answer_at(&follow_up("cap them at nine", inherited), today())
        .await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("invalid_filter_range"));
}

#[tokio::test]
async fn narrative_failure_never_fails_the_response() {
    let model = ScriptedModel::with_failing_narrative(vec![Some((
        "get_largest_projects",
        json!({}),
    ))]);
    let executor = FixedRows::new(sample_rows());
    let engine = QueryEngine::new(
        model,
        executor,
        Arc::new(StaticBoundaries(SizeBoundaries::fallback())),
    )
    .with_insights(true);

    let response = engine.answer_at(&question("largest projects"), today()).await;

    assert!(response.success);
    assert_eq!(response.ai_insights, None);
}

#[tokio::test]
async fn narrative_success_lands_in_the_response() {
    let model = ScriptedModel::selecting(vec![Some(("get_largest_projects", json!({})))]);
    let executor = FixedRows::new(sample_rows());
    let engine = QueryEngine::new(
        model,
        executor,
        Arc::new(StaticBoundaries(SizeBoundaries::fallback())),
    )
    .with_insights(true);

    let response = engine.answer_at(&question("largest projects"), today()).await;

    assert!(response.success);
    assert_eq!(response.ai_insights.as_deref(), Some("Scripted narrative."));
}

#[tokio::test]
async fn insights_disabled_means_no_narrative_call() {
    // with_failing_narrative would error if complete were ever called
    let model = ScriptedModel::with_failing_narrative(vec![Some((
        "get_largest_projects",
        json!({}),
    ))]);
    let engine = engine(model, FixedRows::new(sample_rows()));

    let response = engine.answer_at(&question("largest projects"), today()).await;

    assert!(response.success);
    assert_eq!(response.ai_insights, None);
}
