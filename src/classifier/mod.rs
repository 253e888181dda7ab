//! Question classification: free text in, catalog function plus arguments out.
//!
//! The language model only selects a function and extracts raw argument
//! text. Everything that must be exact comes from the deterministic pass
//! that runs afterwards: time phrases become concrete dates, statuses are
//! normalized, tag mentions override category selections, and fee amounts
//! and limits are re-extracted from the question text. The model is never
//! trusted with arithmetic.

pub mod anthropic;
pub mod llm;
pub mod openai;

pub use anthropic::AnthropicChat;
pub use llm::{ChatModel, ToolDefinition, ToolSelection};
pub use openai::OpenAiChat;

use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::catalog::{QueryFunction, CATALOG};
use crate::config::{AppConfig, LlmProvider};
use crate::error::{QueryError, QueryResult};
use crate::model::{ConversationContext, DateRange, FilterSet};
use crate::temporal;

// =============================================================================
// Question wording cues
// =============================================================================

static TAG_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btag(?:s|ged)?\b").unwrap());
static CATEGORY_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcategor(?:y|ies)\b|\bmarket segments?\b").unwrap());
static RANKING_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:largest|biggest|top|highest|greatest|major)\b").unwrap());
static SUPERLATIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:largest|top|biggest)\b").unwrap());
static COMPARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:compare|vs|versus)\b").unwrap());

// =============================================================================
// Classification
// =============================================================================

/// A classified question: the chosen catalog function and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub function: QueryFunction,
    pub arguments: FilterSet,
}

pub struct IntentClassifier {
    model: Arc<dyn ChatModel>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Classify a question against the catalog and apply the deterministic
    /// refinements. `today` anchors every relative time expression; the
    /// previous turn, if any, is handed to the model as grounding only —
    /// argument inheritance happens in the merge step, never here.
    pub async fn classify(
        &self,
        question: &str,
        previous: Option<&ConversationContext>,
        today: NaiveDate,
    ) -> QueryResult<Classification> {
        let tools = catalog_tools();
        let user_prompt = grounded_prompt(question, previous);
        let selection = self
            .model
            .select_tool(&system_prompt(today), &user_prompt, &tools)
            .await
            .map_err(|e| QueryError::classification(question, e.to_string()))?;

        let Some(selection) = selection else {
            return Err(QueryError::classification(
                question,
                "the model selected no query function",
            ));
        };

        // An out-of-catalog name is an ordinary model failure, handled the
        // same way as no selection at all.
        let function = QueryFunction::from_name(&selection.name).ok_or_else(|| {
            QueryError::classification(
                question,
                format!("the model selected '{}', which is not in the catalog", selection.name),
            )
        })?;
        let arguments = match selection.arguments {
            Value::Object(map) => FilterSet::from_map(map),
            _ => FilterSet::new(),
        };

        let mut classification = Classification {
            function,
            arguments,
        };
        debug!(
            model = self.model.model_name(),
            function = classification.function.name(),
            "Model selected query function"
        );

        preprocess(question, &mut classification, today);
        debug!(
            function = classification.function.name(),
            argument_count = classification.arguments.len(),
            "Classification after deterministic refinement"
        );
        Ok(classification)
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }
}

/// Build the provider the configuration names.
pub fn build_chat_model(config: &AppConfig) -> anyhow::Result<Arc<dyn ChatModel>> {
    Ok(match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiChat::from_env(config.llm_timeout)?),
        LlmProvider::Anthropic => Arc::new(AnthropicChat::from_env(config.llm_timeout)?),
    })
}

/// One tool per catalog function, schema derived from the declared params.
pub fn catalog_tools() -> Vec<ToolDefinition> {
    CATALOG
        .iter()
        .map(|spec| {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for param in spec.params {
                let mut schema = serde_json::Map::new();
                schema.insert("type".to_string(), json!(param.kind.json_type()));
                if let Some(item) = param.kind.item_type() {
                    schema.insert("items".to_string(), json!({ "type": item }));
                }
                schema.insert("description".to_string(), json!(param.description));
                properties.insert(param.name.to_string(), Value::Object(schema));
                if param.required {
                    required.push(param.name);
                }
            }
            ToolDefinition {
                name: spec.function.name().to_string(),
                description: spec.description.to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
            }
        })
        .collect()
}

/// The user prompt, with the previous turn prepended on follow-ups.
fn grounded_prompt(question: &str, previous: Option<&ConversationContext>) -> String {
    match previous {
        Some(context) => format!(
            "Previous question: {}\nPrevious selection: {} with arguments {}\n\n\
             Follow-up question: {}",
            context.question,
            context.function_name,
            serde_json::to_string(&context.arguments).unwrap_or_else(|_| "{}".to_string()),
            question,
        ),
        None => question.to_string(),
    }
}

fn system_prompt(today: NaiveDate) -> String {
    format!(
        "You classify questions about a sales pipeline of pursuit projects. Pick exactly one \
         query function and extract its arguments from the question. Today's date is {}. \
         Never compute dates yourself: when the question contains a time phrase and the chosen \
         function accepts a time_reference argument, copy the phrase exactly as the user wrote \
         it. Copy project names, clients, tags, categories and amounts verbatim. Never invent \
         arguments the user did not state. For a follow-up question the previous turn is given \
         as grounding; extract only what the follow-up itself states. If no function fits the \
         question, answer with one short plain-text sentence instead of selecting a function.",
        today.format("%Y-%m-%d")
    )
}

// =============================================================================
// Deterministic refinement
// =============================================================================

/// Rewrites a raw model classification using only the question text and
/// `today`. Runs the same way every time; nothing here consults the model.
pub fn preprocess(question: &str, classification: &mut Classification, today: NaiveDate) {
    let lowered = question.to_lowercase();

    resolve_time_reference_argument(classification, today);
    normalize_status(&mut classification.arguments);
    disambiguate_tags(&lowered, classification);
    cap_multiple_tags(classification);
    fall_back_to_all_companies(classification);
    steer_date_filters(question, &lowered, classification, today);
    steer_fee_filters(&lowered, classification);

    if let Some(limit) = temporal::parse_limit(question) {
        classification.arguments.insert("limit", Value::from(limit));
    }
}

fn set_window(args: &mut FilterSet, range: &DateRange) {
    args.insert(
        "start_date",
        Value::String(range.start_date.format("%Y-%m-%d").to_string()),
    );
    args.insert(
        "end_date",
        Value::String(range.end_date.format("%Y-%m-%d").to_string()),
    );
}

/// A `time_reference` argument is replaced by the dates it resolves to.
/// Unparseable references are dropped rather than guessed at.
fn resolve_time_reference_argument(classification: &mut Classification, today: NaiveDate) {
    let Some(reference) = classification
        .arguments
        .get_str("time_reference")
        .map(str::to_string)
    else {
        return;
    };
    classification.arguments.remove("time_reference");
    match temporal::resolve_time_reference(&reference, today) {
        Some(range) => {
            debug!(reference = %reference, start = %range.start_date, end = %range.end_date,
                "Resolved time reference");
            set_window(&mut classification.arguments, &range);
        }
        None => debug!(reference = %reference, "Unparseable time reference dropped"),
    }
}

fn normalize_status(args: &mut FilterSet) {
    let Some(status) = args.get_str("status").map(str::to_lowercase) else {
        return;
    };
    let normalized = match status.as_str() {
        "won" | "win" | "winning" | "successful" | "awarded" => "won",
        "lost" | "lose" | "losing" | "unsuccessful" | "rejected" => "lost",
        "submit" | "submitted" | "pending" | "awaiting" => "submitted",
        "lead" | "leads" | "opportunity" | "opportunities" => "lead",
        "proposal" | "proposal development" | "developing" => "proposal development",
        _ => return,
    };
    args.insert("status", Value::String(normalized.to_string()));
}

/// A question that says "tag" means tags, whatever the model picked. The
/// category value it extracted is reused as the tag list.
fn disambiguate_tags(lowered: &str, classification: &mut Classification) {
    if !TAG_WORD_RE.is_match(lowered) || CATEGORY_WORD_RE.is_match(lowered) {
        return;
    }

    match classification.function {
        QueryFunction::GetLargestByCategory => {
            let value = classification
                .arguments
                .get_str("category")
                .unwrap_or_default()
                .to_string();
            let limit = classification.arguments.get("limit").cloned();
            let tags = temporal::split_items(&value);
            classification.arguments = FilterSet::new();
            if tags.len() > 1 {
                classification.function = QueryFunction::GetProjectsByMultipleTags;
                classification.arguments.insert("tags", Value::from(tags));
            } else {
                classification.function = if RANKING_WORD_RE.is_match(lowered) {
                    QueryFunction::GetLargestByTags
                } else {
                    QueryFunction::GetProjectsByTags
                };
                let tag = tags.into_iter().next().unwrap_or(value);
                classification.arguments.insert("tag", Value::String(tag));
            }
            if let Some(limit) = limit {
                classification.arguments.insert("limit", limit);
            }
        }
        QueryFunction::GetProjectsByCategory => {
            let value = classification
                .arguments
                .get_str("category")
                .unwrap_or_default()
                .to_string();
            let tags = temporal::split_items(&value);
            classification.arguments = FilterSet::new();
            if tags.len() > 1 {
                classification.function = QueryFunction::GetProjectsByMultipleTags;
                classification.arguments.insert("tags", Value::from(tags));
            } else {
                classification.function = QueryFunction::GetProjectsByTags;
                let tag = tags.into_iter().next().unwrap_or(value);
                classification.arguments.insert("tag", Value::String(tag));
            }
        }
        QueryFunction::GetProjectsByTags => {
            let value = classification
                .arguments
                .get_str("tag")
                .unwrap_or_default()
                .to_string();
            let tags = temporal::split_items(&value);
            if tags.len() > 1 {
                classification.function = QueryFunction::GetProjectsByMultipleTags;
                classification.arguments = FilterSet::new();
                classification.arguments.insert("tags", Value::from(tags));
            }
        }
        _ => {}
    }
}

/// Multi-tag selections carry at most five tags; a single tag drops back
/// to the simpler single-tag listing.
fn cap_multiple_tags(classification: &mut Classification) {
    if classification.function != QueryFunction::GetProjectsByMultipleTags {
        return;
    }
    let Some(mut tags) = classification.arguments.get_string_list("tags") else {
        return;
    };
    if tags.len() > 5 {
        tags.truncate(5);
        classification.arguments.insert("tags", Value::from(tags));
    } else if tags.len() == 1 {
        classification.function = QueryFunction::GetProjectsByTags;
        let tag = tags.remove(0);
        classification.arguments = FilterSet::new();
        classification.arguments.insert("tag", Value::String(tag));
    }
}

/// A company comparison with no companies compares all of them.
fn fall_back_to_all_companies(classification: &mut Classification) {
    if classification.function != QueryFunction::CompareOpcoRevenue {
        return;
    }
    let empty = classification
        .arguments
        .get_string_list("companies")
        .map_or(true, |list| list.is_empty());
    if empty {
        classification.function = QueryFunction::CompareCompanies;
        classification.arguments = FilterSet::new();
    }
}

/// Date windows and year mentions found in the question itself.
fn steer_date_filters(
    question: &str,
    lowered: &str,
    classification: &mut Classification,
    today: NaiveDate,
) {
    let ranking = SUPERLATIVE_RE.is_match(lowered);

    let window = temporal::extract_quarter(question)
        .and_then(|(year, quarter)| temporal::quarter_range(year, quarter))
        .or_else(|| temporal::extract_month_window(question))
        .or_else(|| temporal::extract_relative_window(question, today));

    if let Some(range) = window {
        apply_window(classification, &range, ranking);
        return;
    }

    // Dates already present came from an explicit reference; a bare year
    // mention must not widen them.
    if classification.arguments.contains("start_date")
        || classification.arguments.contains("end_date")
    {
        return;
    }

    let years = temporal::extract_years(question);
    if years.len() > 1 {
        if classification.function == QueryFunction::GetProjectsByCombinedFilters {
            return;
        }
        if years.len() == 2 && COMPARE_RE.is_match(lowered) {
            classification.function = QueryFunction::CompareYears;
            classification
                .arguments
                .insert("year1", Value::from(years[0] as i64));
            classification
                .arguments
                .insert("year2", Value::from(years[1] as i64));
        } else {
            classification.function = QueryFunction::GetProjectsByYears;
            let years: Vec<i64> = years.iter().map(|y| *y as i64).collect();
            classification.arguments.insert("years", Value::from(years));
        }
    } else if let Some(year) = years.first().copied() {
        steer_single_year(classification, year, ranking);
    }
}

/// One calendar year in the question. Ranking functions get a year window;
/// plain listings become the by-year listing unless the function already
/// owns its date semantics.
fn steer_single_year(classification: &mut Classification, year: i32, ranking: bool) {
    if ranking {
        if matches!(
            classification.function,
            QueryFunction::GetLargestProjects
                | QueryFunction::GetSmallestProjects
                | QueryFunction::GetLargestByTags
                | QueryFunction::GetProjectsByMultipleTags
                | QueryFunction::GetProjectsByCombinedFilters
        ) {
            classification
                .arguments
                .insert("start_year", Value::from(year as i64));
            classification
                .arguments
                .insert("end_year", Value::from(year as i64));
        }
    } else if !matches!(
        classification.function,
        QueryFunction::GetLargestProjects
            | QueryFunction::GetSmallestProjects
            | QueryFunction::GetLargestByTags
            | QueryFunction::GetProjectsByTags
            | QueryFunction::GetProjectsByMultipleTags
            | QueryFunction::GetProjectsByCombinedFilters
            | QueryFunction::GetProjectsByQuarter
            | QueryFunction::GetProjectsByYears
            | QueryFunction::CompareYears
            | QueryFunction::GetTopTagsByDate
    ) {
        classification.function = QueryFunction::GetProjectsByYear;
        classification.arguments.insert("year", Value::from(year as i64));
    }
}

/// Applies a concrete window found in the question. Tag selections keep
/// their tags by moving to the combined listing, which accepts both tags
/// and dates; everything else becomes a date-ranged listing (or the
/// largest-projects ranking when the wording asks for one).
fn apply_window(classification: &mut Classification, range: &DateRange, ranking: bool) {
    match classification.function {
        QueryFunction::GetProjectsByCombinedFilters => {
            set_window(&mut classification.arguments, range);
        }
        QueryFunction::GetProjectsByTags | QueryFunction::GetLargestByTags => {
            let tag = classification
                .arguments
                .get_str("tag")
                .unwrap_or_default()
                .to_string();
            classification.function = QueryFunction::GetProjectsByCombinedFilters;
            classification.arguments = FilterSet::new();
            if !tag.is_empty() {
                classification.arguments.insert("tags", Value::from(vec![tag]));
            }
            set_window(&mut classification.arguments, range);
        }
        QueryFunction::GetProjectsByMultipleTags => {
            let tags = classification
                .arguments
                .get_string_list("tags")
                .unwrap_or_default();
            classification.function = QueryFunction::GetProjectsByCombinedFilters;
            classification.arguments = FilterSet::new();
            if !tags.is_empty() {
                classification.arguments.insert("tags", Value::from(tags));
            }
            set_window(&mut classification.arguments, range);
        }
        _ => {
            classification.function = if ranking {
                QueryFunction::GetLargestProjects
            } else {
                QueryFunction::GetProjectsByDateRange
            };
            set_window(&mut classification.arguments, range);
            classification.arguments.remove("year");
            classification.arguments.remove("quarter");
            classification.arguments.remove("start_year");
            classification.arguments.remove("end_year");
        }
    }
}

/// Fee amounts spelled in the question override whatever the model put in
/// the arguments.
fn steer_fee_filters(lowered: &str, classification: &mut Classification) {
    let Some((min_fee, max_fee)) = temporal::parse_fee_range(lowered) else {
        return;
    };
    classification.arguments.insert("min_fee", Value::from(min_fee));
    if let Some(max_fee) = max_fee {
        classification.arguments.insert("max_fee", Value::from(max_fee));
    }

    if matches!(
        classification.function,
        QueryFunction::GetProjectsByCombinedFilters
            | QueryFunction::GetLargestByTags
            | QueryFunction::GetProjectsByMultipleTags
    ) {
        return;
    }

    let has_client = classification
        .arguments
        .get_str("client")
        .map_or(false, |c| !c.is_empty());
    classification.function = if has_client && max_fee.is_some() {
        QueryFunction::GetProjectsByClientAndFeeRange
    } else {
        QueryFunction::GetProjectsByFeeRange
    };
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 15).unwrap()
    }

    fn classified(function: QueryFunction, args: Value) -> Classification {
        let arguments = match args {
            Value::Object(map) => FilterSet::from_map(map),
            _ => FilterSet::new(),
        };
        Classification {
            function,
            arguments,
        }
    }

    fn run(question: &str, mut classification: Classification) -> Classification {
        preprocess(question, &mut classification, today());
        classification
    }

    struct StaticModel {
        selection: Option<ToolSelection>,
    }

    #[async_trait]
    impl ChatModel for StaticModel {
        async fn select_tool(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _tools: &[ToolDefinition],
        ) -> Result<Option<ToolSelection>> {
            Ok(self.selection.clone())
        }

        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            Ok(String::new())
        }

        fn model_name(&self) -> &str {
            "static-test-model"
        }
    }

    fn classifier(selection: Option<ToolSelection>) -> IntentClassifier {
        IntentClassifier::new(Arc::new(StaticModel { selection }))
    }

    #[test]
    fn catalog_tools_cover_every_function() {
        let tools = catalog_tools();
        assert_eq!(tools.len(), QueryFunction::COUNT);
        let by_year = tools
            .iter()
            .find(|t| t.name == "get_projects_by_year")
            .unwrap();
        assert_eq!(by_year.input_schema["properties"]["year"]["type"], "integer");
        assert_eq!(by_year.input_schema["required"][0], "year");
    }

    #[tokio::test]
    async fn classify_maps_selection_and_normalizes() {
        let classifier = classifier(Some(ToolSelection {
            name: "get_projects_by_status".to_string(),
            arguments: json!({"status": "Winning"}),
        }));
        let c = classifier
            .classify("show me winning projects", None, today())
            .await
            .unwrap();
        assert_eq!(c.function, QueryFunction::GetProjectsByStatus);
        assert_eq!(c.arguments.get_str("status"), Some("won"));
    }

    #[tokio::test]
    async fn classify_rejects_names_outside_the_catalog() {
        let classifier = classifier(Some(ToolSelection {
            name: "drop_table".to_string(),
            arguments: json!({}),
        }));
        let err = classifier
            .classify("anything", None, today())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "classification_error");
    }

    #[tokio::test]
    async fn classify_requires_a_selection() {
        let classifier = classifier(None);
        let err = classifier
            .classify("what is the meaning of life", None, today())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "classification_error");
        assert_eq!(
            err.user_message(),
            "Could not understand the question: 'what is the meaning of life'. Please try rephrasing."
        );
    }

    #[test]
    fn follow_up_prompt_carries_the_previous_turn() {
        let prompt = grounded_prompt("in California", None);
        assert_eq!(prompt, "in California");

        let mut arguments = FilterSet::new();
        arguments.insert("size", json!("Large"));
        let context = ConversationContext {
            question: "Large projects".to_string(),
            function_name: "get_projects_by_combined_filters".to_string(),
            arguments,
            depth: 0,
        };
        let prompt = grounded_prompt("in California", Some(&context));
        assert!(prompt.starts_with("Previous question: Large projects"));
        assert!(prompt.contains("get_projects_by_combined_filters"));
        assert!(prompt.contains(r#"{"size":"Large"}"#));
        assert!(prompt.ends_with("Follow-up question: in California"));
    }

    #[test]
    fn quarter_question_becomes_a_date_range() {
        let c = run(
            "Projects in Q3 2024",
            classified(
                QueryFunction::GetProjectsByQuarter,
                json!({"year": 2024, "quarter": 3}),
            ),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByDateRange);
        assert_eq!(c.arguments.get_str("start_date"), Some("2024-07-01"));
        assert_eq!(c.arguments.get_str("end_date"), Some("2024-09-30"));
        assert!(!c.arguments.contains("quarter"));
        assert!(!c.arguments.contains("year"));
    }

    #[test]
    fn relative_window_with_ranking_words_keeps_the_ranking() {
        let c = run(
            "top 10 largest projects in the last 6 months",
            classified(QueryFunction::GetLargestProjects, json!({})),
        );
        assert_eq!(c.function, QueryFunction::GetLargestProjects);
        assert_eq!(c.arguments.get_str("start_date"), Some("2024-05-15"));
        assert_eq!(c.arguments.get_str("end_date"), Some("2024-11-15"));
        assert_eq!(c.arguments.get_i64("limit"), Some(10));
    }

    #[test]
    fn time_reference_argument_resolves_to_dates() {
        let c = run(
            "lead projects starting in the next ten months",
            classified(
                QueryFunction::GetProjectsByCombinedFilters,
                json!({"time_reference": "next ten months", "status": "lead"}),
            ),
        );
        assert!(!c.arguments.contains("time_reference"));
        assert_eq!(c.arguments.get_str("start_date"), Some("2024-11-15"));
        assert_eq!(c.arguments.get_str("end_date"), Some("2025-09-15"));
        assert_eq!(c.function, QueryFunction::GetProjectsByCombinedFilters);
    }

    #[test]
    fn explicit_dates_survive_a_bare_year_mention() {
        let c = run(
            "projects from 2024-02-01 to 2024-03-15",
            classified(
                QueryFunction::GetProjectsByDateRange,
                json!({"start_date": "2024-02-01", "end_date": "2024-03-15"}),
            ),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByDateRange);
        assert_eq!(c.arguments.get_str("start_date"), Some("2024-02-01"));
        assert_eq!(c.arguments.get_str("end_date"), Some("2024-03-15"));
    }

    #[test]
    fn tag_wording_overrides_a_category_selection() {
        let c = run(
            "largest projects tagged Rail",
            classified(
                QueryFunction::GetLargestByCategory,
                json!({"category": "Rail", "limit": 5}),
            ),
        );
        assert_eq!(c.function, QueryFunction::GetLargestByTags);
        assert_eq!(c.arguments.get_str("tag"), Some("Rail"));
        assert_eq!(c.arguments.get_i64("limit"), Some(5));
    }

    #[test]
    fn tag_wording_with_two_values_becomes_multi_tag() {
        let c = run(
            "projects tagged Rail and Transit",
            classified(
                QueryFunction::GetProjectsByTags,
                json!({"tag": "Rail and Transit"}),
            ),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByMultipleTags);
        assert_eq!(
            c.arguments.get_string_list("tags"),
            Some(vec!["Rail".to_string(), "Transit".to_string()])
        );
    }

    #[test]
    fn category_wording_blocks_the_tag_override() {
        let c = run(
            "largest projects in the Rail category, not the tag",
            classified(QueryFunction::GetLargestByCategory, json!({"category": "Rail"})),
        );
        assert_eq!(c.function, QueryFunction::GetLargestByCategory);
    }

    #[test]
    fn multi_tag_list_is_capped_at_five() {
        let c = run(
            "projects tagged with everything",
            classified(
                QueryFunction::GetProjectsByMultipleTags,
                json!({"tags": ["a", "b", "c", "d", "e", "f", "g"]}),
            ),
        );
        assert_eq!(c.arguments.get_string_list("tags").unwrap().len(), 5);
    }

    #[test]
    fn single_entry_multi_tag_drops_to_single_tag() {
        let c = run(
            "projects tagged Rail",
            classified(
                QueryFunction::GetProjectsByMultipleTags,
                json!({"tags": ["Rail"]}),
            ),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByTags);
        assert_eq!(c.arguments.get_str("tag"), Some("Rail"));
    }

    #[test]
    fn company_comparison_without_companies_compares_all() {
        let c = run(
            "compare revenue across our companies",
            classified(QueryFunction::CompareOpcoRevenue, json!({"companies": []})),
        );
        assert_eq!(c.function, QueryFunction::CompareCompanies);
        assert!(c.arguments.is_empty());
    }

    #[test]
    fn two_years_with_compare_wording_compare_years() {
        let c = run(
            "compare 2023 vs 2024",
            classified(QueryFunction::GetAllProjects, json!({})),
        );
        assert_eq!(c.function, QueryFunction::CompareYears);
        assert_eq!(c.arguments.get_i64("year1"), Some(2023));
        assert_eq!(c.arguments.get_i64("year2"), Some(2024));
    }

    #[test]
    fn year_list_without_compare_wording_lists_years() {
        let c = run(
            "projects in 2023, 2024 and 2025",
            classified(QueryFunction::GetAllProjects, json!({})),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByYears);
        assert_eq!(
            c.arguments.get_i64_list("years"),
            Some(vec![2023, 2024, 2025])
        );
    }

    #[test]
    fn single_year_steers_plain_listings_only() {
        let c = run(
            "projects in 2024",
            classified(QueryFunction::GetAllProjects, json!({})),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByYear);
        assert_eq!(c.arguments.get_i64("year"), Some(2024));

        let c = run(
            "top 10 largest projects in 2024",
            classified(QueryFunction::GetLargestProjects, json!({})),
        );
        assert_eq!(c.function, QueryFunction::GetLargestProjects);
        assert_eq!(c.arguments.get_i64("start_year"), Some(2024));
        assert_eq!(c.arguments.get_i64("end_year"), Some(2024));
        assert_eq!(c.arguments.get_i64("limit"), Some(10));
    }

    #[test]
    fn tag_listing_with_a_window_moves_to_combined_filters() {
        let c = run(
            "Rail tagged projects in Q1 2025",
            classified(QueryFunction::GetProjectsByTags, json!({"tag": "Rail"})),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByCombinedFilters);
        assert_eq!(
            c.arguments.get_string_list("tags"),
            Some(vec!["Rail".to_string()])
        );
        assert_eq!(c.arguments.get_str("start_date"), Some("2025-01-01"));
        assert_eq!(c.arguments.get_str("end_date"), Some("2025-03-31"));
    }

    #[test]
    fn fee_wording_overrides_fee_arguments() {
        let c = run(
            "projects over $5 million",
            classified(QueryFunction::GetAllProjects, json!({})),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByFeeRange);
        assert_eq!(c.arguments.get_f64("min_fee"), Some(5_000_000.0));
        assert!(!c.arguments.contains("max_fee"));
    }

    #[test]
    fn fee_range_with_a_client_uses_the_client_variant() {
        let c = run(
            "Acme projects between 1 and 2 million",
            classified(QueryFunction::GetProjectsByClient, json!({"client": "Acme"})),
        );
        assert_eq!(c.function, QueryFunction::GetProjectsByClientAndFeeRange);
        assert_eq!(c.arguments.get_str("client"), Some("Acme"));
        assert_eq!(c.arguments.get_f64("min_fee"), Some(1_000_000.0));
        assert_eq!(c.arguments.get_f64("max_fee"), Some(2_000_000.0));
    }

    #[test]
    fn status_variants_normalize() {
        for (raw, expected) in [
            ("Winning", "won"),
            ("rejected", "lost"),
            ("pending", "submitted"),
            ("Opportunities", "lead"),
            ("developing", "proposal development"),
        ] {
            let c = run(
                "projects by status",
                classified(QueryFunction::GetProjectsByStatus, json!({"status": raw})),
            );
            assert_eq!(c.arguments.get_str("status"), Some(expected), "{raw}");
        }
        // Unknown statuses pass through untouched.
        let c = run(
            "projects by status",
            classified(QueryFunction::GetProjectsByStatus, json!({"status": "Shortlisted"})),
        );
        assert_eq!(c.arguments.get_str("status"), Some("Shortlisted"));
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let build = || {
            run(
                "top 5 largest Rail tagged projects in the last 6 months",
                classified(
                    QueryFunction::GetLargestByCategory,
                    json!({"category": "Rail"}),
                ),
            )
        };
        let first = build();
        for _ in 0..5 {
            assert_eq!(build(), first);
        }
    }
}
