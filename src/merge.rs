//! Follow-up argument merging.
//!
//! A follow-up turn refines the previous turn instead of replacing it. The
//! caller threads the previous turn's resolved call back in as a
//! [`ConversationContext`]; nothing is kept server-side. Singular filters
//! take the newer value and fall back to the inherited one. Tag and
//! category lists grow across turns unless the new question signals
//! replacement. Only keys the new function declares are inherited, so a
//! function switch sheds filters the new template could not use anyway.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::catalog::FunctionSpec;
use crate::classifier::Classification;
use crate::error::{QueryError, QueryResult, MAX_FOLLOW_UP_DEPTH};
use crate::model::{ConversationContext, FilterSet};

/// Wording that discards inherited list filters instead of extending them.
static REPLACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:only|instead|just)\b").unwrap());

/// List filters that accumulate across follow-ups.
const ADDITIVE_KEYS: &[&str] = &["tags", "categories"];

/// Merge the previous turn's arguments into `classification` and return
/// this turn's follow-up depth (zero for a fresh question).
///
/// The fourth chained refinement is rejected rather than truncated, and a
/// merged filter set whose numeric bounds invert is rejected before any
/// SQL is built.
pub fn merge(
    previous: Option<&ConversationContext>,
    question: &str,
    classification: &mut Classification,
) -> QueryResult<u32> {
    let Some(previous) = previous else {
        check_bounds(&classification.arguments)?;
        return Ok(0);
    };

    let depth = previous.depth + 1;
    if depth > MAX_FOLLOW_UP_DEPTH {
        return Err(QueryError::FollowUpLimitExceeded {
            depth,
            max: MAX_FOLLOW_UP_DEPTH,
        });
    }

    let spec = classification.function.spec();
    let replace = REPLACE_RE.is_match(&question.to_lowercase());

    for (key, value) in previous.arguments.iter() {
        if !accepts_key(spec, key) {
            continue;
        }
        if ADDITIVE_KEYS.contains(&key.as_str()) && !replace {
            if let Some(merged) = union_lists(value, classification.arguments.get(key)) {
                classification.arguments.insert(key.clone(), merged);
                continue;
            }
        }
        if !classification.arguments.contains(key) {
            classification.arguments.insert(key.clone(), value.clone());
        }
    }

    check_bounds(&classification.arguments)?;
    Ok(depth)
}

/// A declared `time_reference` parameter materializes as `start_date` and
/// `end_date` once resolved, so those keys inherit wherever the reference
/// itself is declared.
fn accepts_key(spec: &FunctionSpec, key: &str) -> bool {
    if spec.declares(key) {
        return true;
    }
    matches!(key, "start_date" | "end_date") && spec.declares("time_reference")
}

/// Union of the inherited and newly supplied list, inherited entries
/// first, case-insensitively deduplicated. `None` when either side is not
/// a string list, in which case the plain inherit/override rule applies.
fn union_lists(previous: &Value, current: Option<&Value>) -> Option<Value> {
    let mut merged = string_items(previous)?;
    let new = string_items(current?)?;

    let mut seen: Vec<String> = merged.iter().map(|s| s.to_lowercase()).collect();
    for item in new {
        let lower = item.to_lowercase();
        if !seen.contains(&lower) {
            seen.push(lower);
            merged.push(item);
        }
    }
    Some(Value::from(merged))
}

fn string_items(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn check_bounds(args: &FilterSet) -> QueryResult<()> {
    if let (Some(min), Some(max)) = (args.get_f64("min_fee"), args.get_f64("max_fee")) {
        if min > max {
            return Err(QueryError::InvalidFilterRange {
                filter: "fee".to_string(),
                min,
                max,
            });
        }
    }
    if let (Some(min), Some(max)) = (args.get_i64("min_win"), args.get_i64("max_win")) {
        if min > max {
            return Err(QueryError::InvalidFilterRange {
                filter: "win rate".to_string(),
                min: min as f64,
                max: max as f64,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QueryFunction;
    use serde_json::json;

    fn filters(args: Value) -> FilterSet {
        match args {
            Value::Object(map) => FilterSet::from_map(map),
            _ => FilterSet::new(),
        }
    }

    fn turn(function: QueryFunction, args: Value) -> Classification {
        Classification {
            function,
            arguments: filters(args),
        }
    }

    fn context(function: QueryFunction, args: Value, depth: u32) -> ConversationContext {
        ConversationContext {
            question: "earlier question".to_string(),
            function_name: function.name().to_string(),
            arguments: filters(args),
            depth,
        }
    }

    #[test]
    fn fresh_turn_is_identity() {
        let mut c = turn(
            QueryFunction::GetProjectsBySize,
            json!({"size": "Large", "limit": 5}),
        );
        let before = c.arguments.clone();
        let depth = merge(None, "Large projects", &mut c).unwrap();
        assert_eq!(depth, 0);
        assert_eq!(c.arguments, before);
    }

    #[test]
    fn follow_up_inherits_declared_keys() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"size": "Large"}),
            0,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"state_code": "CA"}),
        );
        let depth = merge(Some(&prev), "in California", &mut c).unwrap();
        assert_eq!(depth, 1);
        assert_eq!(c.arguments.get_str("size"), Some("Large"));
        assert_eq!(c.arguments.get_str("state_code"), Some("CA"));
    }

    #[test]
    fn newer_singular_values_override_inherited_ones() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"size": "Large", "state_code": "CA"}),
            1,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"size": "Mega"}),
        );
        let depth = merge(Some(&prev), "mega sized only", &mut c).unwrap();
        assert_eq!(depth, 2);
        assert_eq!(c.arguments.get_str("size"), Some("Mega"));
        assert_eq!(c.arguments.get_str("state_code"), Some("CA"));
    }

    #[test]
    fn keys_the_new_function_lacks_are_dropped() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"status": "won", "limit": 5}),
            0,
        );
        let mut c = turn(QueryFunction::GetLargestProjects, json!({}));
        merge(Some(&prev), "show me the largest ones", &mut c).unwrap();
        assert_eq!(c.arguments.get_i64("limit"), Some(5));
        assert!(!c.arguments.contains("status"));
    }

    #[test]
    fn resolved_windows_inherit_where_a_time_reference_is_declared() {
        let prev = context(
            QueryFunction::GetProjectsByDateRange,
            json!({"start_date": "2024-07-01", "end_date": "2024-09-30"}),
            0,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"status": "won"}),
        );
        merge(Some(&prev), "which of those did we win", &mut c).unwrap();
        assert_eq!(c.arguments.get_str("start_date"), Some("2024-07-01"));
        assert_eq!(c.arguments.get_str("end_date"), Some("2024-09-30"));
    }

    #[test]
    fn tag_lists_union_across_turns() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"tags": ["Rail"]}),
            0,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"tags": ["rail", "Transit"]}),
        );
        merge(Some(&prev), "add transit work too", &mut c).unwrap();
        assert_eq!(
            c.arguments.get_string_list("tags"),
            Some(vec!["Rail".to_string(), "Transit".to_string()])
        );
    }

    #[test]
    fn replacement_wording_resets_the_tag_list() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"tags": ["Rail"]}),
            0,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"tags": ["Transit"]}),
        );
        merge(Some(&prev), "only Transit projects", &mut c).unwrap();
        assert_eq!(
            c.arguments.get_string_list("tags"),
            Some(vec!["Transit".to_string()])
        );
    }

    #[test]
    fn replacement_wording_without_new_tags_still_inherits() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"tags": ["Rail"]}),
            0,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"limit": 5}),
        );
        merge(Some(&prev), "just the five biggest", &mut c).unwrap();
        assert_eq!(
            c.arguments.get_string_list("tags"),
            Some(vec!["Rail".to_string()])
        );
    }

    #[test]
    fn fourth_refinement_is_rejected() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"size": "Large"}),
            3,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"state_code": "CA"}),
        );
        let err = merge(Some(&prev), "in California", &mut c).unwrap_err();
        assert_eq!(err.code(), "follow_up_limit_exceeded");

        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"size": "Large"}),
            2,
        );
        let depth = merge(Some(&prev), "in California", &mut c).unwrap();
        assert_eq!(depth, 3);
    }

    #[test]
    fn inverted_fee_bounds_after_merge_are_rejected() {
        let prev = context(
            QueryFunction::GetProjectsByFeeRange,
            json!({"min_fee": 5_000_000.0}),
            0,
        );
        let mut c = turn(
            QueryFunction::GetProjectsByFeeRange,
            json!({"max_fee": 1_000_000.0}),
        );
        let err = merge(Some(&prev), "under a million", &mut c).unwrap_err();
        assert_eq!(err.code(), "invalid_filter_range");
        assert!(err.user_message().contains("fee"));
    }

    #[test]
    fn inverted_bounds_fail_even_on_a_fresh_turn() {
        let mut c = turn(
            QueryFunction::GetProjectsByWinRange,
            json!({"min_win": 80, "max_win": 40}),
        );
        let err = merge(None, "win rate between 80 and 40", &mut c).unwrap_err();
        assert_eq!(err.code(), "invalid_filter_range");
    }

    #[test]
    fn redundant_respecification_matches_inheritance() {
        let prev = context(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"size": "Large", "state_code": "CA"}),
            0,
        );

        let mut inherited = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"status": "won"}),
        );
        merge(Some(&prev), "which did we win", &mut inherited).unwrap();

        let mut respecified = turn(
            QueryFunction::GetProjectsByCombinedFilters,
            json!({"status": "won", "size": "Large", "state_code": "CA"}),
        );
        merge(Some(&prev), "which did we win", &mut respecified).unwrap();

        assert_eq!(inherited.arguments, respecified.arguments);
    }
}
