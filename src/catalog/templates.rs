//! Parameterized SQL for every catalog function.
//!
//! Resolution is pure: the same function, filter set and boundaries always
//! produce byte-identical SQL and the same parameter vector, so the output
//! is safe to log, cache and test without a database. Every user-supplied
//! value travels as a numbered placeholder; the only text spliced into SQL
//! is server-derived (size tier thresholds and their labels).

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::QueryFunction;
use crate::error::{QueryError, QueryResult};
use crate::model::FilterSet;
use crate::percentile::{SizeBoundaries, SizeTier};

const TABLE: &str = r#""Sample""#;
const FEE: &str = r#"CAST(NULLIF("Fee", '') AS NUMERIC)"#;
const FEE_RAW: &str = r#"CAST("Fee" AS NUMERIC)"#;
const WIN: &str = r#"CAST(NULLIF("Win %", '') AS NUMERIC)"#;
const FEE_PRESENT: &str = r#""Fee" IS NOT NULL AND "Fee" != ''"#;
const WIN_PRESENT: &str = r#""Win %" IS NOT NULL AND "Win %" != ''"#;
// Rows before this date are import artifacts, not real pursuits.
const EPOCH_GUARD: &str = r#""Start Date" > '2000-01-01'"#;
const TIE_BREAK: &str = r#""Internal Id""#;

// =============================================================================
// Resolved output
// =============================================================================

/// Value bound to one numbered placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    TextArray(Vec<String>),
    IntArray(Vec<i64>),
}

/// Final SQL plus its bound parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Accumulates parameters and hands back their `$n` placeholders.
struct Binder {
    params: Vec<SqlParam>,
}

impl Binder {
    fn new() -> Self {
        Binder { params: Vec::new() }
    }

    fn bind(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn text(&mut self, value: impl Into<String>) -> String {
        self.bind(SqlParam::Text(value.into()))
    }

    /// Contains-match pattern, `%value%`.
    fn like(&mut self, value: &str) -> String {
        self.text(format!("%{value}%"))
    }

    fn int(&mut self, value: i64) -> String {
        self.bind(SqlParam::Int(value))
    }

    fn float(&mut self, value: f64) -> String {
        self.bind(SqlParam::Float(value))
    }

    fn date(&mut self, value: NaiveDate) -> String {
        self.bind(SqlParam::Date(value))
    }

    fn done(self, sql: String) -> ResolvedQuery {
        ResolvedQuery {
            sql,
            params: self.params,
        }
    }
}

// =============================================================================
// Argument access
// =============================================================================

fn missing(function: QueryFunction, key: &str) -> QueryError {
    QueryError::InvalidRequest {
        message: format!("{} requires '{}'", function.name(), key),
    }
}

fn required_str(args: &FilterSet, function: QueryFunction, key: &str) -> QueryResult<String> {
    args.get_str(key)
        .map(str::to_string)
        .ok_or_else(|| missing(function, key))
}

fn required_i64(args: &FilterSet, function: QueryFunction, key: &str) -> QueryResult<i64> {
    args.get_i64(key).ok_or_else(|| missing(function, key))
}

fn required_f64(args: &FilterSet, function: QueryFunction, key: &str) -> QueryResult<f64> {
    args.get_f64(key).ok_or_else(|| missing(function, key))
}

fn required_date(args: &FilterSet, function: QueryFunction, key: &str) -> QueryResult<NaiveDate> {
    args.get_date(key).ok_or_else(|| missing(function, key))
}

/// Reference-style lookups fall back onto sibling keys so a bare project
/// name still drives the ID and similarity templates.
fn lookup_with_fallback(args: &FilterSet, key: &str) -> Option<String> {
    let direct = args.get_str(key).filter(|s| !s.is_empty());
    direct
        .or_else(|| match key {
            "reference_project" | "internal_id" => {
                args.get_str("project_name").filter(|s| !s.is_empty())
            }
            "reference_client" => args.get_str("client").filter(|s| !s.is_empty()),
            _ => None,
        })
        .map(str::to_string)
}

/// Contains-match for optional reference keys; an absent value matches
/// anything, which keeps the reference CTEs total.
fn reference_pattern(args: &FilterSet, key: &str) -> String {
    format!("%{}%", lookup_with_fallback(args, key).unwrap_or_default())
}

// =============================================================================
// Shared fragments
// =============================================================================

fn order_by_fee() -> String {
    format!("ORDER BY {FEE} DESC NULLS LAST, {TIE_BREAK}")
}

fn push_limit(sql: &mut String, binder: &mut Binder, args: &FilterSet) {
    if let Some(limit) = args.get_i64("limit") {
        if limit > 0 {
            let placeholder = binder.int(limit);
            sql.push_str(&format!(" LIMIT {placeholder}"));
        }
    }
}

/// Optional window over `"Start Date"`: explicit dates win over year bounds.
fn push_date_window(sql: &mut String, binder: &mut Binder, args: &FilterSet) {
    let range = match (args.get_date("start_date"), args.get_date("end_date")) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => match (args.get_i64("start_year"), args.get_i64("end_year")) {
            (Some(start_year), Some(end_year)) => {
                NaiveDate::from_ymd_opt(start_year as i32, 1, 1)
                    .zip(NaiveDate::from_ymd_opt(end_year as i32, 12, 31))
            }
            _ => None,
        },
    };
    if let Some((start, end)) = range {
        let start_ph = binder.date(start);
        let end_ph = binder.date(end);
        sql.push_str(&format!(
            " AND \"Start Date\" >= {start_ph} AND \"Start Date\" <= {end_ph} AND {EPOCH_GUARD}"
        ));
    }
}

/// Fee-range conditions for a size tier, derived from percentile boundaries.
fn push_tier_bounds(
    sql: &mut String,
    binder: &mut Binder,
    boundaries: &SizeBoundaries,
    tier: SizeTier,
) {
    let (lower, upper) = boundaries.tier_bounds(tier);
    if let Some(lower) = lower {
        let placeholder = binder.float(lower);
        sql.push_str(&format!(" AND {FEE} >= {placeholder}"));
    }
    if let Some(upper) = upper {
        let placeholder = binder.float(upper);
        sql.push_str(&format!(" AND {FEE} < {placeholder}"));
    }
}

fn parse_tier(args: &FilterSet, function: QueryFunction) -> QueryResult<SizeTier> {
    let raw = required_str(args, function, "size")?;
    SizeTier::parse(&raw).ok_or_else(|| QueryError::InvalidRequest {
        message: format!(
            "{} requires a size of Micro, Small, Medium, Large or Mega, got '{raw}'",
            function.name()
        ),
    })
}

// =============================================================================
// Resolution
// =============================================================================

/// Builds the SQL and parameter vector for one catalog function.
pub fn resolve(
    function: QueryFunction,
    args: &FilterSet,
    boundaries: &SizeBoundaries,
) -> QueryResult<ResolvedQuery> {
    use QueryFunction as F;
    match function {
        F::GetProjectsByYear => by_year(args),
        F::GetProjectsByDateRange => by_date_range(args),
        F::GetProjectsByQuarter => by_quarter(args),
        F::GetProjectsByYears => by_years(args),
        F::GetProjectsByCombinedFilters => combined_filters(args, boundaries),
        F::GetLargestProjects => ranked_by_fee(args, false),
        F::GetSmallestProjects => ranked_by_fee(args, true),
        F::GetLargestInRegion => largest_in_region(args),
        F::GetLargestByCategory => {
            ranked_ilike(args, function, "Request Category", "category")
        }
        F::GetProjectsByCategory => filtered_listing(args, function, "Request Category", "category"),
        F::GetProjectsByProjectType => {
            filtered_listing(args, function, "Project Type", "project_type")
        }
        F::GetProjectsByMultipleCategories => by_multiple_categories(args),
        F::GetLargestByTags => ranked_ilike(args, function, "Tags", "tag"),
        F::GetProjectsByTags => filtered_listing(args, function, "Tags", "tag"),
        F::GetTopTags => top_tags(args, None),
        F::GetTopTagsByDate => {
            let start_year = required_i64(args, function, "start_year")?;
            let end_year = required_i64(args, function, "end_year")?;
            top_tags(args, Some((start_year, end_year)))
        }
        F::GetProjectsBySharedTags => shared_tags(args),
        F::GetProjectsByMultipleTags => multiple_tags(args),
        F::GetProjectsByCompany => filtered_listing(args, function, "Company", "company"),
        F::CompareCompanies => Ok(compare_companies()),
        F::CompareOpcoRevenue => compare_opco_revenue(args),
        F::GetProjectsByClient => filtered_listing(args, function, "Client", "client"),
        F::GetProjectsByClientAndFeeRange => client_and_fee_range(args),
        F::GetClientWinRates => client_win_rates(args),
        F::GetProjectsByStatus => filtered_listing(args, function, "Status", "status"),
        F::GetStatusBreakdown => Ok(status_breakdown()),
        F::GetOveroptimisticLosses => Ok(overoptimistic_losses()),
        F::GetTopPredictedWins => top_predicted_wins(args),
        F::GetProjectWinRate => project_win_rate(args),
        F::GetProjectsByWinRange => by_win_range(args),
        F::PredictWinProbability => predict_win_probability(args),
        F::GetProjectsByState => by_state(args),
        F::GetProjectsByFeeRange => by_fee_range(args),
        F::GetProjectsBySize => by_size(args, boundaries),
        F::GetSizeDistribution => Ok(size_distribution(boundaries)),
        F::GetSimilarProjects => similar_projects(args),
        F::CompareProjectWithSimilar => compare_project_with_similar(args),
        F::GetRelatedProjects => related_projects(args),
        F::GetProjectsByStatusAndWinRate => status_and_win_rate(args),
        F::AnalyzePursuitDuration => Ok(pursuit_duration()),
        F::GetAllProjects => Ok(all_projects()),
        F::GetProjectsSorted => Ok(projects_sorted()),
        F::GroupProjectsByTypeSize => Ok(group_by_type_size(boundaries)),
        F::GetProjectsByContact => {
            filtered_listing(args, function, "Point Of Contact", "contact_name")
        }
        F::GetProjectById => project_by_id(args),
        F::GetRevenueByCategory => revenue_by_category(args),
        F::GetWeightedRevenueProjection => Ok(weighted_revenue_projection()),
        F::CompareYears => compare_years(args),
    }
}

// =============================================================================
// Date windows
// =============================================================================

fn by_year(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let year = required_i64(args, QueryFunction::GetProjectsByYear, "year")?;
    let mut b = Binder::new();
    let year_ph = b.int(year);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE EXTRACT(YEAR FROM \"Start Date\") = {year_ph} \
         AND {EPOCH_GUARD} {}",
        order_by_fee()
    );
    Ok(b.done(sql))
}

fn by_date_range(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::GetProjectsByDateRange;
    let start = required_date(args, function, "start_date")?;
    let end = required_date(args, function, "end_date")?;
    let mut b = Binder::new();
    let start_ph = b.date(start);
    let end_ph = b.date(end);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"Start Date\" BETWEEN {start_ph} AND {end_ph} \
         AND {EPOCH_GUARD} {}",
        order_by_fee()
    );
    Ok(b.done(sql))
}

fn by_quarter(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::GetProjectsByQuarter;
    let year = required_i64(args, function, "year")?;
    let quarter = required_i64(args, function, "quarter")?;
    let mut b = Binder::new();
    let year_ph = b.int(year);
    let quarter_ph = b.int(quarter);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE EXTRACT(YEAR FROM \"Start Date\") = {year_ph} \
         AND EXTRACT(QUARTER FROM \"Start Date\") = {quarter_ph} AND {EPOCH_GUARD} {}",
        order_by_fee()
    );
    Ok(b.done(sql))
}

fn by_years(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::GetProjectsByYears;
    let years = args
        .get_i64_list("years")
        .filter(|list| !list.is_empty())
        .ok_or_else(|| missing(function, "years"))?;
    let mut b = Binder::new();
    let years_ph = b.bind(SqlParam::IntArray(years));
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE EXTRACT(YEAR FROM \"Start Date\") = ANY({years_ph}) \
         AND {EPOCH_GUARD} ORDER BY \"Start Date\", {FEE} DESC NULLS LAST, {TIE_BREAK}"
    );
    Ok(b.done(sql))
}

fn compare_years(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::CompareYears;
    let year1 = required_i64(args, function, "year1")?;
    let year2 = required_i64(args, function, "year2")?;
    let mut b = Binder::new();
    let y1 = b.int(year1);
    let y2 = b.int(year2);
    let sql = format!(
        "SELECT EXTRACT(YEAR FROM \"Start Date\") as year, COUNT(*) as project_count, \
         SUM({FEE}) as total_revenue, AVG({FEE}) as avg_project_size, AVG({WIN}) as avg_win_rate \
         FROM {TABLE} WHERE EXTRACT(YEAR FROM \"Start Date\") IN ({y1}, {y2}) AND {EPOCH_GUARD} \
         GROUP BY year ORDER BY year"
    );
    Ok(b.done(sql))
}

// =============================================================================
// Rankings
// =============================================================================

fn ranked_by_fee(args: &FilterSet, ascending: bool) -> QueryResult<ResolvedQuery> {
    let mut b = Binder::new();
    let mut sql = format!("SELECT * FROM {TABLE} WHERE {FEE_PRESENT}");
    if ascending {
        sql.push_str(&format!(" AND {FEE_RAW} > 0"));
    }
    push_date_window(&mut sql, &mut b, args);
    let direction = if ascending { "ASC" } else { "DESC" };
    sql.push_str(&format!(" ORDER BY {FEE_RAW} {direction}, {TIE_BREAK}"));
    push_limit(&mut sql, &mut b, args);
    Ok(b.done(sql))
}

fn largest_in_region(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let state = required_str(args, QueryFunction::GetLargestInRegion, "state_code")?;
    let mut b = Binder::new();
    let state_ph = b.text(state);
    let mut sql = format!(
        "SELECT * FROM {TABLE} WHERE \"State Lookup\" = {state_ph} AND {FEE_PRESENT} \
         ORDER BY {FEE_RAW} DESC, {TIE_BREAK}"
    );
    push_limit(&mut sql, &mut b, args);
    Ok(b.done(sql))
}

/// Largest-by pattern shared by the category and tag rankings.
fn ranked_ilike(
    args: &FilterSet,
    function: QueryFunction,
    column: &str,
    key: &str,
) -> QueryResult<ResolvedQuery> {
    let value = required_str(args, function, key)?;
    let mut b = Binder::new();
    let pattern = b.like(&value);
    let mut sql = format!(
        "SELECT * FROM {TABLE} WHERE \"{column}\" ILIKE {pattern} AND {FEE_PRESENT} \
         ORDER BY {FEE_RAW} DESC, {TIE_BREAK}"
    );
    push_limit(&mut sql, &mut b, args);
    Ok(b.done(sql))
}

fn top_predicted_wins(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let limit = required_i64(args, QueryFunction::GetTopPredictedWins, "limit")?;
    let mut b = Binder::new();
    let limit_ph = b.int(limit);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"Status\" NOT IN ('Won', 'Lost') AND {WIN_PRESENT} \
         AND {WIN} > 50 AND \"Start Date\" >= CURRENT_DATE \
         AND \"Start Date\" <= CURRENT_DATE + INTERVAL '6 months' \
         ORDER BY {WIN} DESC, {FEE} DESC, {TIE_BREAK} LIMIT {limit_ph}"
    );
    Ok(b.done(sql))
}

// =============================================================================
// Plain filtered listings
// =============================================================================

/// `SELECT *` with one contains-match filter, ordered by fee.
fn filtered_listing(
    args: &FilterSet,
    function: QueryFunction,
    column: &str,
    key: &str,
) -> QueryResult<ResolvedQuery> {
    let value = required_str(args, function, key)?;
    let mut b = Binder::new();
    let pattern = b.like(&value);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"{column}\" ILIKE {pattern} {}",
        order_by_fee()
    );
    Ok(b.done(sql))
}

fn by_multiple_categories(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let categories = args
        .get_string_list("categories")
        .filter(|list| !list.is_empty())
        .ok_or_else(|| missing(QueryFunction::GetProjectsByMultipleCategories, "categories"))?;
    let patterns: Vec<String> = categories
        .iter()
        .map(|c| format!("%{}%", c.trim()))
        .collect();
    let mut b = Binder::new();
    let array_ph = b.bind(SqlParam::TextArray(patterns));
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"Request Category\" ILIKE ANY({array_ph}) {}",
        order_by_fee()
    );
    Ok(b.done(sql))
}

fn by_state(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let state = required_str(args, QueryFunction::GetProjectsByState, "state_code")?;
    let mut b = Binder::new();
    let state_ph = b.text(state);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"State Lookup\" = {state_ph} {}",
        order_by_fee()
    );
    Ok(b.done(sql))
}

// =============================================================================
// Tags
// =============================================================================

/// Tag frequency table. The unnest runs in a subquery so the alias is
/// legal in the outer grouping and filtering.
fn top_tags(args: &FilterSet, year_window: Option<(i64, i64)>) -> QueryResult<ResolvedQuery> {
    let mut b = Binder::new();
    let mut inner = format!(
        "SELECT TRIM(UNNEST(string_to_array(\"Tags\", ','))) as tag, {FEE} as fee \
         FROM {TABLE} WHERE \"Tags\" IS NOT NULL AND \"Tags\" != ''"
    );
    let order = match year_window {
        Some((start_year, end_year)) => {
            let start_ph = b.int(start_year);
            let end_ph = b.int(end_year);
            inner.push_str(&format!(
                " AND EXTRACT(YEAR FROM \"Start Date\") >= {start_ph} \
                 AND EXTRACT(YEAR FROM \"Start Date\") <= {end_ph}"
            ));
            "ORDER BY project_count DESC, total_value DESC NULLS LAST, tag"
        }
        None => "ORDER BY total_value DESC NULLS LAST, tag",
    };
    let mut sql = format!(
        "SELECT tag, COUNT(*) as project_count, SUM(fee) as total_value \
         FROM ({inner}) t WHERE tag != '' GROUP BY tag {order}"
    );
    push_limit(&mut sql, &mut b, args);
    Ok(b.done(sql))
}

/// Projects sharing a tag with a reference client or project. The CTE picks
/// one reference row, then unnests all of its tags.
fn shared_tags(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let mut b = Binder::new();
    let client_ph = b.text(reference_pattern(args, "reference_client"));
    let project_ph = b.text(reference_pattern(args, "reference_project"));
    let mut sql = format!(
        "WITH reference_tags AS (\
         SELECT TRIM(UNNEST(string_to_array(\"Tags\", ','))) as tag FROM (\
         SELECT \"Tags\" FROM {TABLE} WHERE \"Client\" ILIKE {client_ph} \
         OR \"Project Name\"::text ILIKE {project_ph} LIMIT 1) reference) \
         SELECT s.* FROM {TABLE} s WHERE EXISTS (\
         SELECT 1 FROM reference_tags rt WHERE s.\"Tags\" ILIKE '%' || rt.tag || '%') \
         ORDER BY CAST(NULLIF(s.\"Fee\", '') AS NUMERIC) DESC NULLS LAST, s.{TIE_BREAK}"
    );
    push_limit(&mut sql, &mut b, args);
    Ok(b.done(sql))
}

/// Conjunctive tag match: the project must carry every listed tag.
fn multiple_tags(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let tags = args
        .get_string_list("tags")
        .map(|list| {
            list.into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
        .ok_or_else(|| missing(QueryFunction::GetProjectsByMultipleTags, "tags"))?;

    let mut b = Binder::new();
    let mut sql = format!("SELECT * FROM {TABLE} WHERE \"Tags\" IS NOT NULL AND \"Tags\" != ''");
    for tag in &tags {
        let pattern = b.like(tag);
        sql.push_str(&format!(" AND \"Tags\" ILIKE {pattern}"));
    }
    sql.push_str(&format!(" {}", order_by_fee()));
    push_limit(&mut sql, &mut b, args);
    Ok(b.done(sql))
}

fn related_projects(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let name = required_str(args, QueryFunction::GetRelatedProjects, "project_name")?;
    let mut b = Binder::new();
    let target_ph = b.like(&name);
    let exclude_ph = b.like(&name);
    let sql = format!(
        "WITH target_tags AS (\
         SELECT TRIM(UNNEST(string_to_array(\"Tags\", ','))) as tag FROM (\
         SELECT \"Tags\" FROM {TABLE} WHERE \"Project Name\"::text ILIKE {target_ph} LIMIT 1) target) \
         SELECT s.*, (SELECT COUNT(*) FROM target_tags tt \
         WHERE s.\"Tags\" ILIKE '%' || tt.tag || '%') as matching_tags \
         FROM {TABLE} s WHERE EXISTS (\
         SELECT 1 FROM target_tags tt WHERE s.\"Tags\" ILIKE '%' || tt.tag || '%') \
         AND s.\"Project Name\"::text NOT ILIKE {exclude_ph} \
         ORDER BY matching_tags DESC, CAST(NULLIF(s.\"Fee\", '') AS NUMERIC) DESC NULLS LAST, \
         s.{TIE_BREAK} LIMIT 20"
    );
    Ok(b.done(sql))
}

// =============================================================================
// Companies and clients
// =============================================================================

fn compare_companies() -> ResolvedQuery {
    let sql = format!(
        "SELECT \"Company\", COUNT(*) as project_count, SUM({FEE}) as total_revenue, \
         AVG({FEE}) as avg_project_size, AVG({WIN}) as avg_win_rate FROM {TABLE} \
         WHERE \"Company\" IS NOT NULL AND \"Company\" != '' GROUP BY \"Company\" \
         ORDER BY total_revenue DESC NULLS LAST, \"Company\""
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

fn compare_opco_revenue(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let companies = args
        .get_string_list("companies")
        .filter(|list| !list.is_empty())
        .ok_or_else(|| missing(QueryFunction::CompareOpcoRevenue, "companies"))?;
    let patterns: Vec<String> = companies
        .iter()
        .map(|c| format!("%{}%", c.trim()))
        .collect();
    let mut b = Binder::new();
    let array_ph = b.bind(SqlParam::TextArray(patterns));
    let sql = format!(
        "SELECT \"Company\", COUNT(*) as project_count, SUM({FEE}) as total_revenue, \
         SUM({FEE} * {WIN} / 100) as predicted_revenue, AVG({WIN}) as avg_win_rate \
         FROM {TABLE} WHERE (\"Company\" ILIKE ANY({array_ph})) \
         AND \"Status\" NOT IN ('Won', 'Lost') GROUP BY \"Company\" \
         ORDER BY predicted_revenue DESC NULLS LAST, \"Company\""
    );
    Ok(b.done(sql))
}

fn client_and_fee_range(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::GetProjectsByClientAndFeeRange;
    let client = required_str(args, function, "client")?;
    let min_fee = required_f64(args, function, "min_fee")?;
    let max_fee = required_f64(args, function, "max_fee")?;
    let mut b = Binder::new();
    let client_ph = b.like(&client);
    let min_ph = b.float(min_fee);
    let max_ph = b.float(max_fee);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"Client\" ILIKE {client_ph} AND {FEE} >= {min_ph} \
         AND {FEE} <= {max_ph} ORDER BY {FEE} DESC, {TIE_BREAK}"
    );
    Ok(b.done(sql))
}

fn client_win_rates(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let client = required_str(args, QueryFunction::GetClientWinRates, "client")?;
    let mut b = Binder::new();
    let client_ph = b.like(&client);
    let sql = format!(
        "SELECT \"Client\", COUNT(*) as project_count, AVG({WIN}) as avg_win_rate, \
         SUM({FEE}) as total_value FROM {TABLE} WHERE \"Client\" ILIKE {client_ph} \
         AND {WIN_PRESENT} GROUP BY \"Client\" ORDER BY avg_win_rate DESC, \"Client\""
    );
    Ok(b.done(sql))
}

// =============================================================================
// Status and win rate
// =============================================================================

fn status_breakdown() -> ResolvedQuery {
    let sql = format!(
        "SELECT \"Status\", COUNT(*) as project_count, SUM({FEE}) as total_value, \
         AVG({WIN}) as avg_win_rate FROM {TABLE} GROUP BY \"Status\" \
         ORDER BY total_value DESC NULLS LAST, \"Status\""
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

fn overoptimistic_losses() -> ResolvedQuery {
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"Status\" ~* 'lost' AND {WIN} > 70 \
         ORDER BY {WIN} DESC, {TIE_BREAK}"
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

fn project_win_rate(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let name = required_str(args, QueryFunction::GetProjectWinRate, "project_name")?;
    let mut b = Binder::new();
    let name_ph = b.like(&name);
    let sql = format!(
        "SELECT \"Project Name\", \"Win %\", \"Status\", \"Fee\", \"Request Category\", \
         \"Company\", \"Point Of Contact\", \"Tags\" FROM {TABLE} \
         WHERE \"Project Name\"::text ILIKE {name_ph} ORDER BY {TIE_BREAK}"
    );
    Ok(b.done(sql))
}

fn by_win_range(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::GetProjectsByWinRange;
    let min_win = required_i64(args, function, "min_win")?;
    let max_win = required_i64(args, function, "max_win")?;
    let mut b = Binder::new();
    let min_ph = b.int(min_win);
    let max_ph = b.int(max_win);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE {WIN} >= {min_ph} AND {WIN} <= {max_ph} \
         ORDER BY {WIN} DESC, {TIE_BREAK}"
    );
    Ok(b.done(sql))
}

fn status_and_win_rate(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::GetProjectsByStatusAndWinRate;
    let status = required_str(args, function, "status")?;
    let min_win = required_i64(args, function, "min_win")?;
    let mut b = Binder::new();
    let status_ph = b.like(&status);
    let win_ph = b.int(min_win);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"Status\" ILIKE {status_ph} AND {WIN_PRESENT} \
         AND {WIN} > {win_ph} ORDER BY {WIN} DESC, {TIE_BREAK}"
    );
    Ok(b.done(sql))
}

fn predict_win_probability(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let name = required_str(args, QueryFunction::PredictWinProbability, "project_name")?;
    let mut b = Binder::new();
    let name_ph = b.like(&name);

    let p_win = r#"CAST(NULLIF(p."Win %", '') AS NUMERIC)"#;
    let similar = "FROM \"Sample\" s WHERE s.\"Request Category\" = p.\"Request Category\" \
         AND s.\"Company\" = p.\"Company\" AND s.\"Project Name\" != p.\"Project Name\" \
         AND s.\"Win %\" IS NOT NULL AND s.\"Win %\" != ''";
    let sql = format!(
        "SELECT p.\"Project Name\", {p_win} as \"Win_Percentage\", p.\"Status\", \
         CAST(NULLIF(p.\"Fee\", '') AS NUMERIC) as \"Fee\", p.\"Request Category\", \
         p.\"Company\", p.\"Point Of Contact\", p.\"Tags\", \
         (SELECT COALESCE(AVG(CAST(NULLIF(s.\"Win %\", '') AS NUMERIC)), 0) {similar}) as similar_avg_win_rate, \
         (SELECT COUNT(*) {similar}) as similar_projects_count, \
         CASE WHEN {p_win} >= 70 THEN 'High probability - Strong likelihood of winning' \
         WHEN {p_win} >= 50 THEN 'Medium-High probability - Good chance' \
         WHEN {p_win} >= 30 THEN 'Medium probability - Competitive situation' \
         WHEN {p_win} >= 10 THEN 'Low-Medium probability - Challenging' \
         ELSE 'Low probability - Consider strategic approach' END as prediction, \
         CASE WHEN p.\"Status\" ~* 'won' THEN 'Project already won!' \
         WHEN p.\"Status\" ~* 'lost' THEN 'Project was not won' \
         WHEN p.\"Status\" ~* 'submitted' THEN 'Proposal submitted - awaiting decision' \
         WHEN p.\"Status\" ~* 'lead' THEN 'Early stage - continue nurturing' \
         ELSE 'Status: ' || p.\"Status\" END as status_insight \
         FROM {TABLE} p WHERE p.\"Project Name\"::text ILIKE {name_ph} LIMIT 1"
    );
    Ok(b.done(sql))
}

// =============================================================================
// Fees and size tiers
// =============================================================================

fn by_fee_range(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let min_fee = required_f64(args, QueryFunction::GetProjectsByFeeRange, "min_fee")?;
    let mut b = Binder::new();
    let min_ph = b.float(min_fee);
    let mut sql = format!(
        "SELECT * FROM {TABLE} WHERE {FEE_PRESENT} AND {FEE_RAW} >= {min_ph}"
    );
    if let Some(max_fee) = args.get_f64("max_fee") {
        let max_ph = b.float(max_fee);
        sql.push_str(&format!(" AND {FEE_RAW} <= {max_ph}"));
    }
    sql.push_str(&format!(" ORDER BY {FEE_RAW} DESC, {TIE_BREAK}"));
    Ok(b.done(sql))
}

/// Size words resolve to fee-range conditions on the percentile boundaries,
/// so the filter matches exactly the rows the distribution labels with that
/// tier.
fn by_size(args: &FilterSet, boundaries: &SizeBoundaries) -> QueryResult<ResolvedQuery> {
    let tier = parse_tier(args, QueryFunction::GetProjectsBySize)?;
    let mut b = Binder::new();
    let mut sql = format!("SELECT * FROM {TABLE} WHERE {FEE_PRESENT} AND {FEE} > 0");
    push_tier_bounds(&mut sql, &mut b, boundaries, tier);
    sql.push_str(&format!(" ORDER BY {FEE_RAW} DESC, {TIE_BREAK}"));
    Ok(b.done(sql))
}

/// The tier label is computed in a subquery because the engine cannot
/// reference a CASE alias from another expression in the same scope.
fn size_distribution(boundaries: &SizeBoundaries) -> ResolvedQuery {
    let case = boundaries.case_expression();
    let sql = format!(
        "SELECT size_tier, COUNT(*) as project_count, \
         ROUND(SUM(fee)::numeric, 0) as total_value, \
         ROUND(AVG(fee)::numeric, 0) as avg_fee, \
         ROUND(MIN(fee)::numeric, 0) as min_fee, \
         ROUND(MAX(fee)::numeric, 0) as max_fee, \
         ROUND(AVG(win_rate)::numeric, 1) as avg_win_rate \
         FROM (SELECT {case} as size_tier, {FEE} as fee, {WIN} as win_rate \
         FROM {TABLE} WHERE {FEE_PRESENT} AND {FEE} > 0) tiers \
         GROUP BY size_tier ORDER BY MIN(fee)"
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

fn group_by_type_size(boundaries: &SizeBoundaries) -> ResolvedQuery {
    let case = boundaries.case_expression();
    let sql = format!(
        "SELECT \"Project Type\", size_category, COUNT(*) as project_count, \
         ROUND(SUM(fee)::numeric, 0) as total_value, \
         ROUND(AVG(win_rate)::numeric, 1) as avg_win_rate \
         FROM (SELECT \"Project Type\", {case} as size_category, {FEE} as fee, {WIN} as win_rate \
         FROM {TABLE} WHERE {FEE_PRESENT} AND {FEE} > 0) grouped \
         GROUP BY \"Project Type\", size_category ORDER BY \"Project Type\", MIN(fee)"
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

// =============================================================================
// Similarity
// =============================================================================

fn similar_projects(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let name = required_str(args, QueryFunction::GetSimilarProjects, "project_name")?;
    let mut b = Binder::new();
    let target_ph = b.like(&name);
    let exclude_ph = b.like(&name);
    let sql = format!(
        "WITH target AS (SELECT \"Request Category\", \"Company\", \"Fee\", \"Tags\" \
         FROM {TABLE} WHERE \"Project Name\"::text ILIKE {target_ph} LIMIT 1) \
         SELECT s.*, ABS(CAST(NULLIF(s.\"Fee\", '') AS NUMERIC) - \
         CAST(NULLIF(t.\"Fee\", '') AS NUMERIC)) as fee_diff \
         FROM {TABLE} s, target t WHERE s.\"Request Category\" = t.\"Request Category\" \
         AND s.\"Company\" = t.\"Company\" AND s.\"Project Name\"::text NOT ILIKE {exclude_ph} \
         ORDER BY fee_diff, s.{TIE_BREAK} LIMIT 10"
    );
    Ok(b.done(sql))
}

fn compare_project_with_similar(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let name = required_str(args, QueryFunction::CompareProjectWithSimilar, "project_name")?;
    let mut b = Binder::new();
    let target_ph = b.like(&name);
    let flag_ph = b.like(&name);
    let sql = format!(
        "WITH target_project AS (SELECT * FROM {TABLE} \
         WHERE \"Project Name\"::text ILIKE {target_ph} LIMIT 1) \
         SELECT s.*, CASE WHEN s.\"Project Name\"::text ILIKE {flag_ph} THEN 1 ELSE 0 END as is_target \
         FROM {TABLE} s, target_project tp WHERE s.\"Request Category\" = tp.\"Request Category\" \
         AND s.\"Company\" = tp.\"Company\" \
         ORDER BY ABS(CAST(NULLIF(s.\"Fee\", '') AS NUMERIC) - \
         CAST(NULLIF(tp.\"Fee\", '') AS NUMERIC)), s.{TIE_BREAK} LIMIT 20"
    );
    Ok(b.done(sql))
}

// =============================================================================
// Duration, listings, lookups, projections
// =============================================================================

fn pursuit_duration() -> ResolvedQuery {
    let age = r#"(CURRENT_DATE - "Start Date")"#;
    let sql = format!(
        "SELECT \"Company\", \"Status\", \"Request Category\", COUNT(*) as total_pursuits, \
         ROUND(AVG({age})) as avg_days_old, \
         ROUND(PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY {age})) as median_days_old, \
         MIN({age}) as newest_pursuit_days, MAX({age}) as oldest_pursuit_days, \
         TO_CHAR(MIN(\"Start Date\"), 'YYYY-MM-DD') as oldest_start_date, \
         TO_CHAR(MAX(\"Start Date\"), 'YYYY-MM-DD') as newest_start_date, \
         ROUND(AVG({WIN})::numeric, 1) as avg_win_rate, \
         ROUND(SUM({FEE})::numeric, 0) as total_value \
         FROM {TABLE} WHERE \"Status\" IN ('Won', 'Lost') AND \"Start Date\" IS NOT NULL \
         AND \"Start Date\" > '2020-01-01' AND \"Start Date\" <= CURRENT_DATE \
         GROUP BY \"Company\", \"Status\", \"Request Category\" HAVING COUNT(*) >= 2 \
         ORDER BY \"Company\", \"Status\", avg_days_old DESC, \"Request Category\""
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

fn all_projects() -> ResolvedQuery {
    let sql = format!(
        "SELECT \"Project Type\", \"Start Date\", \"Fee\", \"Client\", \"Project Name\", \
         \"Status\", \"Company\", \"Win %\", \"Tags\" FROM {TABLE} \
         ORDER BY \"Start Date\" DESC NULLS LAST, {TIE_BREAK}"
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

fn projects_sorted() -> ResolvedQuery {
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE {WIN_PRESENT} AND {FEE_PRESENT} \
         ORDER BY {WIN} DESC, {FEE} DESC, {TIE_BREAK}"
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

fn project_by_id(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let function = QueryFunction::GetProjectById;
    let name = lookup_with_fallback(args, "project_name")
        .or_else(|| lookup_with_fallback(args, "internal_id"))
        .ok_or_else(|| missing(function, "project_name"))?;
    let id = lookup_with_fallback(args, "internal_id").unwrap_or_else(|| name.clone());
    let mut b = Binder::new();
    let name_ph = b.like(&name);
    let id_ph = b.like(&id);
    let sql = format!(
        "SELECT * FROM {TABLE} WHERE \"Project Name\"::text ILIKE {name_ph} \
         OR \"Internal Id\" ILIKE {id_ph} ORDER BY {TIE_BREAK}"
    );
    Ok(b.done(sql))
}

fn revenue_by_category(args: &FilterSet) -> QueryResult<ResolvedQuery> {
    let category = required_str(args, QueryFunction::GetRevenueByCategory, "category")?;
    let mut b = Binder::new();
    let category_ph = b.like(&category);
    let mut sql = format!(
        "SELECT \"Request Category\", COUNT(*) as project_count, SUM({FEE}) as total_revenue, \
         AVG({FEE}) as avg_revenue, AVG({WIN}) as avg_win_rate FROM {TABLE} \
         WHERE \"Request Category\" ILIKE {category_ph}"
    );
    if let Some(status) = args.get_str("status").filter(|s| !s.is_empty()) {
        let status_ph = b.like(status);
        sql.push_str(&format!(" AND \"Status\" ILIKE {status_ph}"));
    }
    sql.push_str(" GROUP BY \"Request Category\" ORDER BY \"Request Category\"");
    Ok(b.done(sql))
}

fn weighted_revenue_projection() -> ResolvedQuery {
    let sql = format!(
        "SELECT \"Status\", COUNT(*) as project_count, SUM({FEE}) as total_value, \
         SUM({FEE} * {WIN} / 100) as weighted_expected_value, AVG({WIN}) as avg_win_rate \
         FROM {TABLE} WHERE \"Status\" NOT IN ('Won', 'Lost') AND {WIN_PRESENT} \
         GROUP BY \"Status\" ORDER BY weighted_expected_value DESC, \"Status\""
    );
    ResolvedQuery {
        sql,
        params: Vec::new(),
    }
}

// =============================================================================
// Combined filters
// =============================================================================

/// Builds the multi-filter listing: one bound condition per present filter,
/// in a fixed order so resolution stays deterministic.
fn combined_filters(args: &FilterSet, boundaries: &SizeBoundaries) -> QueryResult<ResolvedQuery> {
    let mut b = Binder::new();
    let mut sql = format!("SELECT * FROM {TABLE} WHERE 1=1");

    if let Some(raw) = args.get_str("size").filter(|s| !s.is_empty()) {
        let tier =
            SizeTier::parse(raw).ok_or_else(|| QueryError::InvalidRequest {
                message: format!("unknown size tier '{raw}'"),
            })?;
        push_tier_bounds(&mut sql, &mut b, boundaries, tier);
    }

    if let Some(categories) = args.get_string_list("categories").filter(|l| !l.is_empty()) {
        let conditions: Vec<String> = categories
            .iter()
            .map(|category| {
                let pattern = b.like(category.trim());
                format!("\"Request Category\" ILIKE {pattern}")
            })
            .collect();
        sql.push_str(&format!(" AND ({})", conditions.join(" OR ")));
    }

    if let Some(tags) = args.get_string_list("tags").filter(|l| !l.is_empty()) {
        for tag in &tags {
            let pattern = b.like(tag.trim());
            sql.push_str(&format!(" AND \"Tags\" ILIKE {pattern}"));
        }
    }

    if let Some(status) = args.get_str("status").filter(|s| !s.is_empty()) {
        let pattern = b.like(status);
        sql.push_str(&format!(" AND \"Status\" ILIKE {pattern}"));
    }

    if let Some(company) = args.get_str("company").filter(|s| !s.is_empty()) {
        let pattern = b.like(company);
        sql.push_str(&format!(" AND \"Company\" ILIKE {pattern}"));
    }

    if let Some(state) = args.get_str("state_code").filter(|s| !s.is_empty()) {
        let state_ph = b.text(state);
        sql.push_str(&format!(" AND \"State Lookup\" = {state_ph}"));
    }

    if let Some(min_fee) = args.get_f64("min_fee") {
        let min_ph = b.float(min_fee);
        sql.push_str(&format!(" AND {FEE} >= {min_ph}"));
    }
    if let Some(max_fee) = args.get_f64("max_fee") {
        let max_ph = b.float(max_fee);
        sql.push_str(&format!(" AND {FEE} <= {max_ph}"));
    }

    if let Some(min_win) = args.get_i64("min_win") {
        let min_ph = b.int(min_win);
        sql.push_str(&format!(" AND {WIN} >= {min_ph}"));
    }
    if let Some(max_win) = args.get_i64("max_win") {
        let max_ph = b.int(max_win);
        sql.push_str(&format!(" AND {WIN} <= {max_ph}"));
    }

    if let Some(start) = args.get_date("start_date") {
        let start_ph = b.date(start);
        sql.push_str(&format!(" AND \"Start Date\" >= {start_ph}"));
    }
    if let Some(end) = args.get_date("end_date") {
        let end_ph = b.date(end);
        sql.push_str(&format!(" AND \"Start Date\" <= {end_ph}"));
    }

    sql.push_str(&format!(" AND {EPOCH_GUARD} {}", order_by_fee()));
    push_limit(&mut sql, &mut b, args);
    Ok(b.done(sql))
}

// =============================================================================
// Tests
// =============================================================================
