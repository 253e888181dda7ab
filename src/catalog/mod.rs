//! Closed catalog of pipeline query functions.
//!
//! Every answerable question maps to exactly one entry here. An entry
//! declares the wire name the classifier selects, the argument schema that
//! selection must satisfy, and the default chart for its results. The SQL
//! behind each entry lives in [`templates`]; nothing outside the catalog can
//! reach the database.

pub mod templates;

pub use templates::{resolve, ResolvedQuery, SqlParam};

use serde::{Deserialize, Serialize};

use crate::model::ChartKind;

// =============================================================================
// Function names
// =============================================================================

/// The closed set of query functions the classifier may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFunction {
    GetProjectsByYear,
    GetProjectsByDateRange,
    GetProjectsByQuarter,
    GetProjectsByYears,
    GetProjectsByCombinedFilters,
    GetLargestProjects,
    GetSmallestProjects,
    GetLargestInRegion,
    GetLargestByCategory,
    GetProjectsByCategory,
    GetProjectsByProjectType,
    GetProjectsByMultipleCategories,
    GetLargestByTags,
    GetProjectsByTags,
    GetTopTags,
    GetTopTagsByDate,
    GetProjectsBySharedTags,
    GetProjectsByMultipleTags,
    GetProjectsByCompany,
    CompareCompanies,
    CompareOpcoRevenue,
    GetProjectsByClient,
    GetProjectsByClientAndFeeRange,
    GetClientWinRates,
    GetProjectsByStatus,
    GetStatusBreakdown,
    GetOveroptimisticLosses,
    GetTopPredictedWins,
    GetProjectWinRate,
    GetProjectsByWinRange,
    PredictWinProbability,
    GetProjectsByState,
    GetProjectsByFeeRange,
    GetProjectsBySize,
    GetSizeDistribution,
    GetSimilarProjects,
    CompareProjectWithSimilar,
    GetRelatedProjects,
    GetProjectsByStatusAndWinRate,
    AnalyzePursuitDuration,
    GetAllProjects,
    GetProjectsSorted,
    GroupProjectsByTypeSize,
    GetProjectsByContact,
    GetProjectById,
    GetRevenueByCategory,
    GetWeightedRevenueProjection,
    CompareYears,
}

impl QueryFunction {
    pub const COUNT: usize = 48;

    /// Wire name, identical to the serde snake_case rendering.
    pub fn name(self) -> &'static str {
        match self {
            QueryFunction::GetProjectsByYear => "get_projects_by_year",
            QueryFunction::GetProjectsByDateRange => "get_projects_by_date_range",
            QueryFunction::GetProjectsByQuarter => "get_projects_by_quarter",
            QueryFunction::GetProjectsByYears => "get_projects_by_years",
            QueryFunction::GetProjectsByCombinedFilters => "get_projects_by_combined_filters",
            QueryFunction::GetLargestProjects => "get_largest_projects",
            QueryFunction::GetSmallestProjects => "get_smallest_projects",
            QueryFunction::GetLargestInRegion => "get_largest_in_region",
            QueryFunction::GetLargestByCategory => "get_largest_by_category",
            QueryFunction::GetProjectsByCategory => "get_projects_by_category",
            QueryFunction::GetProjectsByProjectType => "get_projects_by_project_type",
            QueryFunction::GetProjectsByMultipleCategories => "get_projects_by_multiple_categories",
            QueryFunction::GetLargestByTags => "get_largest_by_tags",
            QueryFunction::GetProjectsByTags => "get_projects_by_tags",
            QueryFunction::GetTopTags => "get_top_tags",
            QueryFunction::GetTopTagsByDate => "get_top_tags_by_date",
            QueryFunction::GetProjectsBySharedTags => "get_projects_by_shared_tags",
            QueryFunction::GetProjectsByMultipleTags => "get_projects_by_multiple_tags",
            QueryFunction::GetProjectsByCompany => "get_projects_by_company",
            QueryFunction::CompareCompanies => "compare_companies",
            QueryFunction::CompareOpcoRevenue => "compare_opco_revenue",
            QueryFunction::GetProjectsByClient => "get_projects_by_client",
            QueryFunction::GetProjectsByClientAndFeeRange => "get_projects_by_client_and_fee_range",
            QueryFunction::GetClientWinRates => "get_client_win_rates",
            QueryFunction::GetProjectsByStatus => "get_projects_by_status",
            QueryFunction::GetStatusBreakdown => "get_status_breakdown",
            QueryFunction::GetOveroptimisticLosses => "get_overoptimistic_losses",
            QueryFunction::GetTopPredictedWins => "get_top_predicted_wins",
            QueryFunction::GetProjectWinRate => "get_project_win_rate",
            QueryFunction::GetProjectsByWinRange => "get_projects_by_win_range",
            QueryFunction::PredictWinProbability => "predict_win_probability",
            QueryFunction::GetProjectsByState => "get_projects_by_state",
            QueryFunction::GetProjectsByFeeRange => "get_projects_by_fee_range",
            QueryFunction::GetProjectsBySize => "get_projects_by_size",
            QueryFunction::GetSizeDistribution => "get_size_distribution",
            QueryFunction::GetSimilarProjects => "get_similar_projects",
            QueryFunction::CompareProjectWithSimilar => "compare_project_with_similar",
            QueryFunction::GetRelatedProjects => "get_related_projects",
            QueryFunction::GetProjectsByStatusAndWinRate => "get_projects_by_status_and_win_rate",
            QueryFunction::AnalyzePursuitDuration => "analyze_pursuit_duration",
            QueryFunction::GetAllProjects => "get_all_projects",
            QueryFunction::GetProjectsSorted => "get_projects_sorted",
            QueryFunction::GroupProjectsByTypeSize => "group_projects_by_type_size",
            QueryFunction::GetProjectsByContact => "get_projects_by_contact",
            QueryFunction::GetProjectById => "get_project_by_id",
            QueryFunction::GetRevenueByCategory => "get_revenue_by_category",
            QueryFunction::GetWeightedRevenueProjection => "get_weighted_revenue_projection",
            QueryFunction::CompareYears => "compare_years",
        }
    }

    /// Looks up a wire name. `None` for anything outside the catalog.
    pub fn from_name(name: &str) -> Option<QueryFunction> {
        CATALOG
            .iter()
            .find(|spec| spec.function.name() == name)
            .map(|spec| spec.function)
    }

    pub fn spec(self) -> &'static FunctionSpec {
        &CATALOG[self as usize]
    }
}

// =============================================================================
// Parameter schemas
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Str,
    Int,
    Float,
    StrList,
    IntList,
}

impl ParamKind {
    /// JSON schema type name used in the tool definition sent to the model.
    pub fn json_type(self) -> &'static str {
        match self {
            ParamKind::Str => "string",
            ParamKind::Int => "integer",
            ParamKind::Float => "number",
            ParamKind::StrList | ParamKind::IntList => "array",
        }
    }

    pub fn item_type(self) -> Option<&'static str> {
        match self {
            ParamKind::StrList => Some("string"),
            ParamKind::IntList => Some("integer"),
            _ => None,
        }
    }
}

/// One declared argument of a catalog function.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

/// Default chart attached to a function's result set.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub value_field: &'static str,
}

/// Catalog entry: wire name, model-facing description, schema, chart default.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FunctionSpec {
    pub function: QueryFunction,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub chart: Option<ChartSpec>,
}

impl FunctionSpec {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.param(name).is_some()
    }
}

const fn req(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
        description,
    }
}

const fn opt(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        description,
    }
}

const fn bar(value_field: &'static str) -> Option<ChartSpec> {
    Some(ChartSpec {
        kind: ChartKind::Bar,
        value_field,
    })
}

const fn pie(value_field: &'static str) -> Option<ChartSpec> {
    Some(ChartSpec {
        kind: ChartKind::Pie,
        value_field,
    })
}

const TIME_REFERENCE_HINT: &str = "Natural language time reference. Extract the EXACT user's \
    time phrase, e.g. 'next ten months', 'this quarter', 'soon', 'Q1 2026', 'in 2026', \
    'between January and March 2026'. DO NOT calculate dates - just extract the user's phrase.";

/// Catalog entries, indexed by `QueryFunction` discriminant.
pub static CATALOG: [FunctionSpec; QueryFunction::COUNT] = [
    FunctionSpec {
        function: QueryFunction::GetProjectsByYear,
        description: "Get all projects in a specific year",
        params: &[req("year", ParamKind::Int, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByDateRange,
        description: "Get projects between two dates",
        params: &[
            req("start_date", ParamKind::Str, "ISO date YYYY-MM-DD"),
            req("end_date", ParamKind::Str, "ISO date YYYY-MM-DD"),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByQuarter,
        description: "Get projects in specific quarter",
        params: &[
            req("year", ParamKind::Int, ""),
            req("quarter", ParamKind::Int, "1 to 4"),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByYears,
        description: "Get projects in multiple years",
        params: &[req("years", ParamKind::IntList, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByCombinedFilters,
        description: "Get projects matching MULTIPLE filters simultaneously. Use when the \
            question combines two or more of: size tier, categories, tags, status, company, \
            state, fee bounds, win bounds, a time window.",
        params: &[
            opt("size", ParamKind::Str, "Size category: Micro, Small, Medium, Large, Mega"),
            opt("categories", ParamKind::StrList, "List of request categories"),
            opt("tags", ParamKind::StrList, "List of tags"),
            opt("status", ParamKind::Str, "Project status"),
            opt("company", ParamKind::Str, "Company/OPCO name"),
            opt("state_code", ParamKind::Str, "State lookup code"),
            opt("min_fee", ParamKind::Float, "Minimum fee amount"),
            opt("max_fee", ParamKind::Float, "Maximum fee amount"),
            opt("min_win", ParamKind::Int, "Minimum win percentage"),
            opt("max_win", ParamKind::Int, "Maximum win percentage"),
            opt("time_reference", ParamKind::Str, TIME_REFERENCE_HINT),
            opt("limit", ParamKind::Int, "Result limit"),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetLargestProjects,
        description: "Get largest/highest/biggest/top projects by fee",
        params: &[
            opt("limit", ParamKind::Int, ""),
            opt("start_date", ParamKind::Str, "ISO date YYYY-MM-DD"),
            opt("end_date", ParamKind::Str, "ISO date YYYY-MM-DD"),
            opt("start_year", ParamKind::Int, ""),
            opt("end_year", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetSmallestProjects,
        description: "Get smallest/lowest projects by fee",
        params: &[
            opt("limit", ParamKind::Int, ""),
            opt("start_date", ParamKind::Str, "ISO date YYYY-MM-DD"),
            opt("end_date", ParamKind::Str, "ISO date YYYY-MM-DD"),
            opt("start_year", ParamKind::Int, ""),
            opt("end_year", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetLargestInRegion,
        description: "Get largest pursuits in specific region/state",
        params: &[
            req("state_code", ParamKind::Str, "State lookup code, exact match"),
            opt("limit", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetLargestByCategory,
        description: "Get largest projects in REQUEST CATEGORY field (Healthcare category, \
            Education category, Transportation category, etc.). DO NOT use if user explicitly \
            mentions 'tags'.",
        params: &[
            req("category", ParamKind::Str, ""),
            opt("limit", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByCategory,
        description: "Get projects by request category",
        params: &[req("category", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByProjectType,
        description: "Get projects by project type",
        params: &[req("project_type", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByMultipleCategories,
        description: "Get projects in multiple categories",
        params: &[req("categories", ParamKind::StrList, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetLargestByTags,
        description: "Get largest/top/biggest projects with specific TAGS. Use this when user \
            explicitly mentions 'tags', 'tagged', or phrases like 'largest healthcare tags', \
            'top projects with X tags'.",
        params: &[
            req("tag", ParamKind::Str, ""),
            opt("limit", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByTags,
        description: "Get ALL projects with specific tags (not sorted by size). Use when user \
            asks for 'projects with X tag' without mentioning 'largest' or 'top'.",
        params: &[req("tag", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetTopTags,
        description: "Get top tags across all projects",
        params: &[opt("limit", ParamKind::Int, "")],
        chart: bar("total_value"),
    },
    FunctionSpec {
        function: QueryFunction::GetTopTagsByDate,
        description: "Get top tags for projects in specific date range",
        params: &[
            req("start_year", ParamKind::Int, ""),
            req("end_year", ParamKind::Int, ""),
            opt("limit", ParamKind::Int, ""),
        ],
        chart: bar("project_count"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsBySharedTags,
        description: "Get projects sharing tags with a reference project or client",
        params: &[
            opt("reference_client", ParamKind::Str, ""),
            opt("reference_project", ParamKind::Str, ""),
            opt("limit", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByMultipleTags,
        description: "Get projects that have ALL specified tags. Use when user mentions \
            multiple tags with 'and', '&', or commas. Examples: 'Rail and Transit tags', \
            'projects with Rail & Transit & Infrastructure'.",
        params: &[
            req(
                "tags",
                ParamKind::StrList,
                "List of tags to search for (up to 5 tags). Project must have ALL tags.",
            ),
            opt("limit", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByCompany,
        description: "Get projects by company/OPCO",
        params: &[req("company", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::CompareCompanies,
        description: "Compare all companies by revenue, count, win rate",
        params: &[],
        chart: bar("total_revenue"),
    },
    FunctionSpec {
        function: QueryFunction::CompareOpcoRevenue,
        description: "Compare predicted revenue between specific OPCOs/companies",
        params: &[req("companies", ParamKind::StrList, "")],
        chart: bar("predicted_revenue"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByClient,
        description: "Get all projects for specific client",
        params: &[req("client", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByClientAndFeeRange,
        description: "Get projects for client within fee range",
        params: &[
            req("client", ParamKind::Str, ""),
            req("min_fee", ParamKind::Float, ""),
            req("max_fee", ParamKind::Float, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetClientWinRates,
        description: "Get win rates for specific client",
        params: &[req("client", ParamKind::Str, "")],
        chart: bar("avg_win_rate"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByStatus,
        description: "Get projects by status",
        params: &[req("status", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetStatusBreakdown,
        description: "Get breakdown of all projects by status",
        params: &[],
        chart: pie("project_count"),
    },
    FunctionSpec {
        function: QueryFunction::GetOveroptimisticLosses,
        description: "Get LOST projects where win percentage was above 70%. ONLY use when user \
            specifically asks about 'overoptimistic losses', 'lost projects with high \
            predictions', or 'losses we thought we would win'. DO NOT use for 'submitted' or \
            'active' projects.",
        params: &[],
        chart: bar("Win %"),
    },
    FunctionSpec {
        function: QueryFunction::GetTopPredictedWins,
        description: "Get top N projects predicted to win",
        params: &[req("limit", ParamKind::Int, "")],
        chart: bar("Win %"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectWinRate,
        description: "Get win rate for specific project",
        params: &[req("project_name", ParamKind::Str, "")],
        chart: None,
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByWinRange,
        description: "Get projects with win percentage in range",
        params: &[
            req("min_win", ParamKind::Int, ""),
            req("max_win", ParamKind::Int, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::PredictWinProbability,
        description: "Predict if we will win/get a project",
        params: &[req("project_name", ParamKind::Str, "")],
        chart: None,
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByState,
        description: "Get projects in specific state/region",
        params: &[req("state_code", ParamKind::Str, "State lookup code, exact match")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByFeeRange,
        description: "Get projects within fee range",
        params: &[
            req("min_fee", ParamKind::Float, ""),
            opt("max_fee", ParamKind::Float, ""),
        ],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsBySize,
        description: "Get projects by DYNAMIC size category calculated from percentiles. Size \
            is one of: 'Micro (<p20)', 'Small (p20-p40)', 'Medium (p40-p60)', 'Large \
            (p60-p80)', 'Mega (>p80)'. The exact dollar ranges are calculated dynamically from \
            actual data distribution.",
        params: &[req(
            "size",
            ParamKind::Str,
            "Size category - match exactly as shown: 'Micro', 'Small', 'Medium', 'Large', or 'Mega'",
        )],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetSizeDistribution,
        description: "Get distribution of projects by DYNAMIC size tiers calculated from \
            actual fee percentiles (20%, 40%, 60%, 80%). Shows project count and total value \
            for each tier.",
        params: &[],
        chart: pie("project_count"),
    },
    FunctionSpec {
        function: QueryFunction::GetSimilarProjects,
        description: "Find similar projects to a given project",
        params: &[req("project_name", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::CompareProjectWithSimilar,
        description: "Compare specific project with similar ones",
        params: &[req("project_name", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetRelatedProjects,
        description: "Get related projects based on shared tags",
        params: &[req("project_name", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByStatusAndWinRate,
        description: "Get projects by specific status (submitted, lost, won, lead, proposal \
            development, etc.) combined with win percentage threshold. Use when user asks for \
            projects with BOTH status AND win rate conditions, e.g. 'submitted projects with \
            Win% > 70%'.",
        params: &[
            req("status", ParamKind::Str, "Project status: submitted, lost, won, lead, etc."),
            req("min_win", ParamKind::Int, "Minimum win percentage threshold (e.g., 70 for >70%)"),
        ],
        chart: bar("Win %"),
    },
    FunctionSpec {
        function: QueryFunction::AnalyzePursuitDuration,
        description: "Analyze pursuit duration from lead to win/loss",
        params: &[],
        chart: bar("avg_days_old"),
    },
    FunctionSpec {
        function: QueryFunction::GetAllProjects,
        description: "List all projects with basic fields",
        params: &[],
        chart: None,
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsSorted,
        description: "Get projects sorted by win percentage then fee amount",
        params: &[],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GroupProjectsByTypeSize,
        description: "Group projects by type and size category",
        params: &[],
        chart: bar("total_value"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectsByContact,
        description: "Get projects by point of contact person",
        params: &[req("contact_name", ParamKind::Str, "")],
        chart: bar("Fee"),
    },
    FunctionSpec {
        function: QueryFunction::GetProjectById,
        description: "Find specific project by name or ID",
        params: &[
            req("project_name", ParamKind::Str, ""),
            opt("internal_id", ParamKind::Str, ""),
        ],
        chart: None,
    },
    FunctionSpec {
        function: QueryFunction::GetRevenueByCategory,
        description: "Get total revenue aggregated by category. Use when user asks 'total \
            revenue in X', 'how much money in X category', 'value of X projects'.",
        params: &[
            req("category", ParamKind::Str, "Request category"),
            opt("status", ParamKind::Str, "Optional: filter by status"),
        ],
        chart: None,
    },
    FunctionSpec {
        function: QueryFunction::GetWeightedRevenueProjection,
        description: "Get weighted revenue projections based on win probability. Use for \
            'what if' scenarios like 'predicted revenue if we win', 'expected value', \
            'potential revenue'.",
        params: &[],
        chart: bar("weighted_expected_value"),
    },
    FunctionSpec {
        function: QueryFunction::CompareYears,
        description: "Compare two specific years side-by-side. Use for 'compare 2025 vs \
            2026', 'year over year', '2025 compared to 2026'.",
        params: &[
            req("year1", ParamKind::Int, "First year to compare"),
            req("year2", ParamKind::Int, "Second year to compare"),
        ],
        chart: bar("total_revenue"),
    },
];

// =============================================================================
// Argument validation
// =============================================================================

use crate::model::FilterSet;
use crate::percentile::SizeTier;

/// Checks a merged filter set against the function's declared schema.
///
/// Returns the first problem as a human-readable reason; the caller wraps it
/// into a classification error carrying the original question.
pub fn validate_arguments(function: QueryFunction, args: &FilterSet) -> Result<(), String> {
    let spec = function.spec();

    for param in spec.params {
        let value = args.get(param.name);
        if value.is_none() || value.is_some_and(serde_json::Value::is_null) {
            if param.required && !has_fallback(function, param.name, args) {
                return Err(format!(
                    "missing required parameter '{}' for {}",
                    param.name,
                    function.name()
                ));
            }
            continue;
        }

        let ok = match param.kind {
            ParamKind::Str => args.get_str(param.name).is_some(),
            ParamKind::Int => args.get_i64(param.name).is_some(),
            ParamKind::Float => args.get_f64(param.name).is_some(),
            ParamKind::StrList => args
                .get_string_list(param.name)
                .is_some_and(|list| !list.is_empty()),
            ParamKind::IntList => args
                .get_i64_list(param.name)
                .is_some_and(|list| !list.is_empty()),
        };
        if !ok {
            return Err(format!(
                "parameter '{}' of {} must be a {}",
                param.name,
                function.name(),
                param.kind.json_type()
            ));
        }
    }

    // Size words come from a fixed vocabulary.
    if spec.declares("size") {
        if let Some(raw) = args.get_str("size") {
            if SizeTier::parse(raw).is_none() {
                return Err(format!(
                    "unknown size tier '{raw}', expected Micro, Small, Medium, Large or Mega"
                ));
            }
        }
    }

    Ok(())
}

/// Required parameters that can be satisfied from a sibling argument.
fn has_fallback(function: QueryFunction, param: &str, args: &FilterSet) -> bool {
    match (function, param) {
        // A project lookup by bare ID is still answerable.
        (QueryFunction::GetProjectById, "project_name") => args.get_str("internal_id").is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(pairs: &[(&str, serde_json::Value)]) -> FilterSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn catalog_is_indexed_by_discriminant() {
        assert_eq!(CATALOG.len(), QueryFunction::COUNT);
        for (index, spec) in CATALOG.iter().enumerate() {
            assert_eq!(spec.function as usize, index, "{}", spec.function.name());
        }
    }

    #[test]
    fn wire_names_round_trip() {
        for spec in &CATALOG {
            let function = spec.function;
            assert_eq!(QueryFunction::from_name(function.name()), Some(function));

            // serde rendering must agree with name()
            let serialized = serde_json::to_value(function).unwrap();
            assert_eq!(serialized, json!(function.name()));
        }
        assert_eq!(QueryFunction::from_name("drop_table"), None);
        assert_eq!(QueryFunction::from_name(""), None);
    }

    #[test]
    fn validates_required_parameters() {
        let err = validate_arguments(QueryFunction::GetProjectsByYear, &FilterSet::new())
            .unwrap_err();
        assert!(err.contains("year"));

        let args = filters(&[("year", json!(2024))]);
        assert!(validate_arguments(QueryFunction::GetProjectsByYear, &args).is_ok());

        // numeric strings coerce
        let args = filters(&[("year", json!("2024"))]);
        assert!(validate_arguments(QueryFunction::GetProjectsByYear, &args).is_ok());
    }

    #[test]
    fn validates_size_vocabulary() {
        let args = filters(&[("size", json!("Mega"))]);
        assert!(validate_arguments(QueryFunction::GetProjectsBySize, &args).is_ok());

        let args = filters(&[("size", json!("gargantuan"))]);
        let err = validate_arguments(QueryFunction::GetProjectsBySize, &args).unwrap_err();
        assert!(err.contains("size tier"));

        // combined filters leave size optional but still constrained
        let args = filters(&[("size", json!("huge"))]);
        assert!(validate_arguments(QueryFunction::GetProjectsByCombinedFilters, &args).is_err());
        assert!(
            validate_arguments(QueryFunction::GetProjectsByCombinedFilters, &FilterSet::new())
                .is_ok()
        );
    }

    #[test]
    fn project_lookup_accepts_id_without_name() {
        let args = filters(&[("internal_id", json!("P-1042"))]);
        assert!(validate_arguments(QueryFunction::GetProjectById, &args).is_ok());
        assert!(validate_arguments(QueryFunction::GetProjectById, &FilterSet::new()).is_err());
    }

    #[test]
    fn list_parameters_reject_scalars_of_wrong_shape() {
        let args = filters(&[("years", json!([2024, 2025]))]);
        assert!(validate_arguments(QueryFunction::GetProjectsByYears, &args).is_ok());

        let args = filters(&[("years", json!(["x"]))]);
        assert!(validate_arguments(QueryFunction::GetProjectsByYears, &args).is_err());

        let args = filters(&[("tags", json!(["Rail", "Transit"]))]);
        assert!(validate_arguments(QueryFunction::GetProjectsByMultipleTags, &args).is_ok());
    }
}
