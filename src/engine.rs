//! Per-request orchestration.
//!
//! One question flows strictly sequentially through classification, merge,
//! template resolution, execution and assembly; each step needs the
//! previous step's output and nothing runs in parallel inside a request.
//! Every failure collapses to the `{success: false, error, message}`
//! envelope here, at the boundary — callers never see a partial success.
//! The one exception is the narrative call, which degrades silently.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::assemble;
use crate::catalog;
use crate::classifier::{ChatModel, Classification, IntentClassifier};
use crate::error::{QueryError, QueryResult};
use crate::executor::ExecuteQuery;
use crate::merge;
use crate::model::{ConversationContext, QueryRequest, QueryResponse};
use crate::percentile::SizeBoundaries;

/// Source of the current size-tier boundaries.
///
/// The engine asks for boundaries once per request; implementations decide
/// how fresh that answer is. [`StaticBoundaries`] serves tests and offline
/// builds, the pool-backed source refreshes through the percentile cache.
#[async_trait]
pub trait BoundarySource: Send + Sync {
    async fn current(&self) -> SizeBoundaries;
}

/// Fixed boundaries, never refreshed.
pub struct StaticBoundaries(pub SizeBoundaries);

#[async_trait]
impl BoundarySource for StaticBoundaries {
    async fn current(&self) -> SizeBoundaries {
        self.0
    }
}

#[cfg(feature = "database")]
pub use db::CachedBoundaries;

#[cfg(feature = "database")]
mod db {
    use async_trait::async_trait;
    use sqlx::PgPool;

    use super::BoundarySource;
    use crate::percentile::{SizeBoundaries, SizeTierCache};

    /// Percentile boundaries from the store, behind the long-interval cache.
    pub struct CachedBoundaries {
        pool: PgPool,
        cache: SizeTierCache,
    }

    impl CachedBoundaries {
        pub fn new(pool: PgPool) -> Self {
            Self {
                pool,
                cache: SizeTierCache::default(),
            }
        }
    }

    #[async_trait]
    impl BoundarySource for CachedBoundaries {
        async fn current(&self) -> SizeBoundaries {
            self.cache.current(&self.pool).await
        }
    }
}

/// The resolution pipeline behind one `answer` call.
pub struct QueryEngine {
    classifier: IntentClassifier,
    model: Arc<dyn ChatModel>,
    executor: Arc<dyn ExecuteQuery>,
    boundaries: Arc<dyn BoundarySource>,
    insights: bool,
}

impl QueryEngine {
    pub fn new(
        model: Arc<dyn ChatModel>,
        executor: Arc<dyn ExecuteQuery>,
        boundaries: Arc<dyn BoundarySource>,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(Arc::clone(&model)),
            model,
            executor,
            boundaries,
            insights: false,
        }
    }

    /// Enable the optional narrative call over each result set.
    pub fn with_insights(mut self, enabled: bool) -> Self {
        self.insights = enabled;
        self
    }

    /// Answer a question, anchored at the current wall-clock date.
    pub async fn answer(&self, request: &QueryRequest) -> QueryResponse {
        self.answer_at(request, Utc::now().date_naive()).await
    }

    /// Answer a question with an explicit `today`, so relative time phrases
    /// resolve deterministically under test.
    pub async fn answer_at(&self, request: &QueryRequest, today: NaiveDate) -> QueryResponse {
        let request_id = Uuid::new_v4();
        match self.resolve(request, today, request_id).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    // A validated classification naming an unknown function
                    // means the catalog and its schemas disagree.
                    QueryError::UnknownFunction { name } => {
                        error!(%request_id, function = %name,
                            "Catalog invariant violation: unknown function after validation");
                    }
                    other => {
                        warn!(%request_id, code = other.code(), error = %other,
                            "Question failed to resolve");
                    }
                }
                QueryResponse::failure(&err)
            }
        }
    }

    async fn resolve(
        &self,
        request: &QueryRequest,
        today: NaiveDate,
        request_id: Uuid,
    ) -> QueryResult<QueryResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(QueryError::empty_question());
        }
        let previous = request.previous_context.as_ref();
        info!(%request_id, question, follow_up = previous.is_some(), "Resolving question");

        let mut classification: Classification =
            self.classifier.classify(question, previous, today).await?;
        let depth = merge::merge(previous, question, &mut classification)?;
        catalog::validate_arguments(classification.function, &classification.arguments)
            .map_err(|reason| QueryError::classification(question, reason))?;

        let boundaries = self.boundaries.current().await;
        let resolved =
            catalog::resolve(classification.function, &classification.arguments, &boundaries)?;
        debug!(%request_id, sql = %resolved.sql, "Resolved SQL template");

        let rows = self.executor.execute(&resolved).await?;
        info!(%request_id, function = classification.function.name(), rows = rows.len(), depth,
            "Question resolved");

        let summary = assemble::summarize(&rows);
        let chart_config = assemble::build_chart(classification.function, &rows);
        let ai_insights = if self.insights {
            assemble::narrative(
                self.model.as_ref(),
                question,
                classification.function,
                &summary,
                &rows,
            )
            .await
        } else {
            None
        };

        let sql_params = resolved
            .params
            .iter()
            .map(|p| serde_json::to_value(p).unwrap_or(Value::Null))
            .collect();
        let context = ConversationContext {
            question: question.to_string(),
            function_name: classification.function.name().to_string(),
            arguments: classification.arguments.clone(),
            depth,
        };

        Ok(QueryResponse {
            success: true,
            function_name: Some(classification.function.name().to_string()),
            arguments: Some(classification.arguments),
            row_count: Some(rows.len()),
            message: Some(assemble::result_message(rows.len())),
            data: rows.into_iter().map(Value::Object).collect(),
            summary: Some(summary),
            chart_config,
            sql_query: Some(resolved.sql),
            sql_params: Some(sql_params),
            ai_insights,
            context: Some(context),
            error: None,
        })
    }
}
