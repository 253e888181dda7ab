//! Query execution against the pipeline database.
//!
//! The engine only sees the [`ExecuteQuery`] trait, so tests and offline
//! builds swap in an in-memory executor. The Postgres implementation binds
//! the resolved parameters positionally, decodes rows into JSON maps by
//! column type, and retries transient connection failures with a short
//! jittered backoff. Non-transient database errors never retry.

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::ResolvedQuery;
use crate::error::QueryResult;

/// One result row, column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

#[async_trait]
pub trait ExecuteQuery: Send + Sync {
    async fn execute(&self, query: &ResolvedQuery) -> QueryResult<Vec<Row>>;
}

#[cfg(feature = "database")]
pub use pg::{connect_pool, PgQueryExecutor};

#[cfg(feature = "database")]
mod pg {
    use std::time::Duration;

    use anyhow::Context;
    use async_trait::async_trait;
    use bigdecimal::ToPrimitive;
    use rand::Rng;
    use serde_json::{json, Value};
    use sqlx::postgres::{PgPoolOptions, PgRow};
    use sqlx::PgPool;
    use tracing::{debug, warn};

    use super::{ExecuteQuery, Row};
    use crate::catalog::{ResolvedQuery, SqlParam};
    use crate::config::{mask_database_url, AppConfig};
    use crate::error::{QueryError, QueryResult};

    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_STEP: Duration = Duration::from_millis(200);

    /// Connect a pool sized and timed per the configuration. Every
    /// connection gets a server-side statement timeout so no query can
    /// hold a worker past the configured budget.
    pub async fn connect_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
        let statement = format!(
            "SET statement_timeout = {}",
            config.statement_timeout.as_millis()
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .after_connect(move |conn, _meta| {
                let statement = statement.clone();
                Box::pin(async move {
                    use sqlx::Executor;
                    conn.execute(statement.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to {}",
                    mask_database_url(&config.database_url)
                )
            })?;
        Ok(pool)
    }

    pub struct PgQueryExecutor {
        pool: PgPool,
    }

    impl PgQueryExecutor {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub fn pool(&self) -> &PgPool {
            &self.pool
        }

        async fn fetch(&self, query: &ResolvedQuery) -> Result<Vec<Row>, sqlx::Error> {
            let mut prepared = sqlx::query(&query.sql);
            for param in &query.params {
                prepared = bind_param(prepared, param);
            }
            let rows = prepared.fetch_all(&self.pool).await?;
            Ok(rows.iter().map(row_to_map).collect())
        }
    }

    #[async_trait]
    impl ExecuteQuery for PgQueryExecutor {
        async fn execute(&self, query: &ResolvedQuery) -> QueryResult<Vec<Row>> {
            let mut attempt = 1;
            loop {
                match self.fetch(query).await {
                    Ok(rows) => {
                        debug!(rows = rows.len(), attempt, "Query executed");
                        return Ok(rows);
                    }
                    Err(e) if is_transient(&e) => {
                        if attempt >= MAX_ATTEMPTS {
                            return Err(QueryError::TransientConnection {
                                attempts: attempt,
                                message: e.to_string(),
                            });
                        }
                        let backoff = BACKOFF_STEP * attempt + jitter();
                        warn!(attempt, error = %e, "Transient database error, retrying in {:?}", backoff);
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        return Err(QueryError::Execution {
                            message: e.to_string(),
                        })
                    }
                }
            }
        }
    }

    fn jitter() -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(0..100))
    }

    /// Connection-level failures worth a retry. Query-level failures
    /// (syntax, type, constraint) are not.
    fn is_transient(error: &sqlx::Error) -> bool {
        match error {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
            other => {
                let message = other.to_string().to_lowercase();
                message.contains("connection reset")
                    || message.contains("connection refused")
                    || message.contains("connection terminated")
                    || message.contains("timed out")
            }
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        param: &SqlParam,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match param {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::Int(n) => query.bind(*n),
            SqlParam::Float(f) => query.bind(*f),
            SqlParam::Date(d) => query.bind(*d),
            SqlParam::TextArray(items) => query.bind(items.clone()),
            SqlParam::IntArray(items) => query.bind(items.clone()),
        }
    }

    /// Decode a row into a JSON map by column type. Unreadable or unknown
    /// columns decode as null rather than failing the whole result set.
    fn row_to_map(row: &PgRow) -> Row {
        use sqlx::{Column, Row as _, TypeInfo};

        let mut map = serde_json::Map::new();
        for column in row.columns() {
            let name = column.name();
            let type_name = column.type_info().name();

            let value: Option<Value> = match type_name {
                "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
                    .try_get::<Option<String>, _>(name)
                    .ok()
                    .flatten()
                    .map(|s| json!(s)),
                "INT2" => row
                    .try_get::<Option<i16>, _>(name)
                    .ok()
                    .flatten()
                    .map(|i| json!(i)),
                "INT4" => row
                    .try_get::<Option<i32>, _>(name)
                    .ok()
                    .flatten()
                    .map(|i| json!(i)),
                "INT8" => row
                    .try_get::<Option<i64>, _>(name)
                    .ok()
                    .flatten()
                    .map(|i| json!(i)),
                "FLOAT4" | "FLOAT8" => row
                    .try_get::<Option<f64>, _>(name)
                    .ok()
                    .flatten()
                    .map(|f| json!(f)),
                "NUMERIC" => row
                    .try_get::<Option<bigdecimal::BigDecimal>, _>(name)
                    .ok()
                    .flatten()
                    .and_then(|d| d.to_f64())
                    .map(|f| json!(f)),
                "BOOL" => row
                    .try_get::<Option<bool>, _>(name)
                    .ok()
                    .flatten()
                    .map(|b| json!(b)),
                "UUID" => row
                    .try_get::<Option<uuid::Uuid>, _>(name)
                    .ok()
                    .flatten()
                    .map(|u| json!(u.to_string())),
                "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(name).ok().flatten(),
                "DATE" => row
                    .try_get::<Option<chrono::NaiveDate>, _>(name)
                    .ok()
                    .flatten()
                    .map(|d| json!(d.to_string())),
                "TIMESTAMP" => row
                    .try_get::<Option<chrono::NaiveDateTime>, _>(name)
                    .ok()
                    .flatten()
                    .map(|dt| json!(dt.to_string())),
                "TIMESTAMPTZ" => row
                    .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                    .ok()
                    .flatten()
                    .map(|dt| json!(dt.to_rfc3339())),
                _ => None,
            };

            map.insert(name.to_string(), value.unwrap_or(Value::Null));
        }
        map
    }

}
