//! Axum routes for the query API.
//!
//! Resolution failures are still HTTP 200: the envelope's `success` flag
//! and error code carry the outcome, so the presentation layer reads one
//! shape for every response.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::CATALOG;
use crate::engine::QueryEngine;
use crate::model::{QueryRequest, QueryResponse};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
}

pub fn router(engine: Arc<QueryEngine>) -> Router {
    Router::new()
        .route("/api/query", post(query))
        .route("/api/health", get(health))
        .route("/api/catalog", get(catalog))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState { engine })
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Json<QueryResponse> {
    Json(state.engine.answer(&request).await)
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

/// Introspection aid: the function names and descriptions a question can
/// resolve to.
async fn catalog() -> Json<Value> {
    let functions: Vec<Value> = CATALOG
        .iter()
        .map(|spec| {
            json!({
                "name": spec.function.name(),
                "description": spec.description,
            })
        })
        .collect();
    Json(json!({ "success": true, "data": functions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_package_version() {
        let Json(body) = health().await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["status"], json!("ok"));
        assert_eq!(body["data"]["version"], json!(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn catalog_lists_every_function() {
        let Json(body) = catalog().await;
        let functions = body["data"].as_array().unwrap();
        assert_eq!(functions.len(), CATALOG.len());
        assert!(functions
            .iter()
            .any(|f| f["name"] == json!("get_largest_projects")));
    }
}
