//! Natural-language querying over a sales pipeline table.
//!
//! A plain-English question (plus up to three chained follow-up
//! refinements) resolves onto one entry of a closed catalog of
//! parameterized SQL templates. The language model only selects a catalog
//! function and extracts raw arguments; everything that must be exact —
//! date windows, fee amounts, status vocabulary, size-tier boundaries —
//! comes from deterministic code. Resolution flows strictly sequentially:
//!
//! ```text
//! question -> classifier -> merge -> template resolver -> executor -> assembler
//! ```
//!
//! The caller threads the previous turn back in as a
//! [`ConversationContext`]; no session state lives server-side. The
//! `database` feature enables the Postgres executor and the percentile
//! refresh, `server` adds the axum API on top.

pub mod assemble;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod merge;
pub mod model;
pub mod percentile;
pub mod temporal;

#[cfg(feature = "server")]
pub mod api;

pub use catalog::QueryFunction;
pub use engine::QueryEngine;
pub use error::{QueryError, QueryResult};
pub use model::{ConversationContext, FilterSet, QueryRequest, QueryResponse};
