//! HTTP serving layer, enabled by the `server` feature.

pub mod routes;

pub use routes::{router, AppState};
