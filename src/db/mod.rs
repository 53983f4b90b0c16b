//! Database module: entity views and SQL repositories.
//!
//! - `model`: views assembled from query results (batches joined with links).
//! - `repo`: SQL-only functions that map rows into `crate::model` entities.
//!
//! Callers import from `url_checker::db`; the repository API is re-exported.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::BatchWithLinks;
