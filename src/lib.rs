//! Analytics CTE rewriter - hoists correlated scalar subqueries out of generated analytics SQL
//!
//! This crate rewrites Postgres statements produced by the analytics SQL generator:
//! - Correlated "last value" lookups become `row_number()` window CTEs
//! - Correlated counts and relationship sums become aggregate CTEs
//! - Each CTE is joined once per scope with `LEFT JOIN` and referenced by alias
//!
//! Statements that cannot be rewritten safely are returned unchanged.

pub mod utils;

pub mod config;
pub mod cte_optimizer;
pub mod sql_parser;

pub use cte_optimizer::{optimize, CteOptimizer, DialectFlags};
