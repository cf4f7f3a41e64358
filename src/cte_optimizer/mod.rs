//! Hoists correlated scalar subqueries into CTEs joined back with `LEFT JOIN`.
//!
//! The pipeline runs once per statement and keeps no state between calls:
//!
//! 1. **Scan**: parse the statement and collect rewritable subqueries per scope
//! 2. **Deduplicate**: collapse identical lookups into one requirement
//! 3. **Build**: generate one named CTE per requirement
//! 4. **Rewrite**: replace each subquery with a column of a joined CTE
//! 5. **Emit**: put the CTEs in front and apply all edits to the original text
//!
//! Anything that cannot be proven safe leaves the statement untouched.
//!
//! ```
//! use analytics_cte_rewriter::cte_optimizer::{CteOptimizer, DialectFlags};
//!
//! let sql = "select ax.enrollment from analytics_enrollment_x as ax";
//! let optimized = CteOptimizer::default().optimize(sql, DialectFlags::default());
//! assert_eq!(optimized, sql);
//! ```

use std::borrow::Cow;

use crate::config::OptimizerConfig;
use crate::sql_parser::parse_statement;

mod classifier;
mod cte_builder;
mod emitter;
pub mod errors;
mod matcher;
mod registry;
mod rewriter;

pub use classifier::PatternKind;
pub use errors::{CteOptimizerError, UnknownPatternKind};

/// Capabilities of the target database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialectFlags {
    /// Geometry lookups are only rewritten when the database has spatial support.
    pub spatial_support: bool,
}

impl DialectFlags {
    pub fn with_spatial_support(spatial_support: bool) -> Self {
        Self { spatial_support }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CteOptimizer {
    config: OptimizerConfig,
}

impl CteOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Rewrite `sql`, returning it unchanged when nothing applies or anything fails.
    pub fn optimize<'s>(&self, sql: &'s str, dialect: DialectFlags) -> Cow<'s, str> {
        match self.try_optimize(sql, dialect) {
            Ok(Some(rewritten)) => Cow::Owned(rewritten),
            Ok(None) => Cow::Borrowed(sql),
            Err(e) => {
                log::debug!("CTE optimization skipped: {}", e);
                Cow::Borrowed(sql)
            }
        }
    }

    /// Same pipeline as [`CteOptimizer::optimize`] with failures surfaced.
    ///
    /// `Ok(None)` means there was nothing to rewrite.
    pub fn try_optimize(
        &self,
        sql: &str,
        dialect: DialectFlags,
    ) -> Result<Option<String>, CteOptimizerError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let statement =
            parse_statement(sql).map_err(|e| CteOptimizerError::Parse(e.to_string()))?;
        let scan = matcher::scan(sql, &statement, &self.config, dialect);
        if scan.matches.is_empty() {
            return Ok(None);
        }

        let (registry, assignment) = registry::deduplicate(&scan.matches);
        let definitions = cte_builder::build_definitions(&registry, &scan.reserved_names);
        let plan = rewriter::plan_rewrites(sql, &scan, &assignment, &definitions)?;

        let mut edits = plan.edits;
        edits.push(emitter::with_clause_edit(
            sql,
            &statement.query,
            &definitions,
        )?);
        let rewritten = emitter::apply_edits(sql, edits)?;

        if self.config.verify_output {
            parse_statement(&rewritten)
                .map_err(|e| CteOptimizerError::Verification(e.to_string()))?;
        }
        log::debug!(
            "hoisted {} subqueries into {} CTEs with {} joins",
            scan.matches.len(),
            definitions.len(),
            plan.joins.len()
        );
        Ok(Some(rewritten))
    }
}

/// Rewrite with the default configuration and no spatial support.
pub fn optimize(sql: &str) -> Cow<'_, str> {
    CteOptimizer::default().optimize(sql, DialectFlags::default())
}
