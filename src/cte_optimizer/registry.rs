//! Deduplication of matched subqueries into CTE requirements.

use std::collections::BTreeMap;

use super::classifier::{ClassifiedSubquery, PatternKind, ValueExpr};
use super::matcher::SubqueryMatch;
use crate::utils::sql_text::normalize_fragment;

/// Identity of a lookup; where it appears in the statement plays no part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequirementKey {
    pub kind: PatternKind,
    pub table: String,
    pub value: String,
    pub correlation: String,
    /// Normalized and sorted, so predicate order does not matter.
    pub filters: Vec<String>,
    pub ordering: Option<String>,
}

impl RequirementKey {
    pub fn of(subquery: &ClassifiedSubquery<'_>) -> Self {
        let value = match &subquery.value {
            ValueExpr::Column(column) => column.normalized(),
            ValueExpr::Count(Some(column)) => format!("count({})", column.normalized()),
            ValueExpr::Count(None) => "count(*)".to_string(),
            ValueExpr::Sum(column) => format!("sum({})", column.normalized()),
        };
        let mut filters: Vec<String> = subquery
            .filters
            .iter()
            .map(|filter| normalize_fragment(filter))
            .collect();
        filters.sort();
        Self {
            kind: subquery.kind,
            table: subquery.table.normalized(),
            value,
            correlation: subquery.inner_key.normalized(),
            filters,
            ordering: subquery.ordering.as_deref().map(normalize_fragment),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CteRequirement<'a> {
    pub key: RequirementKey,
    /// First occurrence; its verbatim parts are used to build the CTE.
    pub template: ClassifiedSubquery<'a>,
    pub occurrences: usize,
}

/// Requirements in first-encountered order.
#[derive(Debug, Default)]
pub struct CteRegistry<'a> {
    requirements: Vec<CteRequirement<'a>>,
    index: BTreeMap<RequirementKey, usize>,
}

impl<'a> CteRegistry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subquery and return the index of its requirement.
    pub fn register(&mut self, subquery: &ClassifiedSubquery<'a>) -> usize {
        let key = RequirementKey::of(subquery);
        if let Some(&existing) = self.index.get(&key) {
            self.requirements[existing].occurrences += 1;
            return existing;
        }
        let id = self.requirements.len();
        self.index.insert(key.clone(), id);
        self.requirements.push(CteRequirement {
            key,
            template: subquery.clone(),
            occurrences: 1,
        });
        id
    }

    pub fn requirements(&self) -> &[CteRequirement<'a>] {
        &self.requirements
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

/// Build the registry and, for each match, the index of its requirement.
pub fn deduplicate<'a>(matches: &[SubqueryMatch<'a>]) -> (CteRegistry<'a>, Vec<usize>) {
    let mut registry = CteRegistry::new();
    let assignment: Vec<usize> = matches
        .iter()
        .map(|found| registry.register(&found.subquery))
        .collect();
    log::debug!(
        "{} matches collapse into {} CTE requirements",
        matches.len(),
        registry.len()
    );
    (registry, assignment)
}
