//! Plans the byte-range edits that swap subqueries for joined CTE columns.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use super::cte_builder::CteDefinition;
use super::errors::CteOptimizerError;
use super::matcher::{Binding, ScanResult, Scope, ScopeId};
use crate::sql_parser::ast::{
    Distinct, Expression, ExpressionKind, JoinConstraint, Query, Select, SelectItem, SetExpr,
    TableFactor, TableWithJoins,
};
use crate::utils::cte_naming::generate_unique_name;
use crate::utils::sql_text::span_within;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl TextEdit {
    pub fn replace(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at..at, text)
    }
}

/// A `LEFT JOIN` added to one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeJoin {
    pub scope: ScopeId,
    pub definition: usize,
    pub alias: String,
}

#[derive(Debug, Default)]
pub struct RewritePlan {
    pub joins: Vec<ScopeJoin>,
    pub edits: Vec<TextEdit>,
}

fn locate(source: &str, fragment: &str) -> Result<Range<usize>, CteOptimizerError> {
    span_within(source, fragment)
        .ok_or_else(|| CteOptimizerError::DetachedFragment(fragment.to_string()))
}

/// Plan joins and replacements for every match.
///
/// `assignment[i]` is the definition serving `scan.matches[i]`.
pub fn plan_rewrites(
    source: &str,
    scan: &ScanResult<'_>,
    assignment: &[usize],
    definitions: &[CteDefinition],
) -> Result<RewritePlan, CteOptimizerError> {
    let mut by_scope: BTreeMap<ScopeId, Vec<usize>> = BTreeMap::new();
    for (index, found) in scan.matches.iter().enumerate() {
        by_scope.entry(found.scope).or_default().push(index);
    }

    let replaced = Replaced {
        source,
        spans: scan.matches.iter().map(|found| found.span.clone()).collect(),
    };
    let mut plan = RewritePlan::default();
    for (scope_id, match_ids) in by_scope {
        let scope = &scan.scopes[scope_id];
        let [from_item] = scope.select.from.as_slice() else {
            return Err(CteOptimizerError::UnsupportedFrom(
                "comma-separated FROM items".to_string(),
            ));
        };
        if has_merged_join(from_item) {
            return Err(CteOptimizerError::UnsupportedFrom(
                "USING or NATURAL join".to_string(),
            ));
        }
        let insert_at = locate(source, from_item.text)?.end;

        let mut taken = visible_names(scan, scope_id);
        let mut aliases: BTreeMap<(usize, String, String), String> = BTreeMap::new();
        let mut joins_sql = String::new();
        let mut outputs = BTreeSet::new();

        for index in match_ids {
            let found = &scan.matches[index];
            let definition_id = assignment[index];
            let definition = &definitions[definition_id];
            let subquery = &found.subquery;
            let key = (
                definition_id,
                subquery.outer_qualifier.normalized(),
                subquery.outer_key.normalized(),
            );

            let alias = match aliases.get(&key) {
                Some(alias) => alias.clone(),
                None => {
                    let alias = generate_unique_name(&definition.alias_base, &taken);
                    taken.insert(alias.to_lowercase());
                    joins_sql.push_str(&format!(
                        "\nleft join {} as {} on {}.{} = {}.{}",
                        definition.name,
                        alias,
                        subquery.outer_qualifier.text,
                        subquery.outer_key.text,
                        alias,
                        definition.join_column
                    ));
                    outputs.extend(definition.outputs.iter().cloned());
                    plan.joins.push(ScopeJoin {
                        scope: scope_id,
                        definition: definition_id,
                        alias: alias.clone(),
                    });
                    aliases.insert(key, alias.clone());
                    alias
                }
            };
            plan.edits
                .push(TextEdit::replace(found.span.clone(), definition.reference(&alias)));
        }

        plan.edits.push(TextEdit::insert(insert_at, joins_sql));
        plan.edits.extend(qualify_scope(source, scope, &outputs, &replaced)?);
    }

    log::debug!(
        "planned {} joins and {} edits",
        plan.joins.len(),
        plan.edits.len()
    );
    Ok(plan)
}

/// Lower-cased bindings of the scope and every scope it can see.
fn visible_names(scan: &ScanResult<'_>, scope_id: ScopeId) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut current = Some(scope_id);
    while let Some(id) = current {
        let scope = &scan.scopes[id];
        names.extend(scope.bindings.iter().map(|b| b.name.to_lowercase()));
        current = scope.parent;
    }
    names
}

fn has_merged_join(item: &TableWithJoins<'_>) -> bool {
    let nested = |factor: &TableFactor<'_>| match factor {
        TableFactor::NestedJoin { inner, .. } => has_merged_join(inner),
        _ => false,
    };
    nested(&item.relation)
        || item.joins.iter().any(|join| {
            matches!(
                join.constraint,
                JoinConstraint::Using(_) | JoinConstraint::Natural
            ) || nested(&join.relation)
        })
}

/// Keep name resolution in `scope` unchanged after the CTE joins are added.
///
/// Bare references to a name the CTEs also expose get the scope's only
/// relation as qualifier and `*` is narrowed to the pre-existing relations.
fn qualify_scope(
    source: &str,
    scope: &Scope<'_>,
    outputs: &BTreeSet<String>,
    replaced: &Replaced<'_>,
) -> Result<Vec<TextEdit>, CteOptimizerError> {
    let select = scope.select;
    let mut edits = Vec::new();

    for item in &select.projection {
        if let SelectItem::Wildcard { text } = item {
            if scope.bindings.is_empty() || !scope.all_relations_bound() {
                return Err(CteOptimizerError::AmbiguousScope(
                    "'*' over an unnamed relation".to_string(),
                ));
            }
            let expanded = scope
                .bindings
                .iter()
                .map(|binding| format!("{}.*", binding.ident.text))
                .collect::<Vec<_>>()
                .join(", ");
            edits.push(TextEdit::replace(locate(source, text)?, expanded));
        }
    }

    let mut bare = Vec::new();
    let no_skip = BTreeSet::new();
    let mut scope_exprs: Vec<&Expression<'_>> = Vec::new();
    if let Some(Distinct::On(exprs)) = &select.distinct {
        scope_exprs.extend(exprs);
    }
    for item in &select.projection {
        if let SelectItem::Expr { expr, .. } = item {
            scope_exprs.push(expr);
        }
    }
    scope_exprs.extend(select.where_clause.iter());
    scope_exprs.extend(select.group_by.iter());
    scope_exprs.extend(select.having.iter());
    for expr in scope_exprs {
        collect_bare_columns(expr, outputs, &no_skip, replaced, &mut bare)?;
    }

    let output_aliases: BTreeSet<String> = select
        .projection
        .iter()
        .filter_map(|item| match item {
            SelectItem::Expr {
                alias: Some(alias), ..
            } => Some(alias.normalized()),
            _ => None,
        })
        .collect();
    for item in scope.order_by {
        collect_bare_columns(&item.expr, outputs, &output_aliases, replaced, &mut bare)?;
    }

    if bare.is_empty() {
        return Ok(edits);
    }
    let only_binding: &Binding<'_> = match scope.bindings.as_slice() {
        [binding] if scope.all_relations_bound() => binding,
        _ => {
            return Err(CteOptimizerError::AmbiguousScope(format!(
                "bare column {} with several relations in scope",
                bare[0].text
            )))
        }
    };
    for column in bare {
        edits.push(TextEdit::replace(
            locate(source, column.text)?,
            format!("{}.{}", only_binding.ident.text, column.text),
        ));
    }
    Ok(edits)
}

fn collect_bare_columns<'e, 'a>(
    expr: &'e Expression<'a>,
    outputs: &BTreeSet<String>,
    skip: &BTreeSet<String>,
    replaced: &Replaced<'_>,
    out: &mut Vec<&'e Expression<'a>>,
) -> Result<(), CteOptimizerError> {
    match &expr.kind {
        ExpressionKind::Column(column) if column.is_bare() => {
            let name = column.name().normalized();
            if outputs.contains(&name) && !skip.contains(&name) {
                out.push(expr);
            }
        }
        ExpressionKind::Raw(text) => {
            if mentions_output(text, outputs) {
                return Err(CteOptimizerError::AmbiguousScope(format!(
                    "opaque fragment mentions a generated column: {}",
                    text
                )));
            }
        }
        _ => {
            if let Some(query) = expr.nested_query() {
                if !replaced.contains(expr) {
                    check_nested_query(query, outputs, replaced)?;
                }
            }
            for child in expr.children() {
                collect_bare_columns(child, outputs, skip, replaced, out)?;
            }
        }
    }
    Ok(())
}

fn mentions_output(text: &str, outputs: &BTreeSet<String>) -> bool {
    let lowered = text.to_lowercase();
    outputs
        .iter()
        .any(|output| lowered.contains(&output.to_lowercase()))
}

/// Subqueries that the plan swaps for joined columns.
struct Replaced<'s> {
    source: &'s str,
    spans: Vec<Range<usize>>,
}

impl Replaced<'_> {
    fn contains(&self, expr: &Expression<'_>) -> bool {
        span_within(self.source, expr.text).is_some_and(|span| self.spans.contains(&span))
    }
}

/// A bare name inside a nested query may bind to that query's own relations
/// or to the enclosing scope. Without column metadata neither can be ruled
/// out, so any bare use of a generated column name leaves the scope alone.
fn check_nested_query(
    query: &Query<'_>,
    outputs: &BTreeSet<String>,
    replaced: &Replaced<'_>,
) -> Result<(), CteOptimizerError> {
    let mut references = NestedReferences {
        replaced,
        bare: BTreeSet::new(),
        raw: Vec::new(),
    };
    references.visit_query(query);

    if let Some(name) = references.bare.iter().find(|name| outputs.contains(*name)) {
        return Err(CteOptimizerError::AmbiguousScope(format!(
            "bare column {} inside a nested query",
            name
        )));
    }
    if let Some(text) = references
        .raw
        .iter()
        .find(|text| mentions_output(text, outputs))
    {
        return Err(CteOptimizerError::AmbiguousScope(format!(
            "opaque fragment in a nested query mentions a generated column: {}",
            text
        )));
    }
    Ok(())
}

struct NestedReferences<'r, 's> {
    replaced: &'r Replaced<'s>,
    bare: BTreeSet<String>,
    raw: Vec<String>,
}

impl NestedReferences<'_, '_> {
    fn visit_query(&mut self, query: &Query<'_>) {
        if let Some(with_clause) = &query.with_clause {
            for cte in &with_clause.ctes {
                self.visit_query(&cte.query);
            }
        }
        self.visit_set_expr(&query.body);
        for item in &query.order_by {
            self.visit_expr(&item.expr);
        }
    }

    fn visit_set_expr(&mut self, body: &SetExpr<'_>) {
        match body {
            SetExpr::Select(select) => self.visit_select(select),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            SetExpr::Query(query) => self.visit_query(query),
        }
    }

    fn visit_select(&mut self, select: &Select<'_>) {
        for item in &select.from {
            self.visit_table_with_joins(item);
        }
        if let Some(Distinct::On(exprs)) = &select.distinct {
            for expr in exprs {
                self.visit_expr(expr);
            }
        }
        for item in &select.projection {
            if let SelectItem::Expr { expr, .. } = item {
                self.visit_expr(expr);
            }
        }
        for expr in select
            .where_clause
            .iter()
            .chain(select.group_by.iter())
            .chain(select.having.iter())
        {
            self.visit_expr(expr);
        }
    }

    fn visit_table_with_joins(&mut self, item: &TableWithJoins<'_>) {
        self.visit_table_factor(&item.relation);
        for join in &item.joins {
            self.visit_table_factor(&join.relation);
            if let JoinConstraint::On(expr) = &join.constraint {
                self.visit_expr(expr);
            }
        }
    }

    fn visit_table_factor(&mut self, factor: &TableFactor<'_>) {
        match factor {
            TableFactor::Table { .. } => {}
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery),
            TableFactor::Function { call, .. } => self.visit_expr(call),
            TableFactor::NestedJoin { inner, .. } => self.visit_table_with_joins(inner),
        }
    }

    fn visit_expr(&mut self, expr: &Expression<'_>) {
        if self.replaced.contains(expr) {
            return;
        }
        match &expr.kind {
            ExpressionKind::Column(column) if column.is_bare() => {
                self.bare.insert(column.name().normalized());
            }
            ExpressionKind::Raw(text) => self.raw.push(text.to_string()),
            _ => {}
        }
        if let Some(query) = expr.nested_query() {
            self.visit_query(query);
        }
        for child in expr.children() {
            self.visit_expr(child);
        }
    }
}
