//! Scope-aware scan for rewritable scalar subqueries.
//!
//! Every `SELECT` in the statement becomes a [`Scope`] in an arena, linked to
//! the scope its correlated references may see. A subquery is only matched
//! where replacing it with a joined column keeps the statement's meaning.

use std::collections::BTreeSet;
use std::ops::Range;

use super::classifier::{classify, ClassifiedSubquery, ClassifierContext};
use super::DialectFlags;
use crate::config::OptimizerConfig;
use crate::sql_parser::ast::{
    Distinct, Expression, ExpressionKind, FunctionCall, Identifier, JoinConstraint, LimitValue,
    OrderByItem, Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use crate::utils::sql_text::span_within;

pub type ScopeId = usize;

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "array_agg",
    "avg",
    "bit_and",
    "bit_or",
    "bool_and",
    "bool_or",
    "corr",
    "count",
    "covar_pop",
    "covar_samp",
    "every",
    "json_agg",
    "json_object_agg",
    "jsonb_agg",
    "jsonb_object_agg",
    "max",
    "min",
    "mode",
    "percentile_cont",
    "percentile_disc",
    "stddev",
    "stddev_pop",
    "stddev_samp",
    "string_agg",
    "sum",
    "var_pop",
    "var_samp",
    "variance",
];

/// Relation name visible inside a scope.
#[derive(Debug, Clone)]
pub struct Binding<'a> {
    pub name: String,
    pub ident: Identifier<'a>,
}

#[derive(Debug)]
pub struct Scope<'a> {
    pub parent: Option<ScopeId>,
    pub select: &'a Select<'a>,
    /// `ORDER BY` of the query whose body is this select.
    pub order_by: &'a [OrderByItem<'a>],
    pub bindings: Vec<Binding<'a>>,
}

impl Scope<'_> {
    /// True when every relation in `FROM` can be referenced by name.
    pub fn all_relations_bound(&self) -> bool {
        self.select.from.iter().all(relations_bound)
    }
}

#[derive(Debug, Clone)]
pub struct SubqueryMatch<'a> {
    /// Byte range of the subquery, parentheses included.
    pub span: Range<usize>,
    pub scope: ScopeId,
    pub subquery: ClassifiedSubquery<'a>,
}

#[derive(Debug, Default)]
pub struct ScanResult<'a> {
    pub scopes: Vec<Scope<'a>>,
    /// Matches in source order.
    pub matches: Vec<SubqueryMatch<'a>>,
    /// Lower-cased CTE and table names referenced anywhere in the statement.
    pub reserved_names: BTreeSet<String>,
}

/// Where an expression sits, which decides whether a subquery may be hoisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Where,
    /// Projection, `HAVING` and `ORDER BY`: evaluated after grouping.
    PostAggregation,
    Unmatchable,
}

#[derive(Debug, Clone, Copy)]
struct ExprContext {
    /// Scope that nested queries are correlated against.
    scope: Option<ScopeId>,
    clause: Clause,
    grouped: bool,
    in_aggregate: bool,
}

impl ExprContext {
    fn unmatchable(scope: Option<ScopeId>) -> Self {
        Self {
            scope,
            clause: Clause::Unmatchable,
            grouped: false,
            in_aggregate: false,
        }
    }

    fn allows_match(&self) -> bool {
        match self.clause {
            Clause::Where => true,
            Clause::PostAggregation => !self.grouped || self.in_aggregate,
            Clause::Unmatchable => false,
        }
    }
}

/// Collect scopes and classified matches for `statement`.
pub fn scan<'a>(
    source: &'a str,
    statement: &'a Statement<'a>,
    config: &OptimizerConfig,
    dialect: DialectFlags,
) -> ScanResult<'a> {
    let mut names = NameCollector::default();
    names.visit_query(&statement.query);

    let mut scanner = Scanner {
        config,
        dialect,
        source,
        cte_names: names.ctes,
        scopes: Vec::new(),
        matches: Vec::new(),
    };
    scanner.visit_query(&statement.query, None);

    let mut matches = scanner.matches;
    matches.sort_by_key(|m| m.span.start);
    log::debug!(
        "scanned {} scopes, {} rewritable subqueries",
        scanner.scopes.len(),
        matches.len()
    );

    let mut reserved_names = names.tables;
    reserved_names.extend(scanner.cte_names.iter().map(|name| name.to_lowercase()));
    ScanResult {
        scopes: scanner.scopes,
        matches,
        reserved_names,
    }
}

struct Scanner<'a, 'c> {
    config: &'c OptimizerConfig,
    dialect: DialectFlags,
    source: &'a str,
    cte_names: BTreeSet<String>,
    scopes: Vec<Scope<'a>>,
    matches: Vec<SubqueryMatch<'a>>,
}

impl<'a> Scanner<'a, '_> {
    fn visit_query(&mut self, query: &'a Query<'a>, parent: Option<ScopeId>) {
        if let Some(with_clause) = &query.with_clause {
            for cte in &with_clause.ctes {
                self.visit_query(&cte.query, parent);
            }
        }
        match &query.body {
            SetExpr::Select(select) => self.visit_select(select, parent, &query.order_by),
            body => {
                self.visit_set_expr(body, parent);
                for item in &query.order_by {
                    self.visit_expr(&item.expr, ExprContext::unmatchable(parent));
                }
            }
        }
        if let Some(LimitValue::Count(limit)) = &query.limit {
            self.visit_expr(limit, ExprContext::unmatchable(parent));
        }
        if let Some(offset) = &query.offset {
            self.visit_expr(offset, ExprContext::unmatchable(parent));
        }
    }

    fn visit_set_expr(&mut self, body: &'a SetExpr<'a>, parent: Option<ScopeId>) {
        match body {
            SetExpr::Select(select) => self.visit_select(select, parent, &[]),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left, parent);
                self.visit_set_expr(right, parent);
            }
            SetExpr::Query(query) => self.visit_query(query, parent),
        }
    }

    fn visit_select(
        &mut self,
        select: &'a Select<'a>,
        parent: Option<ScopeId>,
        order_by: &'a [OrderByItem<'a>],
    ) {
        let id = self.scopes.len();
        let mut bindings = Vec::new();
        for item in &select.from {
            collect_bindings(item, &mut bindings);
        }
        self.scopes.push(Scope {
            parent,
            select,
            order_by,
            bindings,
        });

        let grouped = is_grouped(select);
        let context = |clause| ExprContext {
            scope: Some(id),
            clause,
            grouped,
            in_aggregate: false,
        };

        for item in &select.from {
            self.visit_table_with_joins(item, id, parent);
        }
        if let Some(Distinct::On(exprs)) = &select.distinct {
            for expr in exprs {
                self.visit_expr(expr, context(Clause::Unmatchable));
            }
        }
        for item in &select.projection {
            if let SelectItem::Expr { expr, .. } = item {
                self.visit_expr(expr, context(Clause::PostAggregation));
            }
        }
        if let Some(where_clause) = &select.where_clause {
            self.visit_expr(where_clause, context(Clause::Where));
        }
        for expr in &select.group_by {
            self.visit_expr(expr, context(Clause::Unmatchable));
        }
        if let Some(having) = &select.having {
            self.visit_expr(having, context(Clause::PostAggregation));
        }
        for item in order_by {
            self.visit_expr(&item.expr, context(Clause::PostAggregation));
        }
    }

    fn visit_table_with_joins(
        &mut self,
        item: &'a TableWithJoins<'a>,
        scope: ScopeId,
        parent: Option<ScopeId>,
    ) {
        self.visit_table_factor(&item.relation, scope, parent);
        for join in &item.joins {
            self.visit_table_factor(&join.relation, scope, parent);
            if let JoinConstraint::On(expr) = &join.constraint {
                self.visit_expr(expr, ExprContext::unmatchable(Some(scope)));
            }
        }
    }

    fn visit_table_factor(
        &mut self,
        factor: &'a TableFactor<'a>,
        scope: ScopeId,
        parent: Option<ScopeId>,
    ) {
        match factor {
            TableFactor::Table { .. } => {}
            TableFactor::Derived {
                lateral, subquery, ..
            } => {
                let correlated_with = if *lateral { Some(scope) } else { parent };
                self.visit_query(subquery, correlated_with);
            }
            TableFactor::Function { call, .. } => {
                self.visit_expr(call, ExprContext::unmatchable(Some(scope)));
            }
            TableFactor::NestedJoin { inner, .. } => {
                self.visit_table_with_joins(inner, scope, parent);
            }
        }
    }

    fn visit_expr(&mut self, expr: &'a Expression<'a>, ctx: ExprContext) {
        match &expr.kind {
            ExpressionKind::Subquery(query) => {
                if let (true, Some(scope)) = (ctx.allows_match(), ctx.scope) {
                    if let Some(found) = self.try_match(expr, query, scope) {
                        self.matches.push(found);
                        return;
                    }
                }
                self.visit_query(query, ctx.scope);
                return;
            }
            ExpressionKind::Function(call) if is_quantified(call) => {
                for arg in &call.args {
                    match &arg.kind {
                        ExpressionKind::Subquery(query) => self.visit_query(query, ctx.scope),
                        _ => self.visit_expr(arg, ExprContext::unmatchable(ctx.scope)),
                    }
                }
                return;
            }
            _ => {}
        }

        if let Some(query) = expr.nested_query() {
            self.visit_query(query, ctx.scope);
        }
        let child_ctx = match &expr.kind {
            ExpressionKind::Function(call) if is_aggregate(call) => ExprContext {
                in_aggregate: true,
                ..ctx
            },
            _ => ctx,
        };
        for child in expr.children() {
            self.visit_expr(child, child_ctx);
        }
    }

    fn try_match(
        &self,
        expr: &'a Expression<'a>,
        query: &'a Query<'a>,
        scope: ScopeId,
    ) -> Option<SubqueryMatch<'a>> {
        let bindings: Vec<String> = self.scopes[scope]
            .bindings
            .iter()
            .map(|binding| binding.name.clone())
            .collect();
        let ctx = ClassifierContext {
            config: self.config,
            dialect: self.dialect,
            scope_bindings: &bindings,
            cte_names: &self.cte_names,
        };
        let subquery = classify(query, &ctx)?;
        let span = span_within(self.source, expr.text)?;
        log::trace!("matched {} subquery at {:?}", subquery.kind, span);
        Some(SubqueryMatch {
            span,
            scope,
            subquery,
        })
    }
}

fn is_aggregate(call: &FunctionCall<'_>) -> bool {
    match call.name.parts.as_slice() {
        [name] if call.over.is_none() => {
            AGGREGATE_FUNCTIONS.contains(&name.normalized().as_str())
        }
        _ => false,
    }
}

/// `any(...)`, `all(...)`, `some(...)` on the right of a comparison.
fn is_quantified(call: &FunctionCall<'_>) -> bool {
    match call.name.parts.as_slice() {
        [name] => matches!(name.normalized().as_str(), "any" | "all" | "some"),
        _ => false,
    }
}

fn contains_aggregate(expr: &Expression<'_>) -> bool {
    match &expr.kind {
        ExpressionKind::Function(call) if is_aggregate(call) => true,
        _ => expr.children().into_iter().any(contains_aggregate),
    }
}

fn is_grouped(select: &Select<'_>) -> bool {
    !select.group_by.is_empty()
        || select.having.is_some()
        || select.projection.iter().any(|item| match item {
            SelectItem::Expr { expr, .. } => contains_aggregate(expr),
            _ => false,
        })
}

fn collect_bindings<'a>(item: &TableWithJoins<'a>, out: &mut Vec<Binding<'a>>) {
    collect_factor_bindings(&item.relation, out);
    for join in &item.joins {
        collect_factor_bindings(&join.relation, out);
    }
}

fn collect_factor_bindings<'a>(factor: &TableFactor<'a>, out: &mut Vec<Binding<'a>>) {
    match factor {
        TableFactor::NestedJoin {
            inner, alias: None, ..
        } => collect_bindings(inner, out),
        _ => {
            if let Some(ident) = factor.binding() {
                out.push(Binding {
                    name: ident.normalized(),
                    ident,
                });
            }
        }
    }
}

fn relations_bound(item: &TableWithJoins<'_>) -> bool {
    std::iter::once(&item.relation)
        .chain(item.joins.iter().map(|join| &join.relation))
        .all(|factor| match factor {
            TableFactor::NestedJoin {
                inner, alias: None, ..
            } => relations_bound(inner),
            _ => factor.binding().is_some(),
        })
}

/// Every CTE name and table name in the statement, nested queries included.
#[derive(Default)]
struct NameCollector {
    ctes: BTreeSet<String>,
    tables: BTreeSet<String>,
}

impl NameCollector {
    fn visit_query(&mut self, query: &Query<'_>) {
        if let Some(with_clause) = &query.with_clause {
            for cte in &with_clause.ctes {
                self.ctes.insert(cte.name.normalized());
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
            TableFactor::Table { name, .. } => {
                self.tables.insert(name.normalized().to_lowercase());
                if let Some(last) = name.parts.last() {
                    self.tables.insert(last.normalized().to_lowercase());
                }
            }
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery),
            TableFactor::Function { call, .. } => self.visit_expr(call),
            TableFactor::NestedJoin { inner, .. } => self.visit_table_with_joins(inner),
        }
    }

    fn visit_expr(&mut self, expr: &Expression<'_>) {
        if let Some(query) = expr.nested_query() {
            self.visit_query(query);
        }
        for child in expr.children() {
            self.visit_expr(child);
        }
    }
}
