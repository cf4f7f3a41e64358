//! Recognizes the correlated subquery shapes that can be served by a CTE.
//!
//! A candidate is a single-table `SELECT` with exactly one correlation
//! predicate against the immediately enclosing scope. Every other predicate
//! must be local to the inner table. Anything else is left alone.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::UnknownPatternKind;
use super::DialectFlags;
use crate::config::OptimizerConfig;
use crate::sql_parser::ast::{
    BinaryOperator, ColumnRef, Expression, ExpressionKind, FunctionCall, Identifier, IsTarget,
    LimitValue, Literal, ObjectName, OrderDirection, Query, SelectItem, TableFactor,
    TableWithJoins,
};
use crate::utils::sql_text::span_within;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    LastValueByColumn,
    LastCreated,
    LastScheduled,
    RelationshipCount,
    EventCount,
}

impl PatternKind {
    pub const ALL: [PatternKind; 5] = [
        PatternKind::LastValueByColumn,
        PatternKind::LastCreated,
        PatternKind::LastScheduled,
        PatternKind::RelationshipCount,
        PatternKind::EventCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::LastValueByColumn => "last_value_by_column",
            PatternKind::LastCreated => "last_created",
            PatternKind::LastScheduled => "last_scheduled",
            PatternKind::RelationshipCount => "relationship_count",
            PatternKind::EventCount => "event_count",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `last_created`, `LastCreated` and `last-created` alike.
impl FromStr for PatternKind {
    type Err = UnknownPatternKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        PatternKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == wanted)
            .ok_or_else(|| UnknownPatternKind(s.trim().to_string()))
    }
}

/// What the subquery projects.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr<'a> {
    Column(Identifier<'a>),
    /// `count(col)`, or `count(*)` when `None`.
    Count(Option<Identifier<'a>>),
    Sum(Identifier<'a>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSubquery<'a> {
    pub kind: PatternKind,
    pub table: ObjectName<'a>,
    pub value: ValueExpr<'a>,
    /// Inner side of the correlation predicate.
    pub inner_key: Identifier<'a>,
    pub outer_qualifier: Identifier<'a>,
    pub outer_key: Identifier<'a>,
    /// Local predicates with inner qualifiers removed, in source order.
    pub filters: Vec<String>,
    /// Window ordering for last-value kinds, e.g. `occurreddate desc`.
    pub ordering: Option<String>,
}

pub struct ClassifierContext<'c> {
    pub config: &'c OptimizerConfig,
    pub dialect: DialectFlags,
    /// Normalized bindings of the immediately enclosing scope.
    pub scope_bindings: &'c [String],
    /// Normalized names of every CTE defined in the statement.
    pub cte_names: &'c BTreeSet<String>,
}

struct Correlation<'a> {
    inner_key: Identifier<'a>,
    outer_qualifier: Identifier<'a>,
    outer_key: Identifier<'a>,
}

/// Classify a scalar subquery, or `None` if it has no known shape.
pub fn classify<'a>(
    query: &Query<'a>,
    ctx: &ClassifierContext<'_>,
) -> Option<ClassifiedSubquery<'a>> {
    if query.with_clause.is_some() || query.offset.is_some() {
        return None;
    }
    let select = query.as_select()?;
    if select.distinct.is_some() || !select.group_by.is_empty() || select.having.is_some() {
        return None;
    }
    let [SelectItem::Expr {
        expr: projected,
        alias: output_alias,
        ..
    }] = select.projection.as_slice()
    else {
        return None;
    };
    let [TableWithJoins {
        relation: TableFactor::Table { name, alias, .. },
        joins,
        ..
    }] = select.from.as_slice()
    else {
        return None;
    };
    if !joins.is_empty() {
        return None;
    }
    if let [single] = name.parts.as_slice() {
        if ctx.cte_names.contains(&single.normalized()) {
            return None;
        }
    }
    let inner = match alias {
        Some(alias) => alias.name.normalized(),
        None => name.parts.last()?.normalized(),
    };

    let predicate = select.where_clause.as_ref()?;
    let mut correlation = None;
    let mut locals = Vec::new();
    for conjunct in predicate.conjuncts() {
        if let Some(found) = correlation_of(conjunct, &inner, ctx.scope_bindings) {
            if correlation.replace(found).is_some() {
                return None;
            }
            continue;
        }
        if !is_local(conjunct, &inner) {
            return None;
        }
        locals.push(conjunct);
    }
    let correlation = correlation?;

    let shape = Shape {
        query,
        table: name,
        inner: &inner,
        correlation,
        locals,
        output_alias: output_alias.as_ref().map(Identifier::normalized),
    };
    match &projected.unnested().kind {
        ExpressionKind::Column(column) => {
            let value = inner_column(column, &inner)?;
            if shape.is_relationship_lookup(ctx.config, &value) {
                shape.relationship(ctx.config, ValueExpr::Column(value))
            } else {
                shape.last_value(ctx, value)
            }
        }
        ExpressionKind::Function(call) => shape.aggregate(ctx, call),
        _ => None,
    }
}

struct Shape<'q, 'a> {
    query: &'q Query<'a>,
    table: &'q ObjectName<'a>,
    inner: &'q str,
    correlation: Correlation<'a>,
    locals: Vec<&'q Expression<'a>>,
    output_alias: Option<String>,
}

impl<'a> Shape<'_, 'a> {
    fn finish(
        self,
        kind: PatternKind,
        value: ValueExpr<'a>,
        filters: Vec<String>,
        ordering: Option<String>,
    ) -> ClassifiedSubquery<'a> {
        ClassifiedSubquery {
            kind,
            table: self.table.clone(),
            value,
            inner_key: self.correlation.inner_key,
            outer_qualifier: self.correlation.outer_qualifier,
            outer_key: self.correlation.outer_key,
            filters,
            ordering,
        }
    }

    fn rendered_locals(&self) -> Vec<String> {
        self.locals
            .iter()
            .map(|local| render_local(local, self.inner))
            .collect()
    }

    fn correlated_on(&self, columns: &[String]) -> bool {
        let key = self.correlation.inner_key.normalized();
        columns.iter().any(|column| *column == key)
    }

    fn is_relationship_lookup(&self, config: &OptimizerConfig, value: &Identifier<'_>) -> bool {
        self.table.normalized() == config.relationship_table
            && self.correlation.inner_key.normalized() == config.relationship_key_column
            && value.normalized() == config.relationship_value_column
            && self.query.order_by.is_empty()
            && self.query.limit.is_none()
    }

    /// `select col ... where col is not null ... order by x desc limit 1`
    fn last_value(
        self,
        ctx: &ClassifierContext<'_>,
        value: Identifier<'a>,
    ) -> Option<ClassifiedSubquery<'a>> {
        let [order_item] = self.query.order_by.as_slice() else {
            return None;
        };
        if order_item.direction != Some(OrderDirection::Desc)
            || !is_local(&order_item.expr, self.inner)
        {
            return None;
        }
        let value_name = value.normalized();
        let renamed_output = self
            .output_alias
            .as_deref()
            .filter(|alias| *alias != value_name);
        if !orders_by_table_column(&order_item.expr, renamed_output) {
            log::trace!("ordering {} does not name a table column", order_item.expr.text);
            return None;
        }
        match &self.query.limit {
            Some(LimitValue::Count(limit))
                if limit.kind == ExpressionKind::Literal(Literal::Number("1")) => {}
            _ => return None,
        }
        if !self.correlated_on(&ctx.config.correlation_columns) {
            return None;
        }

        if value_name == self.correlation.inner_key.normalized() {
            return None;
        }
        if !ctx.dialect.spatial_support
            && ctx
                .config
                .geometry_columns
                .iter()
                .any(|column| column.eq_ignore_ascii_case(&value_name))
        {
            log::trace!("skipping geometry lookup of {} without spatial support", value_name);
            return None;
        }

        let mut guarded = false;
        let mut filters = Vec::new();
        for local in &self.locals {
            if !guarded && is_not_null_check(local, &value_name, self.inner) {
                guarded = true;
                continue;
            }
            filters.push(render_local(local, self.inner));
        }
        if !guarded {
            return None;
        }

        let mut ordering = format!("{} desc", render_local(&order_item.expr, self.inner));
        if let Some(nulls) = order_item.nulls {
            ordering.push(' ');
            ordering.push_str(&nulls.to_lowercase());
        }

        let kind = match value_name.as_str() {
            "scheduleddate" if filters.is_empty() => PatternKind::LastScheduled,
            "created" if filters.is_empty() => PatternKind::LastCreated,
            _ => PatternKind::LastValueByColumn,
        };
        if !ctx.config.patterns.contains(&kind) {
            return None;
        }
        Some(self.finish(kind, ValueExpr::Column(value), filters, Some(ordering)))
    }

    /// `select count(...)` or `select sum(relationship_count)`
    fn aggregate(
        self,
        ctx: &ClassifierContext<'_>,
        call: &FunctionCall<'a>,
    ) -> Option<ClassifiedSubquery<'a>> {
        if call.distinct
            || call.filter.is_some()
            || call.over.is_some()
            || !call.order_by.is_empty()
            || !self.query.order_by.is_empty()
            || self.query.limit.is_some()
        {
            return None;
        }
        let [function_name] = call.name.parts.as_slice() else {
            return None;
        };
        let [argument] = call.args.as_slice() else {
            return None;
        };
        match function_name.normalized().as_str() {
            "count" => {
                let counted = match &argument.kind {
                    ExpressionKind::Wildcard => None,
                    _ => Some(inner_column(argument.as_column()?, self.inner)?),
                };
                if !ctx.config.patterns.contains(&PatternKind::EventCount)
                    || !self.correlated_on(&ctx.config.correlation_columns)
                {
                    return None;
                }
                let filters = self.rendered_locals();
                Some(self.finish(
                    PatternKind::EventCount,
                    ValueExpr::Count(counted),
                    filters,
                    None,
                ))
            }
            "sum" => {
                let summed = inner_column(argument.as_column()?, self.inner)?;
                if self.table.normalized() != ctx.config.relationship_table
                    || self.correlation.inner_key.normalized()
                        != ctx.config.relationship_key_column
                    || summed.normalized() != ctx.config.relationship_value_column
                {
                    return None;
                }
                self.relationship(ctx.config, ValueExpr::Sum(summed))
            }
            _ => None,
        }
    }

    fn relationship(
        self,
        config: &OptimizerConfig,
        value: ValueExpr<'a>,
    ) -> Option<ClassifiedSubquery<'a>> {
        if !config.patterns.contains(&PatternKind::RelationshipCount) {
            return None;
        }
        let filters = self.rendered_locals();
        Some(self.finish(PatternKind::RelationshipCount, value, filters, None))
    }
}

/// Column of the inner relation: unqualified, or qualified with the inner binding.
fn inner_column<'a>(column: &ColumnRef<'a>, inner: &str) -> Option<Identifier<'a>> {
    match column.parts.as_slice() {
        [name] => Some(*name),
        [qualifier, name] if qualifier.normalized() == inner => Some(*name),
        _ => None,
    }
}

/// `<outer>.<col>` where `<outer>` is bound by the enclosing scope and is not the inner table.
fn outer_column<'a>(
    column: &ColumnRef<'a>,
    inner: &str,
    scope_bindings: &[String],
) -> Option<(Identifier<'a>, Identifier<'a>)> {
    let [qualifier, name] = column.parts.as_slice() else {
        return None;
    };
    let bound = qualifier.normalized();
    (bound != inner && scope_bindings.contains(&bound)).then_some((*qualifier, *name))
}

fn correlation_of<'a>(
    conjunct: &Expression<'a>,
    inner: &str,
    scope_bindings: &[String],
) -> Option<Correlation<'a>> {
    let ExpressionKind::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = &conjunct.unnested().kind
    else {
        return None;
    };
    let (left, right) = (left.unnested().as_column()?, right.unnested().as_column()?);
    [(left, right), (right, left)]
        .into_iter()
        .find_map(|(inner_side, outer_side)| {
            let (outer_qualifier, outer_key) = outer_column(outer_side, inner, scope_bindings)?;
            let inner_key = inner_column(inner_side, inner)?;
            Some(Correlation {
                inner_key,
                outer_qualifier,
                outer_key,
            })
        })
}

/// True when the predicate only touches the inner relation and contains no nested query.
fn is_local(expr: &Expression<'_>, inner: &str) -> bool {
    match &expr.kind {
        ExpressionKind::Column(column) => inner_column(column, inner).is_some(),
        ExpressionKind::Subquery(_)
        | ExpressionKind::Exists(_)
        | ExpressionKind::InSubquery { .. }
        | ExpressionKind::ArraySubquery(_)
        | ExpressionKind::Raw(_) => false,
        _ => expr
            .children()
            .into_iter()
            .all(|child| is_local(child, inner)),
    }
}

/// The window re-evaluates the ordering against the table, where ordinals
/// and projection aliases bind to nothing or to a different column.
fn orders_by_table_column(expr: &Expression<'_>, output_alias: Option<&str>) -> bool {
    let mut columns = Vec::new();
    collect_columns(expr, &mut columns);
    !columns.is_empty()
        && columns.iter().all(|column| {
            !(column.is_bare() && output_alias == Some(column.name().normalized().as_str()))
        })
}

fn collect_columns<'e, 'a>(expr: &'e Expression<'a>, out: &mut Vec<&'e ColumnRef<'a>>) {
    match &expr.kind {
        ExpressionKind::Column(column) => out.push(column),
        _ => {
            for child in expr.children() {
                collect_columns(child, out);
            }
        }
    }
}

fn is_not_null_check(expr: &Expression<'_>, value_name: &str, inner: &str) -> bool {
    match &expr.unnested().kind {
        ExpressionKind::IsCheck {
            expr,
            negated: true,
            target: IsTarget::Null,
        } => expr
            .unnested()
            .as_column()
            .and_then(|column| inner_column(column, inner))
            .is_some_and(|column| column.normalized() == value_name),
        _ => false,
    }
}

fn collect_qualified_columns<'e, 'a>(expr: &'e Expression<'a>, out: &mut Vec<&'e Expression<'a>>) {
    match &expr.kind {
        ExpressionKind::Column(column) if column.qualifier().is_some() => out.push(expr),
        _ => {
            for child in expr.children() {
                collect_qualified_columns(child, out);
            }
        }
    }
}

/// Predicate text with the inner qualifier dropped from column references.
fn render_local(expr: &Expression<'_>, inner: &str) -> String {
    let mut columns = Vec::new();
    collect_qualified_columns(expr, &mut columns);

    let mut replacements: Vec<(std::ops::Range<usize>, &str)> = columns
        .into_iter()
        .filter_map(|column_expr| {
            let column = column_expr.as_column()?;
            let name = inner_column(column, inner)?;
            Some((span_within(expr.text, column_expr.text)?, name.text))
        })
        .collect();
    replacements.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(expr.text.len());
    let mut cursor = 0;
    for (range, name) in replacements {
        out.push_str(&expr.text[cursor..range.start]);
        out.push_str(name);
        cursor = range.end;
    }
    out.push_str(&expr.text[cursor..]);
    out
}
