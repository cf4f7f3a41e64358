//! Generates the CTE definitions that replace correlated lookups.

use std::collections::BTreeSet;

use super::classifier::{ClassifiedSubquery, PatternKind, ValueExpr};
use crate::sql_parser::ast::Identifier;
use super::registry::CteRegistry;
use crate::utils::cte_naming::{
    generate_cte_base_name, generate_join_alias_base, generate_unique_name,
};

/// Output column of count CTEs.
pub const COUNT_COLUMN: &str = "de_count";

#[derive(Debug, Clone, PartialEq)]
pub struct CteDefinition {
    pub name: String,
    pub kind: PatternKind,
    /// Correlation column as written; the join key on the CTE side.
    pub join_column: String,
    /// Column holding the looked-up value, as written in generated SQL.
    pub value_column: String,
    /// Normalized names of the columns the CTE exposes.
    pub outputs: Vec<String>,
    /// Join alias before collision suffixing.
    pub alias_base: String,
    /// `name as (...)`, ready for a `WITH` list.
    pub sql: String,
}

impl CteDefinition {
    /// Expression that replaces a matched subquery.
    pub fn reference(&self, alias: &str) -> String {
        match self.kind {
            PatternKind::EventCount => format!("coalesce({}.{}, 0)", alias, self.value_column),
            _ => format!("{}.{}", alias, self.value_column),
        }
    }
}

/// One definition per requirement, in registry order.
///
/// Names avoid `reserved` (lower-cased CTE and table names of the statement)
/// and each other.
pub fn build_definitions(
    registry: &CteRegistry<'_>,
    reserved: &BTreeSet<String>,
) -> Vec<CteDefinition> {
    let mut taken = reserved.clone();
    registry
        .requirements()
        .iter()
        .map(|requirement| {
            let definition = build_definition(&requirement.template, &taken);
            taken.insert(definition.name.to_lowercase());
            log::trace!(
                "CTE {} serves {} occurrence(s)",
                definition.name,
                requirement.occurrences
            );
            definition
        })
        .collect()
}

fn build_definition(template: &ClassifiedSubquery<'_>, taken: &BTreeSet<String>) -> CteDefinition {
    let corr = template.inner_key.text;
    let table = template.table.text;

    let value_name = match &template.value {
        ValueExpr::Column(column) | ValueExpr::Sum(column) => Some(column.text),
        ValueExpr::Count(column) => column.map(|c| c.text),
    };
    let (prefix, alias_prefix, named_column) = match template.kind {
        PatternKind::LastScheduled => ("last_sched", "ls", None),
        PatternKind::LastCreated => ("last_created", "lc", None),
        PatternKind::LastValueByColumn => ("last_value", "lv", value_name),
        PatternKind::EventCount => ("de_count", "dec_decount", value_name),
        PatternKind::RelationshipCount => match template.value {
            ValueExpr::Sum(_) => ("relationship_count_agg", "rlc", None),
            _ => ("relationship_count", "rlc", None),
        },
    };
    let name = generate_unique_name(&generate_cte_base_name(prefix, named_column), taken);
    let alias_base = match template.kind {
        PatternKind::LastValueByColumn => generate_join_alias_base(alias_prefix, named_column),
        _ => alias_prefix.to_string(),
    };

    let (value_column, value_output, body) = match &template.value {
        ValueExpr::Column(column) if template.ordering.is_some() => (
            column.text.to_string(),
            column.normalized(),
            last_value_body(template, column),
        ),
        ValueExpr::Column(column) => (
            column.text.to_string(),
            column.normalized(),
            aggregate_body(
                &format!("{}, {}", corr, column.text),
                table,
                &template.filters,
                None,
            ),
        ),
        ValueExpr::Count(column) => (
            COUNT_COLUMN.to_string(),
            COUNT_COLUMN.to_string(),
            aggregate_body(
                &format!(
                    "{}, count({}) as {}",
                    corr,
                    column.map_or("*", |c| c.text),
                    COUNT_COLUMN
                ),
                table,
                &template.filters,
                Some(corr),
            ),
        ),
        ValueExpr::Sum(column) => (
            column.text.to_string(),
            column.normalized(),
            aggregate_body(
                &format!("{}, sum({}) as {}", corr, column.text, column.text),
                table,
                &template.filters,
                Some(corr),
            ),
        ),
    };

    CteDefinition {
        sql: format!("{} as (\n{}\n)", name, body),
        name,
        kind: template.kind,
        join_column: corr.to_string(),
        value_column,
        outputs: vec![template.inner_key.normalized(), value_output],
        alias_base,
    }
}

/// `where a\n<indent>  and b ...`, or nothing without predicates.
fn where_clause(predicates: &[String], indent: &str) -> String {
    let mut out = String::new();
    for (i, predicate) in predicates.iter().enumerate() {
        if i == 0 {
            out.push_str(&format!("\n{}where {}", indent, predicate));
        } else {
            out.push_str(&format!("\n{}    and {}", indent, predicate));
        }
    }
    out
}

fn last_value_body(template: &ClassifiedSubquery<'_>, column: &Identifier<'_>) -> String {
    let corr = template.inner_key.text;
    let ordering = template.ordering.as_deref().unwrap_or("occurreddate desc");
    let mut predicates = vec![format!("{} is not null", column.text)];
    predicates.extend(template.filters.iter().cloned());

    // row number and derived table names must not shadow the projected columns
    let projected: BTreeSet<String> = [template.inner_key.normalized(), column.normalized()]
        .into_iter()
        .map(|name| name.to_lowercase())
        .collect();
    let row_number = generate_unique_name("rn", &projected);
    let derived = generate_unique_name("t", &projected);

    format!(
        "    select {corr}, {column}\n    from (\n        select {corr}, {column},\n            row_number() over (partition by {corr} order by {ordering}) as {row_number}\n        from {table}{filters}\n    ) {derived}\n    where {row_number} = 1",
        corr = corr,
        column = column.text,
        ordering = ordering,
        row_number = row_number,
        table = template.table.text,
        filters = where_clause(&predicates, "        "),
        derived = derived,
    )
}

fn aggregate_body(
    projection: &str,
    table: &str,
    filters: &[String],
    group_by: Option<&str>,
) -> String {
    let mut body = format!(
        "    select {}\n    from {}{}",
        projection,
        table,
        where_clause(filters, "    ")
    );
    if let Some(group_by) = group_by {
        body.push_str(&format!("\n    group by {}", group_by));
    }
    body
}
