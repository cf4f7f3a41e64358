//! Properties that hold for any input: fail-open, determinism, idempotence, sharing.

use analytics_cte_rewriter::config::OptimizerConfig;
use analytics_cte_rewriter::cte_optimizer::{CteOptimizerError, PatternKind};
use analytics_cte_rewriter::sql_parser::parse_statement;
use analytics_cte_rewriter::{optimize, CteOptimizer, DialectFlags};
use std::borrow::Cow;
use test_case::test_case;

fn lookup(column: &str, outer: &str) -> String {
    format!(
        "(select {column} from analytics_event_x \
         where analytics_event_x.enrollment = {outer}.enrollment \
         and {column} is not null order by occurreddate desc limit 1)"
    )
}

#[test_case("select * from t where (" ; "unbalanced parenthesis")]
#[test_case("" ; "empty input")]
#[test_case("update t set x = 1" ; "not a query")]
#[test_case("select ax.enrollment from analytics_enrollment_x as ax" ; "no subqueries")]
#[test_case("select ax.enrollment from analytics_enrollment_x as ax where ax.ou in (select uid from ou)" ; "in subquery")]
#[test_case("select ax.enrollment from analytics_enrollment_x as ax where exists (select 1 from analytics_event_x where analytics_event_x.enrollment = ax.enrollment)" ; "exists subquery")]
#[test_case("select (select max(created) from analytics_event_x where analytics_event_x.enrollment = ax.enrollment) from analytics_enrollment_x as ax" ; "unsupported aggregate")]
fn test_untouched_statements_are_borrowed(sql: &str) {
    assert!(matches!(optimize(sql), Cow::Borrowed(s) if s == sql));
}

#[test]
fn test_rewrite_is_deterministic() {
    let sql = format!(
        "select {}, {} from analytics_enrollment_x as ax",
        lookup("created", "ax"),
        lookup("\"H6uSAMO5WLD\"", "ax")
    );
    let first = optimize(&sql).into_owned();
    for _ in 0..5 {
        assert_eq!(optimize(&sql), first);
    }
}

#[test]
fn test_rewrite_is_idempotent() {
    let sql = format!(
        "with pi as (select subax.enrollment from analytics_enrollment_x as subax where {} > 1 group by subax.enrollment) select * from pi",
        lookup("scheduleddate", "subax")
    );
    let once = optimize(&sql).into_owned();
    assert_ne!(once, sql);
    assert!(matches!(optimize(&once), Cow::Borrowed(_)));
}

#[test]
fn test_repeated_lookup_shares_one_cte() {
    let value = lookup("\"H6uSAMO5WLD\"", "ax");
    let sql = format!(
        "select {v} as a, coalesce({v}::text, '') as b from analytics_enrollment_x as ax where {v} is not null order by {v} desc",
        v = value
    );
    let rewritten = optimize(&sql);

    assert_eq!(rewritten.matches(" as (").count(), 1);
    assert_eq!(rewritten.matches("left join").count(), 1);
    assert_eq!(rewritten.matches("lv_H6uSAMO5WLD.\"H6uSAMO5WLD\"").count(), 4);
    assert!(parse_statement(&rewritten).is_ok());
}

#[test]
fn test_each_scope_gets_its_own_join() {
    let sql = format!(
        "with pi as (select subax.enrollment, {} as c from analytics_enrollment_x as subax) \
         select ax.enrollment, {} as c from analytics_enrollment_x as ax",
        lookup("created", "subax"),
        lookup("created", "ax")
    );
    let rewritten = optimize(&sql);

    assert_eq!(rewritten.matches("last_created as (").count(), 1);
    assert!(rewritten.contains("left join last_created as lc on subax.enrollment = lc.enrollment"));
    assert!(rewritten.contains("left join last_created as lc on ax.enrollment = lc.enrollment"));
}

#[test]
fn test_generated_names_avoid_existing_ctes() {
    let sql = format!(
        "with last_created as (select 1 as x) \
         select ax.enrollment, {} as c from analytics_enrollment_x as ax",
        lookup("created", "ax")
    );
    let rewritten = optimize(&sql);

    assert!(rewritten.starts_with("with last_created_2 as ("));
    assert!(rewritten.contains("left join last_created_2 as lc on ax.enrollment = lc.enrollment"));
}

#[test]
fn test_grouped_projection_outside_aggregate_is_not_rewritten() {
    let sql = format!(
        "select ax.ou, {} from analytics_enrollment_x as ax group by ax.ou",
        lookup("created", "ax")
    );
    assert!(matches!(optimize(&sql), Cow::Borrowed(_)));

    let inside_aggregate = format!(
        "select ax.ou, max({}) from analytics_enrollment_x as ax group by ax.ou",
        lookup("created", "ax")
    );
    assert!(optimize(&inside_aggregate).contains("max(lc.created)"));
}

#[test]
fn test_ambiguous_scope_is_reported() {
    let sql = format!(
        "select enrollment, {} from analytics_enrollment_x as ax join ou on ou.uid = ax.ou",
        lookup("created", "ax")
    );
    let result = CteOptimizer::default().try_optimize(&sql, DialectFlags::default());
    assert!(matches!(result, Err(CteOptimizerError::AmbiguousScope(_))));
    assert!(matches!(optimize(&sql), Cow::Borrowed(_)));
}

#[test]
fn test_bare_generated_name_in_exists_is_left_alone() {
    let sql = format!(
        "select ax.enrollment from analytics_enrollment_x as ax \
         where {} > '2024-01-01' \
         and exists (select 1 from ou_table o where o.uid = scheduleddate)",
        lookup("scheduleddate", "ax")
    );
    let result = CteOptimizer::default().try_optimize(&sql, DialectFlags::default());
    assert!(matches!(result, Err(CteOptimizerError::AmbiguousScope(_))));
    assert!(matches!(optimize(&sql), Cow::Borrowed(s) if s == sql));

    let qualified = format!(
        "select ax.enrollment from analytics_enrollment_x as ax \
         where {} > '2024-01-01' \
         and exists (select 1 from ou_table o where o.uid = ax.ou)",
        lookup("scheduleddate", "ax")
    );
    let rewritten = optimize(&qualified);
    assert!(rewritten.contains("ls.scheduleddate > '2024-01-01'"));
    assert!(rewritten.contains("exists (select 1 from ou_table o where o.uid = ax.ou)"));
}

#[test]
fn test_disabled_pattern_kinds_are_left_alone() {
    let sql = format!(
        "select {} as s, {} as c from analytics_enrollment_x as ax",
        lookup("scheduleddate", "ax"),
        lookup("created", "ax")
    );
    let config = OptimizerConfig {
        patterns: [PatternKind::LastCreated].into_iter().collect(),
        ..Default::default()
    };
    let rewritten = CteOptimizer::new(config).optimize(&sql, DialectFlags::default());

    assert!(rewritten.contains("lc.created as c"));
    assert!(rewritten.contains(&lookup("scheduleddate", "ax")));
    assert!(!rewritten.contains("last_sched"));
}
