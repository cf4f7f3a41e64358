//! Unit tests for statement parsing edge cases and error handling
//!
//! Tests malformed statements, comments and the generator's SQL shapes to
//! ensure robust parsing without panics.

use analytics_cte_rewriter::optimize;
use analytics_cte_rewriter::sql_parser::ast::{ExpressionKind, SelectItem, SetExpr, TableFactor};
use analytics_cte_rewriter::sql_parser::parse_statement;
use std::borrow::Cow;

fn nested(open: &str, inner: &str, close: &str, depth: usize) -> String {
    format!("{}{}{}", open.repeat(depth), inner, close.repeat(depth))
}

fn assert_rejected(sql: &str, context: &str) {
    let err = parse_statement(sql).expect_err("deeply nested input should be rejected");
    assert!(
        err.errors.iter().any(|(_, ctx)| *ctx == context),
        "expected {:?}, got: {}",
        context,
        err
    );
    assert!(matches!(optimize(sql), Cow::Borrowed(s) if s == sql));
}

/// Test that malformed statements don't cause panics
#[test]
fn test_malformed_statements_no_panic() {
    let malformed = vec![
        "",                                  // Empty input
        "select",                            // Incomplete SELECT
        "select (",                          // Unclosed parenthesis
        "select )",                          // Wrong parenthesis
        "select a from",                     // Missing relation
        "select a from t where",             // Missing predicate
        "select a from t order by",          // Missing sort key
        "select 'unterminated from t",       // Unclosed string
        "select \"unterminated from t",      // Unclosed quoted identifier
        "select a /* never closed",          // Unclosed block comment
        "with x as (select 1",               // Unclosed CTE
        "with x as select 1 select 1",       // CTE without parentheses
        "select a from t limit",             // Missing limit value
        "select case when a then 1 from t",  // CASE without END
        "select a from t union",             // Missing set operand
        "delete from t",                     // Not a query
    ];

    for sql in malformed {
        assert!(parse_statement(sql).is_err(), "expected error for {:?}", sql);
    }
}

/// Test that random prefixes of a real statement never panic
#[test]
fn test_truncated_statements_no_panic() {
    let sql = "with pi as (select subax.enrollment, sum(1+1) as value \
               from analytics_enrollment_x as subax \
               where (select created from analytics_event_x \
               where analytics_event_x.enrollment = subax.enrollment \
               and created is not null order by occurreddate desc limit 1) is not null \
               group by subax.enrollment) select * from pi";
    for end in 0..sql.len() {
        let _ = parse_statement(&sql[..end]);
    }
    assert!(parse_statement(sql).is_ok());
}

/// Test comment handling around and inside statements
#[test]
fn test_comments_are_skipped() {
    let cases = vec![
        "-- leading\nselect 1",
        "/* leading */ select 1",
        "select 1 -- trailing",
        "select /* inline */ 1",
        "select 1 /* multi\nline\ncomment */",
        "select 1 /* nested /* block */ comment */",
        "with x as (select 1) -- end of CTE\nselect * from x",
    ];

    for sql in cases {
        assert!(parse_statement(sql).is_ok(), "failed for input: {}", sql);
    }
}

/// Test valid statements that should parse successfully
#[test]
fn test_valid_statements_parse() {
    let valid = vec![
        "select 1",
        "SELECT ax.enrollment FROM analytics_enrollment_x AS ax",
        "select distinct on (ax.ou) ax.ou, ax.enrollment from analytics_enrollment_x ax order by ax.ou",
        "select ax.* from analytics_enrollment_x ax left join ou on ou.uid = ax.ou",
        "select count(*) filter (where x > 1) from t",
        "select a from t where a in (1, 2, 3) and b not like 'x%'",
        "select a from t where a between 1 and 2 or b is not distinct from c",
        "select coalesce(\"H6uSAMO5WLD\"::text, '') = 'RDT' from t",
        "select a from t group by a having count(*) > 1 order by 1 desc nulls last limit 10 offset 5",
        "select x.a from (select a from t) x",
        "select l.a from t cross join lateral (select t.a) l",
        "(select a from x) union all (select a from y) order by a",
        "with recursive r as (select 1 as n union all select n + 1 from r where n < 5) select n from r",
        "select a from t;",
    ];

    for sql in valid {
        if let Err(e) = parse_statement(sql) {
            panic!("expected {:?} to parse, got: {}", sql, e);
        }
    }
}

/// Test that node text stays a slice of the input
#[test]
fn test_node_text_is_verbatim() {
    let sql = "select   Coalesce( (select created from analytics_event_x where analytics_event_x.enrollment = ax.enrollment) , 0 )  as c from analytics_enrollment_x as ax";
    let statement = parse_statement(sql).unwrap();
    let SetExpr::Select(select) = &statement.query.body else {
        panic!("expected select body");
    };
    let SelectItem::Expr { expr, alias, .. } = &select.projection[0] else {
        panic!("expected expression item");
    };
    assert_eq!(
        expr.text,
        "Coalesce( (select created from analytics_event_x where analytics_event_x.enrollment = ax.enrollment) , 0 )"
    );
    assert_eq!(alias.as_ref().map(|a| a.text), Some("c"));

    let ExpressionKind::Function(call) = &expr.kind else {
        panic!("expected function call");
    };
    let ExpressionKind::Subquery(subquery) = &call.args[0].kind else {
        panic!("expected scalar subquery");
    };
    assert!(subquery.text.starts_with("select created"));

    assert!(matches!(
        select.from[0].relation,
        TableFactor::Table { .. }
    ));
}

/// Test that pathological nesting is rejected instead of overflowing the stack
#[test]
fn test_deep_nesting_is_rejected() {
    for depth in [1_000, 10_000] {
        let parens = format!("select {} from t", nested("(", "1", ")", depth));
        assert_rejected(&parens, "nesting too deep");

        let subqueries = format!("select {}", nested("(select ", "1", ")", depth));
        assert_rejected(&subqueries, "nesting too deep");

        let set_operands = nested("(", "select 1", ")", depth);
        assert_rejected(&set_operands, "nesting too deep");

        let negations = format!("select a from t where {}a", "not ".repeat(depth));
        assert_rejected(&negations, "nesting too deep");

        let signs = format!("select {}1", "- ".repeat(depth));
        assert_rejected(&signs, "nesting too deep");

        let joins = format!("select 1 from {}", nested("(", "t", ")", depth));
        assert_rejected(&joins, "nesting too deep");

        let functions = format!("select {}", nested("coalesce(", "1", ")", depth));
        assert_rejected(&functions, "nesting too deep");
    }
}

/// Test that very long flat chains are rejected before they build deep trees
#[test]
fn test_long_chains_are_rejected() {
    let sum = format!("select {} from t", vec!["1"; 10_000].join(" + "));
    assert_rejected(&sum, "operator chain too long");

    let unions = format!("select 1{}", " union select 1".repeat(1_000));
    assert_rejected(&unions, "too many set operations");
}

/// Test that ordinary nesting still parses
#[test]
fn test_moderate_nesting_parses() {
    let valid = vec![
        format!("select {} from t", nested("(", "1", ")", 8)),
        format!("select {}", nested("(select ", "1", ")", 4)),
        nested("(", "select 1", ")", 6),
        format!("select a from t where {}a", "not ".repeat(6)),
        format!("select {}1", "- ".repeat(6)),
        format!("select 1 from {}", nested("(", "t", ")", 6)),
        format!("select {} from t", vec!["a"; 200].join(" or ")),
        format!("select 1{}", " union all select 1".repeat(100)),
    ];

    for sql in valid {
        if let Err(e) = parse_statement(&sql) {
            panic!("expected {:?} to parse, got: {}", sql, e);
        }
    }
}
