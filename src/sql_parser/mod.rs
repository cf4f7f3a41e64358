//! Parser for the Postgres-flavored SQL produced by the analytics query generator.
//!
//! This is not a general SQL parser. It covers the `SELECT` grammar the generator
//! emits (CTEs, joins, set operations, scalar subqueries, casts, window functions)
//! and keeps every node's source slice so callers can rewrite by byte range.

use ast::{SetExpr, SetOperator, Statement, Query};
use common::{
    consumed, enter_nesting, keyword, peek_keyword, sp, symbol, PResult, MAX_OPERATOR_CHAIN,
};
use nom::{
    branch::alt,
    combinator::{map, opt},
    Parser,
};
use order_by_and_page_clause::parse_order_by_and_page_clause;
use select_clause::parse_select;
use with_clause::parse_with_clause;

pub mod ast;
pub(crate) mod common;
pub mod errors;
mod expression;
mod from_clause;
mod order_by_and_page_clause;
mod select_clause;
mod where_clause;
mod with_clause;

pub use errors::SqlParsingError;

/// Whether `input` begins a query, possibly behind extra opening parentheses.
pub(crate) fn starts_query(mut input: &str) -> bool {
    loop {
        if peek_keyword(input, "select") || peek_keyword(input, "with") {
            return true;
        }
        match symbol("(")(input) {
            Ok((rest, _)) => input = rest,
            Err(_) => return false,
        }
    }
}

fn parse_set_operand(input: &str) -> PResult<'_, SetExpr<'_>> {
    if let Ok((after_paren, _)) = symbol("(")(input) {
        let (rest, query) = parse_query(after_paren)?;
        let (rest, _) = symbol(")")(rest)?;
        return Ok((rest, SetExpr::Query(Box::new(query))));
    }
    map(parse_select, |select| SetExpr::Select(Box::new(select))).parse(input)
}

fn parse_set_operator(input: &str) -> PResult<'_, SetOperator> {
    alt((
        map(keyword("union"), |_| SetOperator::Union),
        map(keyword("intersect"), |_| SetOperator::Intersect),
        map(keyword("except"), |_| SetOperator::Except),
    ))
    .parse(input)
}

fn parse_set_expr(input: &str) -> PResult<'_, SetExpr<'_>> {
    let (mut rest, mut left) = parse_set_operand(input)?;
    for _ in 0..MAX_OPERATOR_CHAIN {
        let (after, op) = match parse_set_operator(rest) {
            Ok(found) => found,
            Err(nom::Err::Error(_)) => return Ok((rest, left)),
            Err(e) => return Err(e),
        };
        let (after, quantifier) = opt(alt((keyword("all"), keyword("distinct")))).parse(after)?;
        let all = quantifier.is_some_and(|q| q.eq_ignore_ascii_case("all"));
        let (after, right) = parse_set_operand(after)?;
        left = SetExpr::SetOperation {
            op,
            all,
            left: Box::new(left),
            right: Box::new(right),
        };
        rest = after;
    }
    match parse_set_operator(rest) {
        Ok(_) => Err(nom::Err::Failure(SqlParsingError::new(
            rest,
            "too many set operations",
        ))),
        Err(nom::Err::Error(_)) => Ok((rest, left)),
        Err(e) => Err(e),
    }
}

pub(crate) fn parse_query(input: &str) -> PResult<'_, Query<'_>> {
    let (input, _) = sp(input)?;
    let _guard = enter_nesting(input)?;
    let start = input;
    let (rest, with_clause) = opt(parse_with_clause).parse(input)?;
    let (rest, body) = parse_set_expr(rest)?;
    let (rest, page) = parse_order_by_and_page_clause(rest)?;
    Ok((
        rest,
        Query {
            with_clause,
            body,
            order_by: page.order_by,
            limit: page.limit,
            offset: page.offset,
            text: consumed(start, rest),
        },
    ))
}

fn parse_statement_with_nom(input: &str) -> PResult<'_, Statement<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, query) = parse_query(input)?;
    let (rest, _) = opt(symbol(";")).parse(rest)?;
    let text = consumed(start, rest);
    let (rest, _) = sp(rest)?;
    if !rest.is_empty() {
        return Err(nom::Err::Error(SqlParsingError::new(
            rest,
            "Unexpected tokens after statement",
        )));
    }
    Ok((rest, Statement { query, text }))
}

/// Parses exactly one statement; trailing tokens other than `;` and comments are an error.
pub fn parse_statement(input: &str) -> Result<Statement<'_>, SqlParsingError<'_>> {
    match parse_statement_with_nom(input) {
        Ok((_, statement)) => Ok(statement),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e),
        Err(nom::Err::Incomplete(_)) => Err(SqlParsingError::new(input, "Incomplete input")),
    }
}
