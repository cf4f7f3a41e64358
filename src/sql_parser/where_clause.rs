use nom::{combinator::cut, error::context, sequence::preceded, Parser};

use super::{
    ast::Expression,
    common::{keyword, PResult},
    expression::parse_expression,
};

pub fn parse_where_clause(input: &str) -> PResult<'_, Expression<'_>> {
    context(
        "Error in where clause",
        preceded(keyword("where"), cut(parse_expression)),
    )
    .parse(input)
}
