use nom::{
    branch::alt,
    combinator::{map, opt},
    multi::separated_list1,
    sequence::delimited,
    Parser,
};

use super::{
    ast::{CommonTableExpression, WithClause},
    common::{consumed, identifier, keyword, sp, symbol, PResult},
    parse_query,
};

fn parse_common_table_expression(input: &str) -> PResult<'_, CommonTableExpression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, name) = identifier(input)?;
    let (rest, columns) = opt(delimited(
        symbol("("),
        separated_list1(symbol(","), identifier),
        symbol(")"),
    ))
    .parse(rest)?;
    let (rest, _) = keyword("as")(rest)?;
    let (rest, materialized) = opt(alt((
        map(keyword("materialized"), |_| true),
        map((keyword("not"), keyword("materialized")), |_| false),
    )))
    .parse(rest)?;
    let (rest, query) = delimited(symbol("("), parse_query, symbol(")")).parse(rest)?;
    Ok((
        rest,
        CommonTableExpression {
            name,
            columns: columns.unwrap_or_default(),
            materialized,
            query: Box::new(query),
            text: consumed(start, rest),
        },
    ))
}

pub fn parse_with_clause(input: &str) -> PResult<'_, WithClause<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = keyword("with")(input)?;
    let (rest, recursive) = opt(keyword("recursive")).parse(rest)?;
    let (rest, ctes) = separated_list1(symbol(","), parse_common_table_expression).parse(rest)?;
    Ok((
        rest,
        WithClause {
            recursive: recursive.is_some(),
            ctes,
            text: consumed(start, rest),
        },
    ))
}
