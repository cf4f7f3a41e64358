use nom::{
    branch::alt,
    combinator::{map, opt},
    multi::separated_list1,
    sequence::preceded,
    Parser,
};

use super::{
    ast::{Expression, LimitValue, OrderByItem, OrderDirection},
    common::{consumed, keyword, sp, symbol, PResult},
    expression::parse_expression,
};

/// ORDER BY items followed by LIMIT and OFFSET in either order.
#[derive(Debug, Clone, Default)]
pub struct OrderByAndPageClause<'a> {
    pub order_by: Vec<OrderByItem<'a>>,
    pub limit: Option<LimitValue<'a>>,
    pub offset: Option<Expression<'a>>,
}

pub fn parse_order_by_item(input: &str) -> PResult<'_, OrderByItem<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, expr) = parse_expression(input)?;
    let (rest, direction) = opt(alt((
        map(keyword("asc"), |_| OrderDirection::Asc),
        map(keyword("desc"), |_| OrderDirection::Desc),
    )))
    .parse(rest)?;
    let (rest, nulls) = match (keyword("nulls"), alt((keyword("first"), keyword("last")))).parse(rest)
    {
        Ok((after, _)) => {
            let (clause_start, _) = sp(rest)?;
            (after, Some(consumed(clause_start, after)))
        }
        Err(nom::Err::Error(_)) => (rest, None),
        Err(e) => return Err(e),
    };
    Ok((
        rest,
        OrderByItem {
            expr,
            direction,
            nulls,
            text: consumed(start, rest),
        },
    ))
}

pub fn parse_order_by_items(input: &str) -> PResult<'_, Vec<OrderByItem<'_>>> {
    separated_list1(symbol(","), parse_order_by_item).parse(input)
}

fn parse_limit(input: &str) -> PResult<'_, LimitValue<'_>> {
    preceded(
        keyword("limit"),
        alt((
            map(keyword("all"), |_| LimitValue::All),
            map(parse_expression, LimitValue::Count),
        )),
    )
    .parse(input)
}

fn parse_offset(input: &str) -> PResult<'_, Expression<'_>> {
    let (rest, offset) = preceded(keyword("offset"), parse_expression).parse(input)?;
    let (rest, _) = opt(alt((keyword("rows"), keyword("row")))).parse(rest)?;
    Ok((rest, offset))
}

pub fn parse_order_by_and_page_clause(input: &str) -> PResult<'_, OrderByAndPageClause<'_>> {
    let (mut rest, order_by) =
        opt(preceded((keyword("order"), keyword("by")), parse_order_by_items)).parse(input)?;
    let mut clause = OrderByAndPageClause {
        order_by: order_by.unwrap_or_default(),
        ..Default::default()
    };
    loop {
        if clause.limit.is_none() {
            if let Ok((after, limit)) = parse_limit(rest) {
                clause.limit = Some(limit);
                rest = after;
                continue;
            }
        }
        if clause.offset.is_none() {
            if let Ok((after, offset)) = parse_offset(rest) {
                clause.offset = Some(offset);
                rest = after;
                continue;
            }
        }
        return Ok((rest, clause));
    }
}
