use nom::{
    branch::alt,
    combinator::{map, opt},
    multi::separated_list1,
    sequence::{preceded, terminated},
    Parser,
};

use super::{
    ast::{Distinct, ObjectName, Select, SelectItem},
    common::{any_identifier, consumed, identifier, keyword, sp, symbol, PResult},
    expression::{parse_expression, parse_expression_list},
    from_clause::parse_from_clause,
    where_clause::parse_where_clause,
};

/// `alias.*` or `schema.table.*`
fn parse_qualified_wildcard(input: &str) -> PResult<'_, ObjectName<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut rest, first) = identifier(input)?;
    let mut parts = vec![first];
    loop {
        let (after_dot, _) = symbol(".")(rest)?;
        if let Ok((after, _)) = symbol("*")(after_dot) {
            let qualifier = ObjectName {
                parts,
                text: consumed(start, rest),
            };
            return Ok((after, qualifier));
        }
        let (after, part) = any_identifier(after_dot)?;
        parts.push(part);
        rest = after;
    }
}

fn parse_select_item(input: &str) -> PResult<'_, SelectItem<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    if let Ok((rest, text)) = symbol("*")(input) {
        return Ok((rest, SelectItem::Wildcard { text }));
    }
    if let Ok((rest, qualifier)) = parse_qualified_wildcard(input) {
        return Ok((
            rest,
            SelectItem::QualifiedWildcard {
                qualifier,
                text: consumed(start, rest),
            },
        ));
    }
    let (rest, expr) = parse_expression(input)?;
    let (rest, alias) = match keyword("as")(rest) {
        Ok((after, _)) => {
            let (after, alias) = any_identifier(after)?;
            (after, Some(alias))
        }
        Err(_) => match identifier(rest) {
            Ok((after, alias)) => (after, Some(alias)),
            Err(_) => (rest, None),
        },
    };
    Ok((
        rest,
        SelectItem::Expr {
            expr,
            alias,
            text: consumed(start, rest),
        },
    ))
}

fn parse_distinct(input: &str) -> PResult<'_, Distinct<'_>> {
    alt((
        map(
            preceded(
                (keyword("distinct"), keyword("on"), symbol("(")),
                terminated(parse_expression_list, symbol(")")),
            ),
            Distinct::On,
        ),
        map(keyword("distinct"), |_| Distinct::Distinct),
    ))
    .parse(input)
}

pub fn parse_select(input: &str) -> PResult<'_, Select<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = keyword("select")(input)?;
    let (rest, distinct) = opt(parse_distinct).parse(rest)?;
    let (rest, _) = if distinct.is_none() {
        opt(keyword("all")).parse(rest)?
    } else {
        (rest, None)
    };
    let (rest, projection) = separated_list1(symbol(","), parse_select_item).parse(rest)?;
    let (rest, from) = opt(parse_from_clause).parse(rest)?;
    let (rest, where_clause) = opt(parse_where_clause).parse(rest)?;
    let (rest, group_by) =
        opt(preceded((keyword("group"), keyword("by")), parse_expression_list)).parse(rest)?;
    let (rest, having) = opt(preceded(keyword("having"), parse_expression)).parse(rest)?;
    Ok((
        rest,
        Select {
            distinct,
            projection,
            from: from.unwrap_or_default(),
            where_clause,
            group_by: group_by.unwrap_or_default(),
            having,
            text: consumed(start, rest),
        },
    ))
}
