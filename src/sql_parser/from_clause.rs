use nom::{
    branch::alt,
    combinator::{map, opt},
    multi::separated_list1,
    sequence::{delimited, preceded},
    Parser,
};

use super::{
    ast::{
        Join, JoinConstraint, JoinOperator, ObjectName, TableAlias, TableFactor, TableWithJoins,
    },
    common::{
        any_identifier, consumed, enter_nesting, fail, identifier, keyword, sp, symbol, PResult,
    },
    expression::{parse_expression, parse_function_call},
    parse_query, starts_query,
};

pub fn parse_object_name(input: &str) -> PResult<'_, ObjectName<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut rest, first) = identifier(input)?;
    let mut parts = vec![first];
    while let Ok((after, part)) = preceded(symbol("."), any_identifier).parse(rest) {
        parts.push(part);
        rest = after;
    }
    Ok((
        rest,
        ObjectName {
            parts,
            text: consumed(start, rest),
        },
    ))
}

fn parse_table_alias(input: &str) -> PResult<'_, TableAlias<'_>> {
    let (rest, name) = match keyword("as")(input) {
        Ok((after, _)) => any_identifier(after)?,
        Err(_) => identifier(input)?,
    };
    let (rest, columns) = opt(delimited(
        symbol("("),
        separated_list1(symbol(","), identifier),
        symbol(")"),
    ))
    .parse(rest)?;
    Ok((
        rest,
        TableAlias {
            name,
            columns: columns.unwrap_or_default(),
        },
    ))
}

pub fn parse_table_factor(input: &str) -> PResult<'_, TableFactor<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, lateral) = opt(keyword("lateral")).parse(input)?;
    let lateral = lateral.is_some();

    if let Ok((after_paren, _)) = symbol("(")(rest) {
        if starts_query(after_paren) {
            let (rest, subquery) = parse_query(after_paren)?;
            let (rest, _) = symbol(")")(rest)?;
            let (rest, alias) = opt(parse_table_alias).parse(rest)?;
            return Ok((
                rest,
                TableFactor::Derived {
                    lateral,
                    subquery: Box::new(subquery),
                    alias,
                    text: consumed(start, rest),
                },
            ));
        }
        let _guard = enter_nesting(after_paren)?;
        let (rest, inner) = parse_table_with_joins(after_paren)?;
        let (rest, _) = symbol(")")(rest)?;
        let (rest, alias) = opt(parse_table_alias).parse(rest)?;
        return Ok((
            rest,
            TableFactor::NestedJoin {
                inner: Box::new(inner),
                alias,
                text: consumed(start, rest),
            },
        ));
    }

    match parse_function_call(rest) {
        Ok((after, call)) => {
            let (after, alias) = opt(parse_table_alias).parse(after)?;
            return Ok((
                after,
                TableFactor::Function {
                    lateral,
                    call,
                    alias,
                    text: consumed(start, after),
                },
            ));
        }
        Err(nom::Err::Error(_)) => {}
        Err(e) => return Err(e),
    }

    if lateral {
        return fail(rest, "LATERAL requires a subquery or function");
    }
    let (rest, name) = parse_object_name(rest)?;
    let (rest, alias) = opt(parse_table_alias).parse(rest)?;
    Ok((
        rest,
        TableFactor::Table {
            name,
            alias,
            text: consumed(start, rest),
        },
    ))
}

fn parse_join_operator(input: &str) -> PResult<'_, JoinOperator> {
    alt((
        map(keyword("join"), |_| JoinOperator::Inner),
        map((keyword("inner"), keyword("join")), |_| JoinOperator::Inner),
        map(
            (keyword("left"), opt(keyword("outer")), keyword("join")),
            |_| JoinOperator::LeftOuter,
        ),
        map(
            (keyword("right"), opt(keyword("outer")), keyword("join")),
            |_| JoinOperator::RightOuter,
        ),
        map(
            (keyword("full"), opt(keyword("outer")), keyword("join")),
            |_| JoinOperator::FullOuter,
        ),
        map((keyword("cross"), keyword("join")), |_| JoinOperator::Cross),
    ))
    .parse(input)
}

fn parse_join(input: &str) -> PResult<'_, Join<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, natural) = opt(keyword("natural")).parse(input)?;
    let (rest, operator) = parse_join_operator(rest)?;
    let (rest, relation) = parse_table_factor(rest)?;
    let (rest, constraint) = if natural.is_some() {
        (rest, JoinConstraint::Natural)
    } else if let Ok((after, _)) = keyword("on")(rest) {
        let (after, condition) = parse_expression(after)?;
        (after, JoinConstraint::On(condition))
    } else if let Ok((after, _)) = keyword("using")(rest) {
        let (after, columns) = delimited(
            symbol("("),
            separated_list1(symbol(","), identifier),
            symbol(")"),
        )
        .parse(after)?;
        (after, JoinConstraint::Using(columns))
    } else if operator == JoinOperator::Cross {
        (rest, JoinConstraint::None)
    } else {
        return fail(rest, "join requires ON or USING");
    };
    Ok((
        rest,
        Join {
            operator,
            relation,
            constraint,
            text: consumed(start, rest),
        },
    ))
}

pub fn parse_table_with_joins(input: &str) -> PResult<'_, TableWithJoins<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut rest, relation) = parse_table_factor(input)?;
    let mut joins = Vec::new();
    loop {
        match parse_join(rest) {
            Ok((after, join)) => {
                joins.push(join);
                rest = after;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((
        rest,
        TableWithJoins {
            relation,
            joins,
            text: consumed(start, rest),
        },
    ))
}

pub fn parse_from_clause(input: &str) -> PResult<'_, Vec<TableWithJoins<'_>>> {
    preceded(
        keyword("from"),
        separated_list1(symbol(","), parse_table_with_joins),
    )
    .parse(input)
}
