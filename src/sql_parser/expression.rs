use nom::{
    branch::alt,
    character::complete::{char, digit1},
    combinator::{map, opt, recognize},
    multi::{many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    Parser,
};

use super::ast::{
    BinaryOperator, CaseExpression, ColumnRef, Expression, ExpressionKind, FunctionCall,
    Identifier, IsTarget, LikeOperator, Literal, ObjectName, OrderByItem, UnaryOperator,
    WindowSpec,
};
use super::common::{
    any_identifier, balanced_content, bare_word, consumed, enter_nesting, fail, identifier,
    is_reserved_keyword, keyword, number_literal, peek_keyword, peek_symbol, sp, string_literal,
    symbol, PResult, MAX_OPERATOR_CHAIN,
};
use super::errors::SqlParsingError;
use super::order_by_and_page_clause::parse_order_by_items;
use super::{parse_query, starts_query};

const OPERATOR_CHARS: &[u8] = b"+-*/<>=~!@#%^&|`";
const SPECIAL_OPERATOR_CHARS: &[u8] = b"~!@#%^&|`";

/// Reserved words that still name ordinary functions when followed by `(`.
const RESERVED_FUNCTION_NAMES: &[&str] = &["any", "all", "some", "left", "right"];

const SQL_VALUE_KEYWORDS: &[&str] = &[
    "current_date",
    "current_time",
    "current_timestamp",
    "localtime",
    "localtimestamp",
    "current_user",
    "session_user",
];

const TYPED_LITERAL_PREFIXES: &[&str] = &["date", "time", "timestamp", "timestamptz", "interval"];

const TYPE_NAME_CONTINUATIONS: &[&str] = &["precision", "varying", "with", "without", "time", "zone"];

const FRAME_KEYWORDS: &[&str] = &["rows", "range", "groups"];

fn spanned<'a>(start: &'a str, rest: &'a str, kind: ExpressionKind<'a>) -> Expression<'a> {
    Expression {
        kind,
        text: consumed(start, rest),
    }
}

pub fn parse_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let _guard = enter_nesting(input)?;
    parse_logical_or(input)
}

pub fn parse_expression_list(input: &str) -> PResult<'_, Vec<Expression<'_>>> {
    separated_list1(symbol(","), parse_expression).parse(input)
}

/// Left-associative chain `operand (operator operand)*`.
fn fold_binary<'a>(
    input: &'a str,
    operand: fn(&'a str) -> PResult<'a, Expression<'a>>,
    operator: fn(&'a str) -> PResult<'a, BinaryOperator<'a>>,
) -> PResult<'a, Expression<'a>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut input, mut left) = operand(input)?;
    let mut folded = 0;
    loop {
        let (after_op, op) = match operator(input) {
            Ok(found) => found,
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        };
        folded += 1;
        if folded > MAX_OPERATOR_CHAIN {
            return Err(nom::Err::Failure(SqlParsingError::new(
                input,
                "operator chain too long",
            )));
        }
        let (rest, right) = operand(after_op)?;
        left = spanned(
            start,
            rest,
            ExpressionKind::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        );
        input = rest;
    }
}

/// Longest operator token, trimmed the way Postgres lexes `a=-1` as `=` followed by `-`.
fn operator_token(input: &str) -> PResult<'_, &str> {
    let (input, _) = sp(input)?;
    let bytes = input.as_bytes();
    let mut len = bytes
        .iter()
        .take_while(|b| OPERATOR_CHARS.contains(b))
        .count();
    if let Some(comment) = input[..len]
        .find("--")
        .into_iter()
        .chain(input[..len].find("/*"))
        .min()
    {
        len = comment;
    }
    while len > 1
        && matches!(bytes[len - 1], b'+' | b'-')
        && !bytes[..len]
            .iter()
            .any(|b| SPECIAL_OPERATOR_CHARS.contains(b))
    {
        len -= 1;
    }
    if len == 0 {
        return fail(input, "expected operator");
    }
    Ok((&input[len..], &input[..len]))
}

fn or_operator(input: &str) -> PResult<'_, BinaryOperator<'_>> {
    map(keyword("or"), |_| BinaryOperator::Or).parse(input)
}

fn and_operator(input: &str) -> PResult<'_, BinaryOperator<'_>> {
    map(keyword("and"), |_| BinaryOperator::And).parse(input)
}

fn comparison_operator(input: &str) -> PResult<'_, BinaryOperator<'_>> {
    let (rest, token) = operator_token(input)?;
    let op = match token {
        "=" => BinaryOperator::Eq,
        "<>" | "!=" => BinaryOperator::NotEq,
        "<" => BinaryOperator::Lt,
        "<=" => BinaryOperator::LtEq,
        ">" => BinaryOperator::Gt,
        ">=" => BinaryOperator::GtEq,
        _ => return fail(input, "expected comparison operator"),
    };
    Ok((rest, op))
}

fn other_operator(input: &str) -> PResult<'_, BinaryOperator<'_>> {
    let (rest, token) = operator_token(input)?;
    let op = match token {
        "+" | "-" | "*" | "/" | "%" | "^" | "=" | "<>" | "!=" | "<" | "<=" | ">" | ">=" => {
            return fail(input, "expected operator")
        }
        "||" => BinaryOperator::Concat,
        other => BinaryOperator::Other(other),
    };
    Ok((rest, op))
}

fn additive_operator(input: &str) -> PResult<'_, BinaryOperator<'_>> {
    let (rest, token) = operator_token(input)?;
    match token {
        "+" => Ok((rest, BinaryOperator::Plus)),
        "-" => Ok((rest, BinaryOperator::Minus)),
        _ => fail(input, "expected + or -"),
    }
}

fn multiplicative_operator(input: &str) -> PResult<'_, BinaryOperator<'_>> {
    let (rest, token) = operator_token(input)?;
    match token {
        "*" => Ok((rest, BinaryOperator::Multiply)),
        "/" => Ok((rest, BinaryOperator::Divide)),
        "%" => Ok((rest, BinaryOperator::Modulo)),
        _ => fail(input, "expected *, / or %"),
    }
}

fn exponent_operator(input: &str) -> PResult<'_, BinaryOperator<'_>> {
    let (rest, token) = operator_token(input)?;
    match token {
        "^" => Ok((rest, BinaryOperator::Exponent)),
        _ => fail(input, "expected ^"),
    }
}

fn parse_logical_or(input: &str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_logical_and, or_operator)
}

fn parse_logical_and(input: &str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_not_expression, and_operator)
}

fn parse_not_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    if let Ok((rest, _)) = keyword("not")(input) {
        let _guard = enter_nesting(input)?;
        let (rest, expr) = parse_not_expression(rest)?;
        return Ok((
            rest,
            spanned(
                start,
                rest,
                ExpressionKind::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(expr),
                },
            ),
        ));
    }
    parse_is_expression(input)
}

fn parse_is_target(input: &str) -> PResult<'_, IsTarget<'_>> {
    alt((
        map(keyword("null"), |_| IsTarget::Null),
        map(keyword("true"), |_| IsTarget::True),
        map(keyword("false"), |_| IsTarget::False),
        map(keyword("unknown"), |_| IsTarget::Unknown),
        map(
            preceded(
                (keyword("distinct"), keyword("from")),
                parse_comparison_expression,
            ),
            |other| IsTarget::DistinctFrom(Box::new(other)),
        ),
    ))
    .parse(input)
}

fn parse_is_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut input, mut expr) = parse_comparison_expression(input)?;
    loop {
        let (rest, negated, target) = if let Ok((rest, _)) = keyword("isnull")(input) {
            (rest, false, IsTarget::Null)
        } else if let Ok((rest, _)) = keyword("notnull")(input) {
            (rest, true, IsTarget::Null)
        } else if let Ok((rest, _)) = keyword("is")(input) {
            let (rest, not) = opt(keyword("not")).parse(rest)?;
            let (rest, target) = parse_is_target(rest)?;
            (rest, not.is_some(), target)
        } else {
            return Ok((input, expr));
        };
        expr = spanned(
            start,
            rest,
            ExpressionKind::IsCheck {
                expr: Box::new(expr),
                negated,
                target,
            },
        );
        input = rest;
    }
}

fn parse_comparison_expression(input: &str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_predicate_expression, comparison_operator)
}

fn parse_like_operator(input: &str) -> PResult<'_, LikeOperator> {
    alt((
        map(keyword("like"), |_| LikeOperator::Like),
        map(keyword("ilike"), |_| LikeOperator::ILike),
        map((keyword("similar"), keyword("to")), |_| LikeOperator::SimilarTo),
    ))
    .parse(input)
}

/// `BETWEEN`, `IN` and `LIKE` family, optionally negated.
fn parse_predicate_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (input, expr) = parse_other_operator_expression(input)?;
    let (after_not, negated) = match keyword("not")(input) {
        Ok((rest, _)) => (rest, true),
        Err(_) => (input, false),
    };

    if let Ok((rest, _)) = keyword("between")(after_not) {
        let (rest, _) = opt(keyword("symmetric")).parse(rest)?;
        let (rest, low) = parse_other_operator_expression(rest)?;
        let (rest, _) = keyword("and")(rest)?;
        let (rest, high) = parse_other_operator_expression(rest)?;
        let kind = ExpressionKind::Between {
            expr: Box::new(expr),
            negated,
            low: Box::new(low),
            high: Box::new(high),
        };
        return Ok((rest, spanned(start, rest, kind)));
    }

    if let Ok((rest, _)) = keyword("in")(after_not) {
        let (rest, _) = symbol("(")(rest)?;
        if starts_query(rest) {
            let (rest, subquery) = terminated(parse_query, symbol(")")).parse(rest)?;
            let kind = ExpressionKind::InSubquery {
                expr: Box::new(expr),
                subquery: Box::new(subquery),
                negated,
            };
            return Ok((rest, spanned(start, rest, kind)));
        }
        let (rest, list) = terminated(parse_expression_list, symbol(")")).parse(rest)?;
        let kind = ExpressionKind::InList {
            expr: Box::new(expr),
            list,
            negated,
        };
        return Ok((rest, spanned(start, rest, kind)));
    }

    if let Ok((rest, op)) = parse_like_operator(after_not) {
        let (rest, pattern) = parse_other_operator_expression(rest)?;
        let (rest, escape) =
            opt(preceded(keyword("escape"), parse_other_operator_expression)).parse(rest)?;
        let kind = ExpressionKind::Like {
            expr: Box::new(expr),
            negated,
            op,
            pattern: Box::new(pattern),
            escape: escape.map(Box::new),
        };
        return Ok((rest, spanned(start, rest, kind)));
    }

    Ok((input, expr))
}

fn parse_other_operator_expression(input: &str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_additive_expression, other_operator)
}

fn parse_additive_expression(input: &str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_multiplicative_expression, additive_operator)
}

fn parse_multiplicative_expression(input: &str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_exponent_expression, multiplicative_operator)
}

fn parse_exponent_expression(input: &str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_unary_expression, exponent_operator)
}

fn parse_unary_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    if let Ok((rest, token)) = operator_token(input) {
        let op = match token {
            "-" => Some(UnaryOperator::Minus),
            "+" => Some(UnaryOperator::Plus),
            _ => None,
        };
        if let Some(op) = op {
            let _guard = enter_nesting(input)?;
            let (rest, expr) = parse_unary_expression(rest)?;
            let kind = ExpressionKind::UnaryOp {
                op,
                expr: Box::new(expr),
            };
            return Ok((rest, spanned(start, rest, kind)));
        }
    }
    parse_postfix_expression(input)
}

/// `expr::type` casts and `expr[i]` / `expr[i:j]` subscripts.
fn parse_postfix_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut input, mut expr) = parse_primary(input)?;
    loop {
        if let Ok((rest, _)) = symbol("::")(input) {
            let (rest, data_type) = parse_data_type(rest)?;
            let kind = ExpressionKind::Cast {
                expr: Box::new(expr),
                data_type,
                shorthand: true,
            };
            expr = spanned(start, rest, kind);
            input = rest;
            continue;
        }
        if let Ok((rest, _)) = symbol("[")(input) {
            let (rest, index) = parse_expression(rest)?;
            let (rest, upper) = opt(preceded(symbol(":"), parse_expression)).parse(rest)?;
            let (rest, _) = symbol("]")(rest)?;
            let kind = ExpressionKind::Subscript {
                expr: Box::new(expr),
                index: Box::new(index),
                upper: upper.map(Box::new),
            };
            expr = spanned(start, rest, kind);
            input = rest;
            continue;
        }
        return Ok((input, expr));
    }
}

/// Type name as written: `int`, `numeric(10,2)`, `double precision`, `timestamp with time zone`, `text[]`.
pub fn parse_data_type(input: &str) -> PResult<'_, &str> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut rest, _) = any_identifier(input)?;
    while let Ok((after, _)) = preceded(symbol("."), any_identifier).parse(rest) {
        rest = after;
    }
    loop {
        if let Ok((after, _)) = symbol("(")(rest) {
            let (after, _) = balanced_content(after)?;
            let (after, _) = symbol(")")(after)?;
            rest = after;
            continue;
        }
        if let Some((after, _)) = TYPE_NAME_CONTINUATIONS
            .iter()
            .find_map(|kw| keyword(*kw)(rest).ok())
        {
            rest = after;
            continue;
        }
        if let Ok((after, _)) = (symbol("["), symbol("]")).parse(rest) {
            rest = after;
            continue;
        }
        return Ok((rest, consumed(start, rest)));
    }
}

fn parse_primary(input: &str) -> PResult<'_, Expression<'_>> {
    alt((
        parse_parenthesized,
        parse_case_expression,
        parse_cast_expression,
        parse_extract_expression,
        parse_exists_expression,
        parse_array_expression,
        parse_parameter,
        parse_literal,
        parse_typed_literal,
        parse_function_call,
        parse_column_ref,
    ))
    .parse(input)
}

/// `(expr)`, `(a, b)` or a scalar subquery `(select ...)`.
fn parse_parenthesized(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = symbol("(")(input)?;
    if starts_query(rest) {
        match terminated(parse_query, symbol(")")).parse(rest) {
            Ok((after, query)) => {
                let kind = ExpressionKind::Subquery(Box::new(query));
                return Ok((after, spanned(start, after, kind)));
            }
            // `((select 1) + 1)` is an expression that merely starts like a query
            Err(nom::Err::Error(_)) => {}
            Err(e) => return Err(e),
        }
    }
    let (rest, mut items) = terminated(parse_expression_list, symbol(")")).parse(rest)?;
    let kind = if items.len() == 1 {
        ExpressionKind::Nested(Box::new(items.remove(0)))
    } else {
        ExpressionKind::Row(items)
    };
    Ok((rest, spanned(start, rest, kind)))
}

fn parse_case_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = keyword("case")(input)?;
    let (rest, operand) = if peek_keyword(rest, "when") {
        (rest, None)
    } else {
        let (rest, operand) = parse_expression(rest)?;
        (rest, Some(Box::new(operand)))
    };
    let (rest, branches) = many1((
        preceded(keyword("when"), parse_expression),
        preceded(keyword("then"), parse_expression),
    ))
    .parse(rest)?;
    let (rest, else_result) = opt(preceded(keyword("else"), parse_expression)).parse(rest)?;
    let (rest, _) = keyword("end")(rest)?;
    let kind = ExpressionKind::Case(CaseExpression {
        operand,
        branches,
        else_result: else_result.map(Box::new),
    });
    Ok((rest, spanned(start, rest, kind)))
}

fn parse_cast_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = (keyword("cast"), symbol("(")).parse(input)?;
    let (rest, expr) = parse_expression(rest)?;
    let (rest, _) = keyword("as")(rest)?;
    let (rest, data_type) = parse_data_type(rest)?;
    let (rest, _) = symbol(")")(rest)?;
    let kind = ExpressionKind::Cast {
        expr: Box::new(expr),
        data_type,
        shorthand: false,
    };
    Ok((rest, spanned(start, rest, kind)))
}

fn parse_extract_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = (keyword("extract"), symbol("(")).parse(input)?;
    let (rest, field) = alt((bare_word, string_literal)).parse(rest)?;
    let (rest, _) = keyword("from")(rest)?;
    let (rest, expr) = parse_expression(rest)?;
    let (rest, _) = symbol(")")(rest)?;
    let kind = ExpressionKind::Extract {
        field,
        expr: Box::new(expr),
    };
    Ok((rest, spanned(start, rest, kind)))
}

fn parse_exists_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = (keyword("exists"), symbol("(")).parse(input)?;
    let (rest, query) = terminated(parse_query, symbol(")")).parse(rest)?;
    Ok((
        rest,
        spanned(start, rest, ExpressionKind::Exists(Box::new(query))),
    ))
}

/// `array[...]` constructor or `array(select ...)`.
fn parse_array_expression(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = keyword("array")(input)?;
    if let Ok((rest, _)) = symbol("[")(rest) {
        let (rest, items) =
            terminated(separated_list0(symbol(","), parse_expression), symbol("]")).parse(rest)?;
        return Ok((rest, spanned(start, rest, ExpressionKind::Array(items))));
    }
    let (rest, query) = delimited(symbol("("), parse_query, symbol(")")).parse(rest)?;
    Ok((
        rest,
        spanned(start, rest, ExpressionKind::ArraySubquery(Box::new(query))),
    ))
}

fn parse_parameter(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, _) = alt((recognize(pair(char('$'), digit1)), symbol("?"))).parse(input)?;
    Ok((rest, spanned(start, rest, ExpressionKind::Parameter)))
}

fn sql_value_keyword(input: &str) -> PResult<'_, &str> {
    let (rest, word) = bare_word(input)?;
    if SQL_VALUE_KEYWORDS
        .iter()
        .any(|kw| kw.eq_ignore_ascii_case(word))
        && !peek_symbol(rest, "(")
    {
        Ok((rest, word))
    } else {
        fail(input, "expected SQL value keyword")
    }
}

fn parse_literal(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, literal) = alt((
        map(string_literal, Literal::String),
        map(number_literal, Literal::Number),
        map(keyword("true"), |_| Literal::Boolean(true)),
        map(keyword("false"), |_| Literal::Boolean(false)),
        map(keyword("null"), |_| Literal::Null),
        map(sql_value_keyword, Literal::SqlValue),
    ))
    .parse(input)?;
    Ok((rest, spanned(start, rest, ExpressionKind::Literal(literal))))
}

/// `date '2021-01-01'`, `interval '3 months'`
fn parse_typed_literal(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, data_type) = bare_word(input)?;
    if !TYPED_LITERAL_PREFIXES
        .iter()
        .any(|prefix| prefix.eq_ignore_ascii_case(data_type))
    {
        return fail(input, "expected typed literal");
    }
    let (rest, value) = string_literal(rest)?;
    let kind = ExpressionKind::Literal(Literal::Typed { data_type, value });
    Ok((rest, spanned(start, rest, kind)))
}

fn parse_function_name(input: &str) -> PResult<'_, ObjectName<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (mut rest, first) = any_identifier(input)?;
    if !first.quoted
        && is_reserved_keyword(first.text)
        && !RESERVED_FUNCTION_NAMES
            .iter()
            .any(|name| name.eq_ignore_ascii_case(first.text))
    {
        return fail(input, "reserved keyword used as function name");
    }
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

type FunctionArguments<'a> = (bool, Vec<Expression<'a>>, Vec<OrderByItem<'a>>);

/// Arguments after the opening parenthesis, through the closing one.
fn parse_function_arguments(input: &str) -> PResult<'_, FunctionArguments<'_>> {
    if let Ok((rest, _)) = symbol(")")(input) {
        return Ok((rest, (false, Vec::new(), Vec::new())));
    }
    let (rest, quantifier) = opt(alt((keyword("distinct"), keyword("all")))).parse(input)?;
    let distinct = quantifier.is_some_and(|q| q.eq_ignore_ascii_case("distinct"));
    let (rest, args) = match symbol("*")(rest) {
        Ok((after, star)) => {
            let wildcard = Expression {
                kind: ExpressionKind::Wildcard,
                text: star,
            };
            (after, vec![wildcard])
        }
        Err(_) => parse_expression_list(rest)?,
    };
    let (rest, order_by) =
        opt(preceded((keyword("order"), keyword("by")), parse_order_by_items)).parse(rest)?;
    let (rest, _) = symbol(")")(rest)?;
    Ok((rest, (distinct, args, order_by.unwrap_or_default())))
}

pub fn parse_function_call(input: &str) -> PResult<'_, Expression<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    let (rest, name) = parse_function_name(input)?;
    let (rest, _) = symbol("(")(rest)?;
    let (rest, (distinct, args, mut order_by)) = match parse_function_arguments(rest) {
        Ok(parsed) => parsed,
        Err(nom::Err::Error(_)) => {
            // keyword-separated arguments such as `substring(x from 2 for 3)` stay opaque
            let (after, raw) = balanced_content(rest)?;
            let (after, _) = symbol(")")(after)?;
            let raw = raw.trim();
            let arg = Expression {
                kind: ExpressionKind::Raw(raw),
                text: raw,
            };
            (after, (false, vec![arg], Vec::new()))
        }
        Err(e) => return Err(e),
    };

    let (rest, within_group) = opt(delimited(
        (
            keyword("within"),
            keyword("group"),
            symbol("("),
            keyword("order"),
            keyword("by"),
        ),
        parse_order_by_items,
        symbol(")"),
    ))
    .parse(rest)?;
    if let Some(items) = within_group {
        order_by.extend(items);
    }
    let (rest, filter) = opt(delimited(
        (keyword("filter"), symbol("("), keyword("where")),
        parse_expression,
        symbol(")"),
    ))
    .parse(rest)?;
    let (rest, over) = opt(preceded(keyword("over"), parse_window_spec)).parse(rest)?;

    let kind = ExpressionKind::Function(FunctionCall {
        name,
        distinct,
        args,
        order_by,
        filter: filter.map(Box::new),
        over,
    });
    Ok((rest, spanned(start, rest, kind)))
}

fn window_name(input: &str) -> PResult<'_, Identifier<'_>> {
    let (rest, name) = identifier(input)?;
    let is_clause_keyword = ["partition", "order"]
        .iter()
        .chain(FRAME_KEYWORDS)
        .any(|kw| !name.quoted && kw.eq_ignore_ascii_case(name.text));
    if is_clause_keyword {
        return fail(input, "expected window name");
    }
    Ok((rest, name))
}

pub fn parse_window_spec(input: &str) -> PResult<'_, WindowSpec<'_>> {
    let (input, _) = sp(input)?;
    let start = input;
    if let Ok((rest, name)) = identifier(input) {
        return Ok((
            rest,
            WindowSpec {
                name: Some(name),
                partition_by: Vec::new(),
                order_by: Vec::new(),
                frame: None,
                text: consumed(start, rest),
            },
        ));
    }
    let (rest, _) = symbol("(")(input)?;
    let (rest, name) = opt(window_name).parse(rest)?;
    let (rest, partition_by) =
        opt(preceded((keyword("partition"), keyword("by")), parse_expression_list)).parse(rest)?;
    let (rest, order_by) =
        opt(preceded((keyword("order"), keyword("by")), parse_order_by_items)).parse(rest)?;
    let (frame_start, _) = sp(rest)?;
    let (rest, frame) = if FRAME_KEYWORDS.iter().any(|kw| peek_keyword(frame_start, *kw)) {
        let (after, frame) = balanced_content(frame_start)?;
        (after, Some(frame.trim_end()))
    } else {
        (rest, None)
    };
    let (rest, _) = symbol(")")(rest)?;
    Ok((
        rest,
        WindowSpec {
            name,
            partition_by: partition_by.unwrap_or_default(),
            order_by: order_by.unwrap_or_default(),
            frame,
            text: consumed(start, rest),
        },
    ))
}

fn parse_column_ref(input: &str) -> PResult<'_, Expression<'_>> {
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
        spanned(start, rest, ExpressionKind::Column(ColumnRef { parts })),
    ))
}
