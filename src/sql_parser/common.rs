use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, digit0, digit1, one_of, satisfy},
    combinator::{opt, recognize},
    sequence::{pair, preceded},
    IResult, Parser,
};

use std::cell::Cell;

use super::ast::Identifier;
use super::errors::SqlParsingError;

pub type PResult<'a, O> = IResult<&'a str, O, SqlParsingError<'a>>;

/// Words that can never be used unquoted as a column, table or implicit alias.
const RESERVED_KEYWORDS: &[&str] = &[
    "all", "and", "any", "array", "as", "asc", "between", "both", "case", "cast", "collate",
    "cross", "desc", "distinct", "else", "end", "escape", "except", "exists", "extract", "false",
    "fetch", "filter", "for", "from", "full", "group", "having", "ilike", "in", "inner",
    "intersect", "into", "is", "isnull", "join", "lateral", "left", "like", "limit", "natural",
    "not", "notnull", "null", "offset", "on", "or", "order", "outer", "over", "returning",
    "right", "select", "similar", "some", "then", "true", "union", "using", "when", "where",
    "window", "with", "within",
];

pub fn fail<'a, O>(input: &'a str, context: &'static str) -> PResult<'a, O> {
    Err(nom::Err::Error(SqlParsingError::new(input, context)))
}

/// Maximum depth of nested expressions, queries and joins.
///
/// Every level costs several parser frames, so this keeps deeply nested
/// input from exhausting the stack of a default-sized thread.
pub const MAX_NESTING_DEPTH: usize = 16;

/// Maximum operators folded into one left-associative chain.
pub const MAX_OPERATOR_CHAIN: usize = 256;

thread_local! {
    static NESTING_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Holds one level of nesting until dropped.
#[derive(Debug)]
pub struct NestingGuard(());

impl Drop for NestingGuard {
    fn drop(&mut self) {
        NESTING_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Enter one nesting level, failing hard once [`MAX_NESTING_DEPTH`] is reached.
pub fn enter_nesting(input: &str) -> Result<NestingGuard, nom::Err<SqlParsingError<'_>>> {
    NESTING_DEPTH.with(|depth| {
        let current = depth.get();
        if current >= MAX_NESTING_DEPTH {
            return Err(nom::Err::Failure(SqlParsingError::new(
                input,
                "nesting too deep",
            )));
        }
        depth.set(current + 1);
        Ok(NestingGuard(()))
    })
}

/// Text between `start` and `rest`, where `rest` is a suffix of `start`.
pub fn consumed<'a>(start: &'a str, rest: &'a str) -> &'a str {
    &start[..start.len() - rest.len()]
}

pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn is_reserved_keyword(word: &str) -> bool {
    RESERVED_KEYWORDS
        .iter()
        .any(|kw| kw.eq_ignore_ascii_case(word))
}

/// Skips whitespace, `--` line comments and nested `/* */` block comments.
pub fn sp(input: &str) -> PResult<'_, ()> {
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(pos) => &after[pos + 1..],
                None => "",
            };
        } else if trimmed.starts_with("/*") {
            rest = skip_block_comment(trimmed).ok_or_else(|| {
                nom::Err::Failure(SqlParsingError::new(trimmed, "unterminated block comment"))
            })?;
        } else {
            return Ok((trimmed, ()));
        }
    }
}

fn skip_block_comment(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut idx = 0;
    while idx + 1 < bytes.len() {
        match (bytes[idx], bytes[idx + 1]) {
            (b'/', b'*') => {
                depth += 1;
                idx += 2;
            }
            (b'*', b'/') => {
                depth = depth.saturating_sub(1);
                idx += 2;
                if depth == 0 {
                    return Some(&input[idx..]);
                }
            }
            _ => idx += 1,
        }
    }
    None
}

/// Runs `inner` after skipping leading whitespace and comments.
pub fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = SqlParsingError<'a>>
where
    F: Parser<&'a str, Output = O, Error = SqlParsingError<'a>>,
{
    preceded(sp, inner)
}

/// Punctuation such as `(`, `,` or `.`.
pub fn symbol<'a>(sym: &'static str) -> impl Fn(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let (input, _) = sp(input)?;
        tag(sym).parse(input)
    }
}

/// Case-insensitive keyword that must not continue as a longer word.
pub fn keyword<'a>(kw: &'static str) -> impl Fn(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let (input, _) = sp(input)?;
        let (rest, word) = tag_no_case::<_, _, SqlParsingError<'a>>(kw).parse(input)?;
        if rest.starts_with(is_identifier_char) {
            return fail(input, "keyword is a prefix of a longer word");
        }
        Ok((rest, word))
    }
}

pub fn peek_keyword(input: &str, kw: &'static str) -> bool {
    keyword(kw)(input).is_ok()
}

pub fn peek_symbol(input: &str, sym: &'static str) -> bool {
    symbol(sym)(input).is_ok()
}

/// Unquoted word, reserved or not.
pub fn bare_word(input: &str) -> PResult<'_, &str> {
    let (input, _) = sp(input)?;
    recognize(pair(
        satisfy(is_identifier_start),
        take_while(is_identifier_char),
    ))
    .parse(input)
}

fn quoted_identifier(input: &str) -> PResult<'_, Identifier<'_>> {
    let (rest, text) = quoted_text(input, b'"', false)?;
    if text.len() == 2 {
        return Err(nom::Err::Failure(SqlParsingError::new(
            input,
            "zero-length quoted identifier",
        )));
    }
    Ok((rest, Identifier { text, quoted: true }))
}

/// Identifier usable as a column, table or implicit alias; reserved words only when quoted.
pub fn identifier(input: &str) -> PResult<'_, Identifier<'_>> {
    let (input, _) = sp(input)?;
    if input.starts_with('"') {
        return quoted_identifier(input);
    }
    let (rest, word) = bare_word(input)?;
    if is_reserved_keyword(word) {
        return fail(input, "reserved keyword used as identifier");
    }
    Ok((
        rest,
        Identifier {
            text: word,
            quoted: false,
        },
    ))
}

/// Identifier in a position where keywords are allowed, e.g. after `AS` or a `.`.
pub fn any_identifier(input: &str) -> PResult<'_, Identifier<'_>> {
    let (input, _) = sp(input)?;
    if input.starts_with('"') {
        return quoted_identifier(input);
    }
    let (rest, word) = bare_word(input)?;
    Ok((
        rest,
        Identifier {
            text: word,
            quoted: false,
        },
    ))
}

/// Scans a quote-delimited token starting at `input`, where a doubled quote escapes itself.
pub fn quoted_text(input: &str, quote: u8, backslash_escapes: bool) -> PResult<'_, &str> {
    let bytes = input.as_bytes();
    if bytes.first() != Some(&quote) {
        return fail(input, "expected opening quote");
    }
    let mut idx = 1;
    while idx < bytes.len() {
        let b = bytes[idx];
        if backslash_escapes && b == b'\\' {
            idx += 2;
            continue;
        }
        if b == quote {
            if bytes.get(idx + 1) == Some(&quote) {
                idx += 2;
                continue;
            }
            return Ok((&input[idx + 1..], &input[..idx + 1]));
        }
        idx += 1;
    }
    Err(nom::Err::Failure(SqlParsingError::new(
        input,
        "unterminated quoted text",
    )))
}

fn dollar_quoted(input: &str) -> PResult<'_, &str> {
    let after = &input[1..];
    let Some(label_end) = after.find('$') else {
        return fail(input, "expected dollar quote");
    };
    let label = &after[..label_end];
    if label.starts_with(|c: char| c.is_ascii_digit())
        || !label.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return fail(input, "expected dollar quote");
    }
    let delimiter = &input[..label_end + 2];
    let body = &input[delimiter.len()..];
    match body.find(delimiter) {
        Some(pos) => {
            let end = delimiter.len() + pos + delimiter.len();
            Ok((&input[end..], &input[..end]))
        }
        None => Err(nom::Err::Failure(SqlParsingError::new(
            input,
            "unterminated dollar-quoted string",
        ))),
    }
}

/// `'text'`, `E'text'` or `$tag$text$tag$`, returned verbatim.
pub fn string_literal(input: &str) -> PResult<'_, &str> {
    let (input, _) = sp(input)?;
    let start = input;
    if let Some(body) = input
        .strip_prefix(|c: char| c == 'e' || c == 'E')
        .filter(|body| body.starts_with('\''))
    {
        let (rest, _) = quoted_text(body, b'\'', true)?;
        return Ok((rest, consumed(start, rest)));
    }
    if input.starts_with('\'') {
        return quoted_text(input, b'\'', false);
    }
    if input.starts_with('$') {
        return dollar_quoted(input);
    }
    fail(input, "expected string literal")
}

/// Unsigned numeric literal: `12`, `1.5`, `.5`, `2e10`.
pub fn number_literal(input: &str) -> PResult<'_, &str> {
    let (input, _) = sp(input)?;
    let parsed: PResult<'_, &str> = recognize((
        alt((
            recognize((digit1, opt((char('.'), digit0)))),
            recognize((char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input);
    let (rest, text) = parsed?;
    if rest.starts_with(is_identifier_start) {
        return fail(input, "malformed number");
    }
    Ok((rest, text))
}

/// Content up to, not including, the `)` closing an already consumed `(`.
pub fn balanced_content(input: &str) -> PResult<'_, &str> {
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'(' => depth += 1,
            b')' => {
                if depth == 0 {
                    return Ok((&input[idx..], &input[..idx]));
                }
                depth -= 1;
            }
            quote @ (b'\'' | b'"') => {
                let (rest, _) = quoted_text(&input[idx..], quote, false)?;
                idx = input.len() - rest.len();
                continue;
            }
            b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                let (rest, _) = sp(&input[idx..])?;
                idx = input.len() - rest.len();
                continue;
            }
            b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                let (rest, _) = sp(&input[idx..])?;
                idx = input.len() - rest.len();
                continue;
            }
            _ => {}
        }
        idx += 1;
    }
    fail(input, "unbalanced parentheses")
}
