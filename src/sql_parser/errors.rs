use nom::error::{ContextError, ParseError};
use std::fmt;

/// Longest slice of remaining input quoted back in an error message.
const SNIPPET_LEN: usize = 48;

#[derive(Debug, PartialEq)]
pub struct SqlParsingError<'a> {
    pub errors: Vec<(&'a str, &'static str)>,
}

impl<'a> SqlParsingError<'a> {
    pub fn new(input: &'a str, context: &'static str) -> Self {
        SqlParsingError {
            errors: vec![(input, context)],
        }
    }
}

impl<'a> ParseError<&'a str> for SqlParsingError<'a> {
    fn from_error_kind(input: &'a str, _kind: nom::error::ErrorKind) -> Self {
        SqlParsingError {
            errors: vec![(input, "unknown error")],
        }
    }

    fn append(input: &'a str, _kind: nom::error::ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, "unknown error (appended)"));
        other
    }
}

impl<'a> ContextError<&'a str> for SqlParsingError<'a> {
    fn add_context(input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, ctx));
        other
    }
}

impl fmt::Display for SqlParsingError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (input, ctx) in &self.errors {
            let snippet: String = input.trim_start().chars().take(SNIPPET_LEN).collect();
            writeln!(f, "{}: {:?}", ctx, snippet)?;
        }
        Ok(())
    }
}

impl<'a> From<nom::error::Error<&'a str>> for SqlParsingError<'a> {
    fn from(err: nom::error::Error<&'a str>) -> Self {
        SqlParsingError {
            errors: vec![(err.input, "Unable to parse")],
        }
    }
}
