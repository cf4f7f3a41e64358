use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CteOptimizerError {
    #[error("Failed to parse statement: {0}")]
    Parse(String),

    #[error("Cannot prove column ownership in rewritten scope: {0}")]
    AmbiguousScope(String),

    #[error("Unsupported FROM clause in rewritten scope: {0}")]
    UnsupportedFrom(String),

    #[error("Rewrite edits overlap at byte {0}")]
    OverlappingEdits(usize),

    #[error("Node text is not part of the statement: {0}")]
    DetachedFragment(String),

    #[error("Rewritten statement does not parse: {0}")]
    Verification(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown pattern kind '{0}'")]
pub struct UnknownPatternKind(pub String);
