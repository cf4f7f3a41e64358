use super::cte_builder::CteDefinition;
use super::errors::CteOptimizerError;
use super::rewriter::TextEdit;
use crate::sql_parser::ast::Query;
use crate::utils::sql_text::span_within;

/// Edit that places the generated CTEs ahead of the statement's own.
pub fn with_clause_edit(
    source: &str,
    query: &Query<'_>,
    definitions: &[CteDefinition],
) -> Result<TextEdit, CteOptimizerError> {
    let generated = definitions
        .iter()
        .map(|definition| definition.sql.as_str())
        .collect::<Vec<_>>()
        .join(",\n");

    match query.with_clause.as_ref().and_then(|with| with.ctes.first()) {
        Some(first) => {
            let span = span_within(source, first.text)
                .ok_or_else(|| CteOptimizerError::DetachedFragment(first.text.to_string()))?;
            Ok(TextEdit::insert(span.start, format!("{},\n", generated)))
        }
        None => {
            let span = span_within(source, query.text)
                .ok_or_else(|| CteOptimizerError::DetachedFragment(query.text.to_string()))?;
            Ok(TextEdit::insert(span.start, format!("with {}\n", generated)))
        }
    }
}

/// Apply non-overlapping edits; insertions at the same offset keep their order.
pub fn apply_edits(source: &str, mut edits: Vec<TextEdit>) -> Result<String, CteOptimizerError> {
    edits.sort_by_key(|edit| (edit.range.start, edit.range.end));

    let extra: usize = edits.iter().map(|edit| edit.replacement.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut cursor = 0;
    for edit in &edits {
        if edit.range.start < cursor {
            return Err(CteOptimizerError::OverlappingEdits(edit.range.start));
        }
        let Some(kept) = source.get(cursor..edit.range.start) else {
            return Err(CteOptimizerError::DetachedFragment(format!(
                "byte range {:?}",
                edit.range
            )));
        };
        out.push_str(kept);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(source.get(cursor..).unwrap_or_default());
    Ok(out)
}
