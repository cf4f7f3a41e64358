//! Integration tests - the optimizer end to end through the public API
//!
//! Expected SQL is compared after `normalize_sql`, so layout and keyword case
//! of generated text are free to change.

mod config_sources_tests;
mod program_indicator_tests;
mod rewrite_properties_tests;

/// Lower-case, drop `--` comments and all whitespace.
pub fn normalize_sql(sql: &str) -> String {
    sql.lines()
        .map(|line| match line.find("--") {
            Some(start) => &line[..start],
            None => line,
        })
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Windowed last-value CTE as the optimizer emits it.
pub fn last_value_cte(name: &str, table: &str, column: &str, filters: &[&str]) -> String {
    let extra: String = filters.iter().map(|f| format!(" and {}", f)).collect();
    format!(
        "{name} as (select enrollment, {column} from (select enrollment, {column}, \
         row_number() over (partition by enrollment order by occurreddate desc) as rn \
         from {table} where {column} is not null{extra}) t where rn = 1)"
    )
}

#[test]
fn test_normalize_sql() {
    assert_eq!(
        normalize_sql("SELECT a -- note\n  FROM  t"),
        "selectafromt"
    );
}
