//! Naming rules for generated CTEs and the join aliases that reference them.
//!
//! All generated names MUST come from these functions so that a CTE is always
//! referenced by the name it was defined with.
//!
//! ## Naming Convention
//! - CTE names are lower-case: `last_sched`, `last_created`,
//!   `last_value_<column>`, `de_count_<column>`, `relationship_count_agg`.
//! - Join aliases keep the column's case: `ls`, `lc`, `lv_<column>`,
//!   `dec_decount`, `rlc`.
//! - Column parts drop every character that is not an ASCII letter or digit,
//!   so `"H6uSAMO5WLD"` contributes `H6uSAMO5WLD`.
//! - Collisions get a numeric suffix starting at `_2`, compared case-insensitively
//!   because unquoted names fold to lower case in Postgres.
//!
//! Examples:
//! - `("last_value", Some("\"H6uSAMO5WLD\""))` → `"last_value_h6usamo5wld"`
//! - `("lv", Some("\"H6uSAMO5WLD\""))` → `"lv_H6uSAMO5WLD"`
//! - `"last_sched"` taken → `"last_sched_2"`

use std::collections::BTreeSet;

/// Keep only ASCII letters and digits.
///
/// # Examples
/// ```
/// use analytics_cte_rewriter::utils::cte_naming::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("\"H6uSAMO5WLD\""), "H6uSAMO5WLD");
/// assert_eq!(sanitize_identifier("de-xyz"), "dexyz");
/// ```
pub fn sanitize_identifier(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Generate a CTE base name (before collision suffixing).
///
/// # Arguments
/// * `prefix` - Fixed part such as `last_value` or `de_count`
/// * `column` - Column the CTE looks up, if it contributes to the name
///
/// # Examples
/// ```
/// use analytics_cte_rewriter::utils::cte_naming::generate_cte_base_name;
///
/// assert_eq!(generate_cte_base_name("last_sched", None), "last_sched");
/// assert_eq!(generate_cte_base_name("last_value", Some("\"cYGaxwK615G\"")), "last_value_cygaxwk615g");
/// assert_eq!(generate_cte_base_name("de_count", Some("---")), "de_count");
/// ```
pub fn generate_cte_base_name(prefix: &str, column: Option<&str>) -> String {
    join_parts(prefix, column.map(sanitize_identifier)).to_lowercase()
}

/// Generate a join alias base name; the column part keeps its case.
///
/// # Examples
/// ```
/// use analytics_cte_rewriter::utils::cte_naming::generate_join_alias_base;
///
/// assert_eq!(generate_join_alias_base("lv", Some("\"H6uSAMO5WLD\"")), "lv_H6uSAMO5WLD");
/// assert_eq!(generate_join_alias_base("rlc", None), "rlc");
/// ```
pub fn generate_join_alias_base(prefix: &str, column: Option<&str>) -> String {
    join_parts(prefix, column.map(sanitize_identifier))
}

fn join_parts(prefix: &str, column: Option<String>) -> String {
    match column {
        Some(column) if !column.is_empty() => format!("{}_{}", prefix, column),
        _ => prefix.to_string(),
    }
}

/// First of `base`, `base_2`, `base_3`, ... not present in `taken`.
///
/// `taken` must hold lower-cased names.
///
/// # Examples
/// ```
/// use std::collections::BTreeSet;
/// use analytics_cte_rewriter::utils::cte_naming::generate_unique_name;
///
/// let taken: BTreeSet<String> = ["ls".to_string(), "ls_2".to_string()].into();
/// assert_eq!(generate_unique_name("ls", &taken), "ls_3");
/// assert_eq!(generate_unique_name("lc", &taken), "lc");
/// ```
pub fn generate_unique_name(base: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }
    (2..)
        .map(|counter| format!("{}_{}", base, counter))
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .unwrap_or_else(|| base.to_string())
}
