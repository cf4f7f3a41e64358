pub mod cte_naming;
pub mod sql_text;
