use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::cte_optimizer::PatternKind;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Optimizer configuration with validation
///
/// Column and table names are compared with identifiers as the database
/// resolves them, so unquoted names belong here in lower case.
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Master switch; when off every statement passes through untouched
    pub enabled: bool,

    /// Pattern kinds that may be rewritten
    pub patterns: BTreeSet<PatternKind>,

    /// Inner columns accepted as the correlation key of last-value and count lookups
    #[validate(
        length(min = 1, message = "At least one correlation column is required"),
        custom(function = "validate_column_names")
    )]
    pub correlation_columns: Vec<String>,

    #[validate(length(min = 1, message = "Relationship table cannot be empty"))]
    pub relationship_table: String,

    #[validate(length(min = 1, message = "Relationship key column cannot be empty"))]
    pub relationship_key_column: String,

    #[validate(length(min = 1, message = "Relationship value column cannot be empty"))]
    pub relationship_value_column: String,

    /// Columns only rewritten when the dialect reports spatial support
    #[validate(custom(function = "validate_column_names"))]
    pub geometry_columns: Vec<String>,

    /// Re-parse the rewritten statement before returning it
    pub verify_output: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: PatternKind::ALL.into_iter().collect(),
            correlation_columns: vec!["enrollment".to_string()],
            relationship_table: "analytics_rs_relationship".to_string(),
            relationship_key_column: "trackedentityid".to_string(),
            relationship_value_column: "relationship_count".to_string(),
            geometry_columns: vec![
                "geometry".to_string(),
                "enrollmentgeometry".to_string(),
                "eventgeometry".to_string(),
            ],
            verify_output: true,
        }
    }
}

impl OptimizerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            enabled: parse_env_var("CTE_OPTIMIZER_ENABLED", "true")?,
            patterns: match env::var("CTE_OPTIMIZER_PATTERNS") {
                Ok(value) => parse_pattern_list(&value)?,
                Err(_) => defaults.patterns,
            },
            correlation_columns: env::var("CTE_OPTIMIZER_CORRELATION_COLUMNS")
                .map(|value| split_list(&value))
                .unwrap_or(defaults.correlation_columns),
            relationship_table: env::var("CTE_OPTIMIZER_RELATIONSHIP_TABLE")
                .unwrap_or(defaults.relationship_table),
            relationship_key_column: defaults.relationship_key_column,
            relationship_value_column: defaults.relationship_value_column,
            geometry_columns: defaults.geometry_columns,
            verify_output: parse_env_var("CTE_OPTIMIZER_VERIFY_OUTPUT", "true")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of file or environment settings
    pub fn merge(&mut self, overrides: CliOverrides) -> Result<(), ConfigError> {
        if let Some(patterns) = overrides.patterns {
            self.patterns = parse_pattern_list(&patterns)?;
        }
        if overrides.disable {
            self.enabled = false;
        }
        self.validate()?;
        Ok(())
    }
}

/// Overrides taken from the `cte-rewrite` command line
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    /// Comma-separated pattern kinds, replacing the configured set
    pub patterns: Option<String>,
    pub disable: bool,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// `last_created, event_count` style list; an empty list disables every pattern.
pub fn parse_pattern_list(value: &str) -> Result<BTreeSet<PatternKind>, ConfigError> {
    split_list(value)
        .into_iter()
        .map(|item| {
            item.parse::<PatternKind>()
                .map_err(|e| ConfigError::Parse {
                    field: "patterns".to_string(),
                    value: item.clone(),
                    source: Box::new(e),
                })
        })
        .collect()
}

fn validate_column_names(columns: &Vec<String>) -> Result<(), ValidationError> {
    if columns.iter().any(|column| column.trim().is_empty()) {
        let mut error = ValidationError::new("blank_column");
        error.message = Some("Column names cannot be blank".into());
        return Err(error);
    }
    Ok(())
}
