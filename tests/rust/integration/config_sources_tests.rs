//! Configuration loading from the environment and from YAML files.

use analytics_cte_rewriter::config::{CliOverrides, ConfigError, OptimizerConfig};
use analytics_cte_rewriter::cte_optimizer::PatternKind;
use serial_test::serial;
use std::env;
use std::io::Write;

const ENV_KEYS: &[&str] = &[
    "CTE_OPTIMIZER_ENABLED",
    "CTE_OPTIMIZER_PATTERNS",
    "CTE_OPTIMIZER_CORRELATION_COLUMNS",
    "CTE_OPTIMIZER_RELATIONSHIP_TABLE",
    "CTE_OPTIMIZER_VERIFY_OUTPUT",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe {
            env::remove_var(key);
        }
    }
}

fn yaml_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = OptimizerConfig::from_env().unwrap();
    assert_eq!(config, OptimizerConfig::default());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    unsafe {
        env::set_var("CTE_OPTIMIZER_PATTERNS", "last_created, LastScheduled");
        env::set_var("CTE_OPTIMIZER_CORRELATION_COLUMNS", "enrollment,tei");
        env::set_var("CTE_OPTIMIZER_RELATIONSHIP_TABLE", "analytics_rs_rel");
        env::set_var("CTE_OPTIMIZER_VERIFY_OUTPUT", "false");
    }

    let config = OptimizerConfig::from_env().unwrap();
    clear_env();

    assert_eq!(
        config.patterns.into_iter().collect::<Vec<_>>(),
        vec![PatternKind::LastCreated, PatternKind::LastScheduled]
    );
    assert_eq!(
        config.correlation_columns,
        vec!["enrollment".to_string(), "tei".to_string()]
    );
    assert_eq!(config.relationship_table, "analytics_rs_rel");
    assert!(!config.verify_output);
    assert!(config.enabled);
}

#[test]
#[serial]
fn test_from_env_rejects_bad_values() {
    clear_env();
    unsafe {
        env::set_var("CTE_OPTIMIZER_ENABLED", "sometimes");
    }
    let enabled = OptimizerConfig::from_env();
    assert!(
        matches!(enabled, Err(ConfigError::Parse { ref field, .. }) if field == "CTE_OPTIMIZER_ENABLED")
    );

    clear_env();
    unsafe {
        env::set_var("CTE_OPTIMIZER_PATTERNS", "last_created,first_created");
    }
    let patterns = OptimizerConfig::from_env();
    assert!(
        matches!(patterns, Err(ConfigError::Parse { ref value, .. }) if value == "first_created")
    );

    clear_env();
    unsafe {
        env::set_var("CTE_OPTIMIZER_CORRELATION_COLUMNS", " , ");
    }
    let columns = OptimizerConfig::from_env();
    clear_env();
    assert!(matches!(columns, Err(ConfigError::Validation(_))));
}

#[test]
fn test_from_yaml_file_partial() {
    let file = yaml_file(
        "patterns:\n  - last_value_by_column\n  - event_count\ngeometry_columns: [geom]\n",
    );
    let config = OptimizerConfig::from_yaml_file(file.path()).unwrap();

    assert_eq!(
        config.patterns.into_iter().collect::<Vec<_>>(),
        vec![PatternKind::LastValueByColumn, PatternKind::EventCount]
    );
    assert_eq!(config.geometry_columns, vec!["geom".to_string()]);
    assert_eq!(
        config.relationship_table,
        OptimizerConfig::default().relationship_table
    );
    assert!(config.enabled);
}

#[test]
fn test_from_yaml_file_errors() {
    let unknown_kind = yaml_file("patterns: [last_updated]\n");
    assert!(matches!(
        OptimizerConfig::from_yaml_file(unknown_kind.path()),
        Err(ConfigError::Parse { ref field, .. }) if field == "yaml_content"
    ));

    let invalid = yaml_file("correlation_columns: []\n");
    assert!(matches!(
        OptimizerConfig::from_yaml_file(invalid.path()),
        Err(ConfigError::Validation(_))
    ));

    let missing = OptimizerConfig::from_yaml_file("/nonexistent/cte-optimizer.yaml");
    assert!(matches!(
        missing,
        Err(ConfigError::Parse { ref field, .. }) if field == "yaml_file"
    ));
}

#[test]
fn test_cli_overrides() {
    let mut config = OptimizerConfig::default();
    config
        .merge(CliOverrides {
            patterns: Some("event_count".to_string()),
            disable: false,
        })
        .unwrap();
    assert_eq!(
        config.patterns.iter().copied().collect::<Vec<_>>(),
        vec![PatternKind::EventCount]
    );
    assert!(config.enabled);

    config
        .merge(CliOverrides {
            patterns: None,
            disable: true,
        })
        .unwrap();
    assert!(!config.enabled);
    assert_eq!(config.patterns.len(), 1);
}
