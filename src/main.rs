use std::io::Read;
use std::path::PathBuf;

use analytics_cte_rewriter::config::{CliOverrides, OptimizerConfig};
use analytics_cte_rewriter::{CteOptimizer, DialectFlags};
use anyhow::Context;
use clap::Parser;

/// cte-rewrite - hoist correlated subqueries of an analytics statement into CTEs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQL file to rewrite (reads stdin when omitted)
    input: Option<PathBuf>,

    /// Target database has spatial support (enables geometry lookups)
    #[arg(long)]
    spatial: bool,

    /// YAML optimizer configuration (defaults to CTE_OPTIMIZER_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated pattern kinds to enable, e.g. last_scheduled,event_count
    #[arg(long)]
    patterns: Option<String>,

    /// Disable rewriting entirely
    #[arg(long)]
    disable: bool,

    /// Report why a statement was left unchanged instead of echoing it
    #[arg(long)]
    strict: bool,
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        CliOverrides {
            patterns: cli.patterns.clone(),
            disable: cli.disable,
        }
    }
}

fn read_input(input: Option<&PathBuf>) -> anyhow::Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut sql = String::new();
            std::io::stdin()
                .read_to_string(&mut sql)
                .context("Failed to read stdin")?;
            Ok(sql)
        }
    }
}

fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => OptimizerConfig::from_yaml_file(path)
            .with_context(|| format!("Configuration error in {}", path.display()))?,
        None => OptimizerConfig::from_env().context("Configuration error")?,
    };
    config
        .merge(CliOverrides::from(&cli))
        .context("Invalid command-line override")?;
    log::debug!("optimizer config: {:?}", config);

    let sql = read_input(cli.input.as_ref())?;
    let dialect = DialectFlags::with_spatial_support(cli.spatial);
    let optimizer = CteOptimizer::new(config);

    if cli.strict {
        match optimizer.try_optimize(&sql, dialect)? {
            Some(rewritten) => println!("{}", rewritten),
            None => anyhow::bail!("No rewritable subquery found"),
        }
    } else {
        println!("{}", optimizer.optimize(&sql, dialect));
    }
    Ok(())
}
