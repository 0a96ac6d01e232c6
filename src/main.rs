//! Hacker Stories Scenario Harness - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use hacker_stories_harness::scenario::Scenario;
use hacker_stories_harness::{suite, HarnessConfig, ScenarioRunner, ScenarioScript};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "hacker-stories-harness",
    about = "End-to-end scenarios for the Hacker Stories search page with network interception",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "harness.yaml")]
    config: PathBuf,

    /// Additional scenario script files (YAML)
    #[arg(short, long = "script", value_name = "FILE")]
    scripts: Vec<PathBuf>,

    /// Only run scenarios whose full name contains this text
    #[arg(long, value_name = "FILTER")]
    scenario: Option<String>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and scripts and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../config/default-harness.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        HarnessConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        HarnessConfig::default()
    };

    let mut scripts = config.scripts.clone();
    for path in &args.scripts {
        info!(path = ?path, "Loading scenario scripts");
        scripts.extend(ScenarioScript::from_file(path)?);
    }

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} intercepts, {} scripts defined)",
            config.intercepts.len(),
            scripts.len()
        );
        return Ok(());
    }

    let mut scenarios = suite::hacker_stories();
    scenarios.extend(scripts.into_iter().map(Scenario::from_script));
    if let Some(filter) = &args.scenario {
        scenarios.retain(|s| s.full_name().contains(filter.as_str()));
    }

    if args.list {
        for scenario in &scenarios {
            println!("{}", scenario.full_name());
        }
        return Ok(());
    }

    if scenarios.is_empty() {
        anyhow::bail!("No scenarios to run");
    }

    let runner = ScenarioRunner::new(config)?;
    let report = runner.run_all(&scenarios).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} scenarios: {} passed, {} failed ({} ms)",
            report.total, report.passed, report.failed, report.duration_ms
        );
    }

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}
