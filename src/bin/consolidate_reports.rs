//! Extracts, normalizes and validates the annual reports of every configured
//! company.
//!
//! # Usage
//!
//! ```bash
//! # Companies from a config file
//! consolidate-reports --config companies.json
//!
//! # Ad-hoc run for two tickers with a stricter balance check
//! consolidate-reports --ticker NVO --ticker AAPL --tolerance 0.5
//! ```
//!
//! Reports are read from `{output_dir}/{ticker}/annual_reports/`.

use annual_report_consolidator::llm::{
    GeminiClient, GeminiExtractionOracle, GeminiSchemaOracle, WholeDocumentPages, DEFAULT_MODEL,
};
use annual_report_consolidator::{
    run_all, CompanyConfig, CompanyOutcome, Oracles, PipelineConfig, SchemaOracle,
    SnakeCaseSchemaOracle,
};
use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;

/// Consolidate financial statements from annual report PDFs
#[derive(Parser, Debug)]
#[command(name = "consolidate-reports")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticker to process in addition to the configured companies
    #[arg(short, long)]
    ticker: Vec<String>,

    /// Root directory holding one folder per ticker
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Validation passes before giving up on a company
    #[arg(long)]
    max_retries: Option<usize>,

    /// Allowed difference in Assets = Liabilities + Equity
    #[arg(long)]
    tolerance: Option<f64>,

    /// Gemini model used for extraction and schema inference
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Map every label to its own snake_case name instead of asking the model
    #[arg(long)]
    rule_based_schema: bool,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    for ticker in &args.ticker {
        config.companies.push(CompanyConfig {
            name: ticker.clone(),
            ticker: ticker.clone(),
            investor_relations_url: None,
        });
    }

    config.validate()?;
    if config.companies.is_empty() {
        bail!("No companies to process. Pass --config or --ticker.");
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let client = GeminiClient::new(args.api_key.clone(), args.model.clone())?;
    let extraction = GeminiExtractionOracle::new(client.clone());
    let gemini_schema = GeminiSchemaOracle::new(client);
    let schema: &dyn SchemaOracle = if args.rule_based_schema {
        &SnakeCaseSchemaOracle
    } else {
        &gemini_schema
    };

    let reports = run_all(
        &config,
        Oracles {
            extraction: &extraction,
            pages: &WholeDocumentPages,
            schema,
        },
    );

    println!("\nSummary:");
    let mut failures = 0;
    for report in &reports {
        let status = match &report.outcome {
            CompanyOutcome::NoReports => "no reports found".to_string(),
            CompanyOutcome::Completed(outcome) if outcome.succeeded() => {
                format!("validated after {} attempt(s)", outcome.attempts)
            }
            CompanyOutcome::Completed(outcome) => {
                failures += 1;
                format!(
                    "needs manual review: {}",
                    outcome
                        .failing_sources
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            CompanyOutcome::Failed(reason) => {
                failures += 1;
                format!("failed: {}", reason)
            }
        };
        println!("  {} ({}): {}", report.name, report.ticker, status);
    }

    if failures > 0 {
        bail!("{} of {} companies did not validate", failures, reports.len());
    }
    Ok(())
}
