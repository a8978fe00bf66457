//! Examsmith - Classroom Assessment Generation Pipeline
//!
//! The main entry point for the Examsmith command line.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use examsmith_agents::{PipelineCoordinator, RunOptions, WriterEngine};
use examsmith_agents::prompt_engineer::run_prompt_engineer;
use examsmith_core::config::PipelineConfig;
use examsmith_core::intent::TeacherIntent;
use examsmith_core::llm_transport::HttpLlmTransport;

/// Command line interface for Examsmith
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Teacher intent JSON file
    intent: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run only the pre-validator and print its report
    #[arg(long)]
    validate_only: bool,

    /// Run the intent even when the pre-validator found contradictions
    #[arg(long)]
    force: bool,

    /// Use the sequential adaptive writer instead of the parallel engine
    #[arg(long)]
    sequential: bool,

    /// Write the pipeline result JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let raw = std::fs::read_to_string(&args.intent)
        .with_context(|| format!("failed to read intent file {}", args.intent.display()))?;
    let intent: TeacherIntent =
        serde_json::from_str(&raw).with_context(|| "intent file is not a valid teacher intent")?;

    let report = run_prompt_engineer(&intent);
    if args.validate_only {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if report.should_block && !args.force {
        error!("intent blocked by the pre-validator (rerun with --force to override):");
        for contradiction in &report.contradictions {
            error!("  - {}", contradiction);
        }
        std::process::exit(1);
    }

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let transport = Arc::new(HttpLlmTransport::new(config.provider_settings()?)?);
    let coordinator = PipelineCoordinator::new(transport, config);

    let options = RunOptions {
        engine: if args.sequential {
            WriterEngine::SequentialAdaptive
        } else {
            WriterEngine::Parallel
        },
        override_block: args.force,
        ..RunOptions::default()
    };

    info!(
        "generating {} for \"{}\" ({} minutes)",
        intent.assessment_type, intent.topic, intent.time_minutes
    );
    let result = coordinator.generate_assessment(intent, options).await?;
    info!(
        "done: {} item(s), {} rewrite(s), forced_complete={}",
        result.final_assessment.total_items,
        result.telemetry.rewrite_count,
        result.final_assessment.metadata.forced_complete
    );

    let rendered = serde_json::to_string_pretty(&result)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("pipeline result written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
