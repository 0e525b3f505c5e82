//! Analyze command - several documents in one seeded conversation.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use invx_core::AnalysisOptions;

use super::{build_pipeline, load_config};

/// Arguments for the analyze command.
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input PDF files, analyzed together
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Prompt replacing the default analysis instruction
    #[arg(short, long)]
    prompt: Option<String>,

    /// Output structure the model is asked to follow
    #[arg(short, long)]
    structure: Option<String>,

    /// Read the output structure from a file
    #[arg(long, conflicts_with = "structure")]
    structure_file: Option<PathBuf>,

    /// Re-project the analysis onto the canonical schema
    #[arg(long = "match")]
    match_schema: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn run(args: AnalyzeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    for input in &args.inputs {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
    }

    let output_structure = match &args.structure_file {
        Some(path) => Some(fs::read_to_string(path)?),
        None => args.structure.clone(),
    };
    let options = AnalysisOptions {
        prompt: args.prompt.clone(),
        output_structure,
    };

    info!("Analyzing {} documents", args.inputs.len());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!(
        "Uploading and analyzing {} documents...",
        args.inputs.len()
    ));

    let inputs = args.inputs.clone();
    let match_schema = args.match_schema;
    let output = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let pipeline = build_pipeline(config)?;
        let analysis = pipeline
            .analyzer()
            .process_documents(&inputs, &options)?;

        if !match_schema {
            return Ok(analysis);
        }

        let record = pipeline.matcher().match_record(&analysis)?;
        Ok(serde_json::to_string_pretty(&record)?)
    })
    .await??;

    pb.finish_and_clear();

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    Ok(())
}
