//! Process command - extract a canonical record from a single invoice file.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invx_core::{CanonicalRecord, MatchMode, ProcessedDocument};

use super::{build_pipeline, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Fold pages locally instead of a second schema-matching call
    #[arg(long)]
    local_fold: bool,

    /// Key output by machine keys instead of column names
    #[arg(long)]
    machine_keys: bool,

    /// Print the raw per-page extraction to stderr
    #[arg(long)]
    show_raw: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Extracting...");

    let mode = if args.local_fold {
        MatchMode::LocalFold
    } else {
        MatchMode::Remote
    };
    let input = args.input.clone();
    let processed = tokio::task::spawn_blocking(move || -> anyhow::Result<ProcessedDocument> {
        let pipeline = build_pipeline(config)?;
        Ok(pipeline.extract_record(&input, mode)?)
    })
    .await??;

    pb.finish_and_clear();

    if args.show_raw {
        eprintln!("{}", style("Raw extraction:").dim());
        eprintln!("{}", processed.extracted.raw_text);
    }

    let output = format_record(&processed.record, args.format, args.machine_keys)?;

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

    if let Some(pages) = processed.extracted.page_count {
        debug!("{} pages", pages);
    }
    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Render a record in the requested format.
pub fn format_record(
    record: &CanonicalRecord,
    format: OutputFormat,
    machine_keys: bool,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let value = if machine_keys {
                record.to_machine_keys()
            } else {
                record.to_json()
            };
            Ok(serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Csv => format_record_csv(record, machine_keys),
        OutputFormat::Text => Ok(format_record_text(record)),
    }
}

fn format_record_csv(record: &CanonicalRecord, machine_keys: bool) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let header: Vec<&str> = if machine_keys {
        record.keys().collect()
    } else {
        record.fields().map(|(name, _)| name).collect()
    };
    wtr.write_record(&header)?;
    wtr.write_record(record.fields().map(|(_, value)| value.to_display_string()))?;

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_record_text(record: &CanonicalRecord) -> String {
    let width = record
        .fields()
        .map(|(name, _)| console::measure_text_width(name))
        .max()
        .unwrap_or(0);

    let mut output = String::new();
    for (name, value) in record.fields() {
        let padding = width - console::measure_text_width(name);
        let shown = if value.is_null() {
            "-".to_string()
        } else {
            value.to_display_string()
        };
        output.push_str(&format!("{}{}  {}\n", name, " ".repeat(padding), shown));
    }
    output
}
