//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use invx_core::{CanonicalSchema, DocumentOutcome, MatchMode};

use super::process::{format_record, OutputFormat};
use super::{build_pipeline, load_config, output_stem};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (default: from config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Fold pages locally instead of a second schema-matching call
    #[arg(long)]
    local_fold: bool,

    /// Key outputs by machine keys instead of column names
    #[arg(long)]
    machine_keys: bool,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Extracting {} files...", files.len()));

    let workers = args.jobs.unwrap_or(config.batch.workers);
    let mode = if args.local_fold {
        MatchMode::LocalFold
    } else {
        MatchMode::Remote
    };
    let fail_fast = !args.continue_on_error;

    let (schema, outcomes) = tokio::task::spawn_blocking(
        move || -> anyhow::Result<(CanonicalSchema, Vec<DocumentOutcome>)> {
            let pipeline = build_pipeline(config)?;
            let outcomes = pipeline.extract_records(&files, workers, mode, fail_fast)?;
            Ok((pipeline.schema().clone(), outcomes))
        },
    )
    .await??;

    pb.finish_with_message("Complete");

    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();

    if !args.continue_on_error {
        if let Some(first) = failed.first() {
            if let Err(e) = &first.result {
                error!("Failed to process {}: {}", first.path.display(), e);
                anyhow::bail!("Processing failed for {}: {}", first.path.display(), e);
            }
        }
    }

    for outcome in &outcomes {
        let (Ok(processed), Some(output_dir)) = (&outcome.result, &args.output_dir) else {
            continue;
        };

        let extension = match args.format {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        };
        let output_path =
            output_dir.join(format!("{}.{}", output_stem(&outcome.path), extension));

        let content = format_record(&processed.record, args.format, args.machine_keys)?;
        fs::write(&output_path, content)?;
        debug!("Wrote output to {}", output_path.display());
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &schema, &outcomes)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        outcomes.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(outcomes.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for outcome in &failed {
            if let Err(e) = &outcome.result {
                warn!("Failed to process {}: {}", outcome.path.display(), e);
                println!("  - {}: {}", outcome.path.display(), e);
            }
        }
    }

    Ok(())
}

/// One row per document, one column per machine key.
fn write_summary(
    path: &Path,
    schema: &CanonicalSchema,
    outcomes: &[DocumentOutcome],
) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["filename", "status", "pages"];
    header.extend(schema.keys());
    header.push("error");
    wtr.write_record(&header)?;

    for outcome in outcomes {
        let filename = outcome
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        let mut row = vec![filename.to_string()];
        match &outcome.result {
            Ok(processed) => {
                row.push("success".to_string());
                row.push(
                    processed
                        .extracted
                        .page_count
                        .map(|p| p.to_string())
                        .unwrap_or_default(),
                );
                row.extend(schema.keys().map(|key| {
                    processed
                        .record
                        .get_by_key(key)
                        .map(|value| value.to_display_string())
                        .unwrap_or_default()
                }));
                row.push(String::new());
            }
            Err(e) => {
                row.push("error".to_string());
                row.push(String::new());
                row.extend(schema.keys().map(|_| String::new()));
                row.push(e.to_string());
            }
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use invx_core::{CanonicalRecord, ExtractedDocument, InvxError, ProcessedDocument};

    #[test]
    fn test_summary_has_one_column_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let schema = CanonicalSchema::electricity_invoice();

        let record =
            CanonicalRecord::from_json_text(&schema, r#"{"請求金額": "100円"}"#).unwrap();
        let outcomes = vec![
            DocumentOutcome {
                path: PathBuf::from("in/a.pdf"),
                result: Ok(ProcessedDocument {
                    extracted: ExtractedDocument {
                        filename: "a".to_string(),
                        raw_text: "[]".to_string(),
                        page_count: Some(2),
                        extracted_at: Utc::now(),
                    },
                    record,
                }),
            },
            DocumentOutcome {
                path: PathBuf::from("in/b.pdf"),
                result: Err(InvxError::Precondition("boom".to_string())),
            },
        ];

        write_summary(&path, &schema, &outcomes).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), schema.len() + 4);
        assert_eq!(&headers[3], "n_number");

        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "a.pdf");
        assert_eq!(&rows[0][2], "2");
        let amount = headers.iter().position(|h| h == "billing_amount").unwrap();
        assert_eq!(&rows[0][amount], "100円");
        assert_eq!(&rows[1][1], "error");
        assert!(rows[1][headers.len() - 1].contains("boom"));
    }
}
