//! Batch processing command for multiple NFS-e PDFs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use nfse_core::{PipelineResult, PipelineStatus};

use super::process::OutputFormat;
use super::{build_pipeline, load_config, output_path_for};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching input PDFs
    #[arg(required = true)]
    input: String,

    /// Output directory (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Rule table file replacing the embedded one
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Timeout in seconds for each OCR call
    #[arg(long)]
    timeout: Option<u64>,
}

/// Result of processing a single file.
struct FileResult {
    path: PathBuf,
    result: PipelineResult,
    processing_time_ms: u64,
}

/// What a document's status means for the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Continue,
    /// Missing fields are recorded; the batch goes on.
    Incomplete,
    /// Failed document, skipped because of `--continue-on-error`.
    Skip,
    Stop,
}

fn outcome(status: &PipelineStatus, continue_on_error: bool) -> Outcome {
    match status {
        PipelineStatus::Success => Outcome::Continue,
        PipelineStatus::MissingFields { .. } => Outcome::Incomplete,
        PipelineStatus::Error { .. } if continue_on_error => Outcome::Skip,
        PipelineStatus::Error { .. } => Outcome::Stop,
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            ext.eq_ignore_ascii_case("pdf")
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

    let pipeline = build_pipeline(config, args.rules.as_deref(), args.timeout)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    // Documents run one after another; each one is itself sequential.
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let file_start = Instant::now();
        let result = pipeline.process_document(&path).await;
        let processing_time_ms = file_start.elapsed().as_millis() as u64;

        if !result.text.is_empty() {
            let output_path =
                output_path_for(&path, args.output_dir.as_deref(), args.format.extension());
            fs::write(&output_path, args.format.render(&result)?)?;
            debug!("Wrote output to {}", output_path.display());
        }

        match outcome(&result.status, args.continue_on_error) {
            Outcome::Continue => {}
            Outcome::Incomplete => {
                warn!("Incomplete extraction for {}: {}", path.display(), result.status);
            }
            Outcome::Skip => {
                warn!("Failed to process {}: {}", path.display(), result.status);
            }
            Outcome::Stop => {
                error!("Failed to process {}: {}", path.display(), result.status);
                pb.abandon();
                anyhow::bail!("Processing failed for {}: {}", path.display(), result.status);
            }
        }

        results.push(FileResult {
            path,
            result,
            processing_time_ms,
        });
        pb.inc(1);
    }

    pb.finish_with_message("Complete");

    let failed: Vec<_> = results
        .iter()
        .filter(|r| matches!(r.result.status, PipelineStatus::Error { .. }))
        .collect();
    let incomplete = results
        .iter()
        .filter(|r| matches!(r.result.status, PipelineStatus::MissingFields { .. }))
        .count();

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
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
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} incomplete, {} failed",
        style(results.len() - failed.len() - incomplete).green(),
        style(incomplete).yellow(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for file in &failed {
            println!("  - {}: {}", file.path.display(), file.result.status);
        }
    }

    Ok(())
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "missing_fields",
        "failed_page",
        "failed_stage",
        "pages",
        "processing_time_ms",
        "error",
    ])?;

    for file in results {
        let filename = file.path.file_name().and_then(|s| s.to_str()).unwrap_or("");

        let (status, missing, page, stage, message) = match &file.result.status {
            PipelineStatus::Success => ("success", String::new(), None, None, ""),
            PipelineStatus::MissingFields { fields } => {
                ("missing_fields", fields.join("; "), None, None, "")
            }
            PipelineStatus::Error {
                message,
                page,
                stage,
            } => ("error", String::new(), *page, stage.as_deref(), message.as_str()),
        };

        let page = page.map(|p| p.to_string()).unwrap_or_default();
        let pages = file.result.pages.len().to_string();
        let time_ms = file.processing_time_ms.to_string();

        wtr.write_record([
            filename,
            status,
            missing.as_str(),
            page.as_str(),
            stage.unwrap_or(""),
            pages.as_str(),
            time_ms.as_str(),
            message,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
