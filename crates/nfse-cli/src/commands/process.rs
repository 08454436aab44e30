//! Process command - extract and repair the text of a single NFS-e PDF.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use nfse_core::{PipelineResult, PipelineStatus};

use super::{build_pipeline, load_config, output_path_for};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save next to the input as <name>_processado.txt
    #[arg(short, long)]
    save: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Print the raw recognition text of each page
    #[arg(long)]
    raw: bool,

    /// Rule table file replacing the embedded one
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Timeout in seconds for each OCR call
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Structured plain text
    Text,
    /// Full pipeline result as JSON
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
        }
    }

    pub fn render(self, result: &PipelineResult) -> anyhow::Result<String> {
        Ok(match self {
            OutputFormat::Text => result.text.clone(),
            OutputFormat::Json => serde_json::to_string_pretty(result)?,
        })
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;

    // Check input file exists
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let pipeline = build_pipeline(config, args.rules.as_deref(), args.timeout)?;

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Processing {}...", args.input.display()));

    let result = pipeline.process_document(&args.input).await;

    pb.finish_and_clear();

    let output = args.format.render(&result)?;
    let output_path = args.output.clone().or_else(|| {
        args.save
            .then(|| output_path_for(&args.input, None, args.format.extension()))
    });

    match &output_path {
        Some(path) => {
            fs::write(path, &output)?;
            eprintln!(
                "{} Output written to {}",
                style("✓").green(),
                path.display()
            );
        }
        None if !output.is_empty() => println!("{}", output),
        None => {}
    }

    if args.raw || !result.is_success() {
        print_raw(&result);
    }

    print_status(&result);
    debug!("Total processing time: {:?}", start.elapsed());

    if !result.is_success() {
        anyhow::bail!("Processing failed: {}", result.status);
    }

    Ok(())
}

/// Coloured one-line status on stderr.
pub fn print_status(result: &PipelineResult) {
    match &result.status {
        PipelineStatus::Success => {
            eprintln!("{} All required fields found", style("✓").green());
        }
        PipelineStatus::MissingFields { fields } => {
            eprintln!("{} Required fields not found:", style("✗").red());
            for field in fields {
                eprintln!("  - {}", field);
            }
        }
        PipelineStatus::Error { message, .. } => {
            eprintln!("{} {}", style("✗").red(), style(message).red());
        }
    }
}

/// Primary recognition text per page, for inspecting what the engine read.
fn print_raw(result: &PipelineResult) {
    if result.pages.is_empty() {
        return;
    }

    eprintln!();
    eprintln!("{}", style("Raw recognition text:").yellow());
    for page in &result.pages {
        let numeric = if page.numeric_pass { " (numeric pass)" } else { "" };
        eprintln!("{}", style(format!("--- page {}{} ---", page.number, numeric)).dim());
        eprintln!("{}", page.raw_text.trim());
    }
    eprintln!();
}
