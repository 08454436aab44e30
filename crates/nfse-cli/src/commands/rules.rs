//! Rules command - inspect rule tables and apply them to recognized text.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use nfse_core::pipeline::process_text;
use nfse_core::{RuleSet, RuleTable};

use super::load_config;
use super::process::{print_status, OutputFormat};

/// Arguments for the rules command.
#[derive(Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    command: RulesCommand,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Print the embedded default rule table as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that a rule table file loads and compiles
    Check {
        /// Rule table file
        file: PathBuf,
    },

    /// Run repair, structuring and validation on already recognized text
    Apply(ApplyArgs),
}

#[derive(Args)]
struct ApplyArgs {
    /// Text file with recognized text
    input: PathBuf,

    /// Rule table file replacing the embedded one
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn run(args: RulesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    match args.command {
        RulesCommand::Export { output } => export_rules(output),
        RulesCommand::Check { file } => check_rules(&file),
        RulesCommand::Apply(apply_args) => apply_rules(apply_args, config_path),
    }
}

fn export_rules(output: Option<PathBuf>) -> anyhow::Result<()> {
    let json = RuleTable::embedded()?.to_json()?;

    match output {
        Some(path) => {
            fs::write(&path, json)?;
            eprintln!(
                "{} Rule table written to {}",
                style("✓").green(),
                path.display()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn check_rules(path: &Path) -> anyhow::Result<()> {
    let rules = RuleSet::from_file(path)?;

    println!(
        "{} {}: {} repair, {} structure, {} required field rules",
        style("✓").green(),
        rules.name,
        rules.repair.len(),
        rules.structure.len(),
        rules.required_fields.len()
    );

    Ok(())
}

fn apply_rules(args: ApplyArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    let text = fs::read_to_string(&args.input)?;

    let rule_file = match args.rules {
        Some(path) => Some(path),
        None => load_config(config_path)?.rules.rule_file,
    };
    let loaded;
    let rules = match rule_file {
        Some(path) => {
            loaded = RuleSet::from_file(&path)?;
            &loaded
        }
        None => RuleSet::embedded(),
    };

    let result = process_text(&text, rules);
    println!("{}", args.format.render(&result)?);
    print_status(&result);

    if !result.is_success() {
        anyhow::bail!("Validation failed: {}", result.status);
    }

    Ok(())
}
