//! Subcommands of the `nfse` binary.

pub mod batch;
pub mod config;
pub mod process;
pub mod rules;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nfse_core::models::config::NfseConfig;
use nfse_core::pdf::{rasterizer_for, Rasterizer};
use nfse_core::{Pipeline, RuleSet, TesseractEngine};

/// Pipeline over the Tesseract binary and the configured rasterizer.
pub type CliPipeline = Pipeline<TesseractEngine, Box<dyn Rasterizer>>;

/// Load the explicit config file, else the default one if present, else defaults.
pub fn load_config(path: Option<&str>) -> anyhow::Result<NfseConfig> {
    let path = match path {
        Some(path) => PathBuf::from(path),
        None => {
            let default = config::default_config_path();
            if !default.exists() {
                return Ok(NfseConfig::default());
            }
            default
        }
    };

    NfseConfig::from_file(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))
}

/// Build the pipeline, optionally overriding the rule table and OCR timeout.
pub fn build_pipeline(
    mut config: NfseConfig,
    rules: Option<&Path>,
    timeout_secs: Option<u64>,
) -> anyhow::Result<CliPipeline> {
    if let Some(timeout) = timeout_secs {
        config.ocr.timeout_secs = timeout;
    }

    let engine = TesseractEngine::from_config(&config.ocr);
    let rasterizer = rasterizer_for(&config.pdf);
    let mut builder = Pipeline::builder(engine, rasterizer).with_config(config);

    if let Some(path) = rules {
        let rules = RuleSet::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load rules {}: {}", path.display(), e))?;
        builder = builder.with_rules(Arc::new(rules));
    }

    Ok(builder.build()?)
}

/// `<stem>_processado.<ext>` next to the input or inside `dir`.
pub fn output_path_for(input: &Path, dir: Option<&Path>, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("nfse");
    let name = format!("{}_processado.{}", stem, extension);

    match dir.or_else(|| input.parent()) {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_next_to_input() {
        let path = output_path_for(Path::new("/tmp/notas/nfs-e.pdf"), None, "txt");
        assert_eq!(path, PathBuf::from("/tmp/notas/nfs-e_processado.txt"));
    }

    #[test]
    fn test_output_path_in_dir() {
        let path = output_path_for(Path::new("nfs-e.pdf"), Some(Path::new("out")), "json");
        assert_eq!(path, PathBuf::from("out/nfs-e_processado.json"));
    }
}
