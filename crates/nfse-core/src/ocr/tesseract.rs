//! Tesseract command-line engine.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use image::GrayImage;
use tokio::process::Command;
use tracing::{debug, trace};

use super::config::RecognitionConfig;
use super::engine::OcrEngine;
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Runs the `tesseract` binary on a temporary PNG of the page.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    tessdata_prefix: Option<PathBuf>,
}

impl TesseractEngine {
    /// Engine using the given binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            tessdata_prefix: None,
        }
    }

    /// Engine configured from the OCR section of the configuration.
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            tessdata_prefix: config.tessdata_prefix.clone(),
        }
    }

    /// Set the trained data directory exported as `TESSDATA_PREFIX`.
    pub fn with_tessdata_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.tessdata_prefix = Some(prefix.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractEngine {
    async fn recognize(
        &self,
        image: &GrayImage,
        config: &RecognitionConfig,
    ) -> Result<String, OcrError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("page.png");
        image.save(&input)?;

        trace!("Running {} with {}", self.binary.display(), config);

        let mut command = Command::new(&self.binary);
        command
            .arg(&input)
            .arg("stdout")
            .args(config.to_args())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(prefix) = &self.tessdata_prefix {
            command.env("TESSDATA_PREFIX", prefix);
        }

        let output = command
            .output()
            .await
            .map_err(|e| OcrError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(OcrError::Engine {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("Tesseract returned {} characters", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-binary");
        let image = GrayImage::new(4, 4);
        let config = RecognitionConfig::general(&OcrConfig::default());

        let result = engine.recognize(&image, &config).await;
        assert!(matches!(result, Err(OcrError::Spawn(_))));
    }

    #[test]
    fn test_from_config() {
        let config = OcrConfig {
            tesseract_path: PathBuf::from("/opt/tess/bin/tesseract"),
            tessdata_prefix: Some(PathBuf::from("/usr/share/tesseract-ocr/4.00/tessdata/")),
            ..OcrConfig::default()
        };
        let engine = TesseractEngine::from_config(&config);
        assert_eq!(engine.binary(), Path::new("/opt/tess/bin/tesseract"));
        assert!(engine.tessdata_prefix.is_some());
    }
}
