//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::NfseError;

/// Main configuration for the nfse pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfseConfig {
    /// PDF rasterization configuration.
    pub pdf: PdfConfig,

    /// Image normalization constants.
    pub normalizer: NormalizerConfig,

    /// OCR engine configuration.
    pub ocr: OcrConfig,

    /// Rule table configuration.
    pub rules: RulesConfig,
}

/// Which rasterizer turns the PDF into page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterBackend {
    /// poppler's `pdftoppm`.
    Pdftoppm,
    /// Decode the scanned image embedded in each page.
    Embedded,
}

/// PDF rasterization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rendering PDF pages to images.
    pub render_dpi: u32,

    /// Render pages in grayscale.
    pub grayscale: bool,

    /// Maximum pages to process (0 = unlimited).
    pub max_pages: usize,

    /// Rasterizer implementation.
    pub backend: RasterBackend,

    /// Path to the `pdftoppm` binary.
    pub pdftoppm_path: PathBuf,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 400,
            grayscale: true,
            max_pages: 0,
            backend: RasterBackend::Pdftoppm,
            pdftoppm_path: PathBuf::from("pdftoppm"),
        }
    }
}

/// Fixed constants of the image normalizer.
///
/// Tuned for dense printed text over noisy paper backgrounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Non-local-means filter strength.
    pub denoise_strength: f32,

    /// Side of the patch compared by non-local means (odd).
    pub denoise_template_window: u32,

    /// Side of the area searched for similar patches (odd).
    pub denoise_search_window: u32,

    /// CLAHE contrast clip limit.
    pub clahe_clip_limit: f32,

    /// CLAHE tile grid (columns, rows).
    pub clahe_tile_grid: (u32, u32),

    /// Neighbourhood of the adaptive Gaussian threshold (odd).
    pub threshold_block_size: u32,

    /// Constant subtracted from the weighted local mean.
    pub threshold_offset: i32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            denoise_strength: 30.0,
            denoise_template_window: 9,
            denoise_search_window: 21,
            clahe_clip_limit: 5.0,
            clahe_tile_grid: (16, 16),
            threshold_block_size: 101,
            threshold_offset: 12,
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Path to the `tesseract` binary.
    pub tesseract_path: PathBuf,

    /// Directory holding the trained language data (`TESSDATA_PREFIX`).
    pub tessdata_prefix: Option<PathBuf>,

    /// Language set, `+`-separated.
    pub languages: String,

    /// OCR engine mode (`--oem`).
    pub engine_mode: u8,

    /// Page segmentation mode for the general pass (`--psm`).
    pub page_segmentation: u8,

    /// Page segmentation mode for the numeric pass.
    pub numeric_page_segmentation: u8,

    /// Keep runs of spaces between words.
    pub preserve_interword_spaces: bool,

    /// Characters that never occur in this document class.
    pub char_blacklist: String,

    /// Characters allowed in the numeric pass.
    pub numeric_whitelist: String,

    /// Substrings of the primary text that trigger the numeric pass.
    pub numeric_triggers: Vec<String>,

    /// Token preceding monetary values.
    pub currency_marker: String,

    /// Upper bound for a single engine call, in seconds.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            tessdata_prefix: None,
            languages: "por+eng".to_string(),
            engine_mode: 3,
            page_segmentation: 6,
            numeric_page_segmentation: 11,
            preserve_interword_spaces: true,
            char_blacklist: "®©™•§".to_string(),
            numeric_whitelist: "0123456789R$.,/".to_string(),
            numeric_triggers: vec!["R$".to_string(), "CNPJ".to_string(), "CPF".to_string()],
            currency_marker: "R$".to_string(),
            timeout_secs: 120,
        }
    }
}

impl OcrConfig {
    /// Timeout for a single engine call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Rule table configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// JSON rule table replacing the embedded default.
    pub rule_file: Option<PathBuf>,
}

impl NfseConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), NfseError> {
        if self.pdf.render_dpi == 0 {
            return Err(NfseError::Config("pdf.render_dpi must be positive".to_string()));
        }
        if self.ocr.timeout_secs == 0 {
            return Err(NfseError::Config("ocr.timeout_secs must be positive".to_string()));
        }
        if self.ocr.currency_marker.is_empty() {
            return Err(NfseError::Config("ocr.currency_marker must not be empty".to_string()));
        }
        self.normalizer
            .validate()
            .map_err(|e| NfseError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NfseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pdf.render_dpi, 400);
        assert_eq!(config.normalizer.threshold_block_size, 101);
        assert_eq!(config.ocr.numeric_triggers, vec!["R$", "CNPJ", "CPF"]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NfseConfig =
            serde_json::from_str(r#"{"ocr": {"timeout_secs": 5}, "pdf": {"backend": "embedded"}}"#)
                .unwrap();
        assert_eq!(config.ocr.timeout_secs, 5);
        assert_eq!(config.ocr.languages, "por+eng");
        assert_eq!(config.pdf.backend, RasterBackend::Embedded);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = NfseConfig::default();
        config.pdf.max_pages = 3;
        config.save(&path).unwrap();

        let loaded = NfseConfig::from_file(&path).unwrap();
        assert_eq!(loaded.pdf.max_pages, 3);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = NfseConfig::default();
        config.ocr.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(NfseError::Config(_))));
    }
}
