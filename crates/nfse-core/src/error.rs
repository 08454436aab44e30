//! Error types for the nfse-core library.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the nfse library.
#[derive(Error, Debug)]
pub enum NfseError {
    /// The document could not be turned into page images.
    #[error("rasterization error: {0}")]
    Rasterization(#[from] RasterError),

    /// A per-page stage failed; processing of the document stopped there.
    #[error("page {page}: {stage} failed: {source}")]
    Page {
        /// 1-based page number.
        page: usize,
        /// Stage that raised the error.
        stage: Stage,
        #[source]
        source: PageError,
    },

    /// Rule table could not be loaded or compiled.
    #[error("rule error: {0}")]
    Rules(#[from] RuleError),

    /// Processing was cancelled between pages.
    #[error("processing cancelled after {completed} page(s)")]
    Cancelled { completed: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl NfseError {
    /// Page number the error refers to, if it is page-local.
    pub fn page(&self) -> Option<usize> {
        match self {
            NfseError::Page { page, .. } => Some(*page),
            _ => None,
        }
    }

    /// Stage name the error refers to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            NfseError::Page { stage, .. } => Some(*stage),
            NfseError::Rasterization(_) => Some(Stage::Rasterize),
            _ => None,
        }
    }
}

/// Pipeline stage names, used to annotate errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rasterize,
    Normalize,
    Recognize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Rasterize => "rasterize",
            Stage::Normalize => "normalize",
            Stage::Recognize => "recognize",
        };
        f.write_str(name)
    }
}

/// Source of a page-local failure.
#[derive(Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Recognition(#[from] OcrError),
}

/// Errors related to PDF rasterization.
#[derive(Error, Debug)]
pub enum RasterError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// A page carries no decodable scanned image.
    #[error("no decodable image on page {0}")]
    NoImage(u32),

    /// The external rasterizer failed.
    #[error("rasterizer failed: {0}")]
    Tool(String),

    /// Rendered page could not be decoded.
    #[error("failed to decode page image: {0}")]
    Decode(#[from] image::ImageError),

    /// The blocking rasterization task panicked or was cancelled.
    #[error("rasterization task failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the image normalizer.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Zero width or height.
    #[error("empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// A normalizer constant is out of range.
    #[error("invalid {stage} setting: {reason}")]
    InvalidConfig { stage: &'static str, reason: String },

    /// The blocking normalization task panicked or was cancelled.
    #[error("normalization task failed: {0}")]
    Worker(String),
}

/// Errors related to the OCR engine.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine binary could not be started.
    #[error("failed to start OCR engine: {0}")]
    Spawn(String),

    /// The engine exited unsuccessfully.
    #[error("OCR engine failed ({status}): {stderr}")]
    Engine { status: String, stderr: String },

    /// The engine did not answer within the configured time.
    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),

    /// The page image could not be handed to the engine.
    #[error("failed to encode page image: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to rule tables.
#[derive(Error, Debug)]
pub enum RuleError {
    /// A rule pattern does not compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Rule file is not valid JSON for a rule table.
    #[error("failed to parse rule table: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required field has no acceptable pattern.
    #[error("required field {0:?} has no patterns")]
    EmptyField(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the nfse library.
pub type Result<T> = std::result::Result<T, NfseError>;
