//! Core library for NFS-e (Brazilian service invoice) OCR processing.
//!
//! This crate provides:
//! - PDF rasterization (pdftoppm or embedded page scans)
//! - Page normalization (denoise, local contrast, adaptive threshold)
//! - Dual-pass recognition through an external OCR engine
//! - Rule-driven text repair, structuring and required-field validation

pub mod error;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod text;

pub use error::{NfseError, Result, Stage};
pub use models::config::NfseConfig;
pub use models::result::{PageReport, PipelineResult, PipelineStatus};
pub use ocr::{ImageNormalizer, OcrEngine, RecognitionAdapter, TesseractEngine};
pub use pdf::{rasterizer_for, Rasterizer};
pub use pipeline::{process_text, CancelFlag, Pipeline, PipelineBuilder};
pub use text::{RuleSet, RuleTable};
