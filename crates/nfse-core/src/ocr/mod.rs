//! Page normalization and dual-pass recognition.

mod adapter;
mod config;
mod engine;
mod merge;
mod preprocessing;
mod tesseract;

pub use adapter::{needs_numeric_pass, Recognition, RecognitionAdapter};
pub use config::RecognitionConfig;
pub use engine::OcrEngine;
pub use merge::{merge, trusted_value};
pub use preprocessing::{ImageNormalizer, NormalizedImage};
pub use tesseract::TesseractEngine;
