//! OCR engine seam.

use std::future::Future;

use image::GrayImage;

use super::config::RecognitionConfig;
use crate::error::OcrError;

/// External OCR engine.
///
/// Treated as a pure function of the image and the configuration. Empty text
/// for an unreadable page is a valid answer, not an error.
pub trait OcrEngine: Send + Sync {
    /// Recognize all text in `image`.
    fn recognize(
        &self,
        image: &GrayImage,
        config: &RecognitionConfig,
    ) -> impl Future<Output = Result<String, OcrError>> + Send;
}
