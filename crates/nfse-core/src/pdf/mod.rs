//! PDF rasterization.

mod embedded;
mod pdftoppm;

pub use embedded::EmbeddedImageRasterizer;
pub use pdftoppm::PdftoppmRasterizer;

use std::path::Path;

use image::DynamicImage;

use crate::error::RasterError;
use crate::models::config::{PdfConfig, RasterBackend};

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, RasterError>;

/// Turns a PDF document into page images, in page order.
pub trait Rasterizer: Send + Sync {
    /// Render every page (up to `config.max_pages`, 0 = all).
    fn rasterize(&self, path: &Path, config: &PdfConfig) -> Result<Vec<DynamicImage>>;
}

/// Rasterizer selected by the configuration.
pub fn rasterizer_for(config: &PdfConfig) -> Box<dyn Rasterizer> {
    match config.backend {
        RasterBackend::Pdftoppm => Box::new(PdftoppmRasterizer::new(&config.pdftoppm_path)),
        RasterBackend::Embedded => Box::new(EmbeddedImageRasterizer::new()),
    }
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    fn rasterize(&self, path: &Path, config: &PdfConfig) -> Result<Vec<DynamicImage>> {
        (**self).rasterize(path, config)
    }
}
