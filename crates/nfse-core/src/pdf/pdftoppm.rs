//! Rasterization through poppler's `pdftoppm`.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use tracing::{debug, info};

use super::{Rasterizer, Result};
use crate::error::RasterError;
use crate::models::config::PdfConfig;

const OUTPUT_PREFIX: &str = "page";

/// Renders pages to PNG files in a temporary directory and loads them.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }

    fn command(&self, path: &Path, config: &PdfConfig, out_prefix: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg("-r").arg(config.render_dpi.to_string()).arg("-png");
        if config.grayscale {
            command.arg("-gray");
        }
        if config.max_pages > 0 {
            command.arg("-l").arg(config.max_pages.to_string());
        }
        command.arg(path).arg(out_prefix);
        command
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn rasterize(&self, path: &Path, config: &PdfConfig) -> Result<Vec<DynamicImage>> {
        if !path.exists() {
            return Err(RasterError::Parse(format!("file not found: {}", path.display())));
        }

        let dir = tempfile::tempdir()?;
        let output = self
            .command(path, config, &dir.path().join(OUTPUT_PREFIX))
            .output()
            .map_err(|e| RasterError::Tool(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(RasterError::Tool(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut rendered: Vec<(u32, PathBuf)> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|p| page_number(&p).map(|n| (n, p)))
            .collect();
        rendered.sort_by_key(|(n, _)| *n);

        if rendered.is_empty() {
            return Err(RasterError::NoPages);
        }

        let pages = rendered
            .iter()
            .map(|(n, p)| {
                debug!("Loading rendered page {} from {}", n, p.display());
                image::open(p).map_err(RasterError::from)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Rasterized {} page(s) of {} at {} DPI",
            pages.len(),
            path.display(),
            config.render_dpi
        );
        Ok(pages)
    }
}

/// Page number of a `page-<n>.png` file written by pdftoppm.
fn page_number(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(OUTPUT_PREFIX)?
        .strip_prefix('-')?
        .parse()
        .ok()
}
