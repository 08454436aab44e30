//! Page image normalization for OCR.
//!
//! Grayscale, non-local-means denoising, contrast-limited adaptive histogram
//! equalization and adaptive Gaussian binarization, in that order.

use std::time::Instant;

use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::filter::separable_filter_equal;
use tracing::debug;

use crate::error::PreprocessError;
use crate::models::config::NormalizerConfig;

/// Largest possible mean squared difference between two 8-bit patches.
const MAX_PATCH_DISTANCE: usize = 255 * 255;

/// Binarized page image ready for recognition.
///
/// Every pixel is either 0 or 255.
#[derive(Debug, Clone)]
pub struct NormalizedImage(GrayImage);

impl NormalizedImage {
    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_inner(self) -> GrayImage {
        self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }
}

impl NormalizerConfig {
    /// Reject constants the filters cannot work with.
    pub fn validate(&self) -> Result<(), PreprocessError> {
        let odd = |stage: &'static str, name: &str, value: u32| {
            if value == 0 || value % 2 == 0 {
                Err(PreprocessError::InvalidConfig {
                    stage,
                    reason: format!("{} must be odd and positive, got {}", name, value),
                })
            } else {
                Ok(())
            }
        };

        if self.denoise_strength <= 0.0 {
            return Err(PreprocessError::InvalidConfig {
                stage: "denoise",
                reason: format!("strength must be positive, got {}", self.denoise_strength),
            });
        }
        odd("denoise", "template window", self.denoise_template_window)?;
        odd("denoise", "search window", self.denoise_search_window)?;

        if self.clahe_clip_limit <= 0.0 {
            return Err(PreprocessError::InvalidConfig {
                stage: "equalize",
                reason: format!("clip limit must be positive, got {}", self.clahe_clip_limit),
            });
        }
        if self.clahe_tile_grid.0 == 0 || self.clahe_tile_grid.1 == 0 {
            return Err(PreprocessError::InvalidConfig {
                stage: "equalize",
                reason: "tile grid must be at least 1x1".to_string(),
            });
        }

        odd("threshold", "block size", self.threshold_block_size)?;
        if self.threshold_block_size < 3 {
            return Err(PreprocessError::InvalidConfig {
                stage: "threshold",
                reason: "block size must be at least 3".to_string(),
            });
        }
        Ok(())
    }
}

/// Turns raw page images into binary images for the OCR engine.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    /// Create a normalizer, validating its constants.
    pub fn new(config: NormalizerConfig) -> Result<Self, PreprocessError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Run the full normalization. Output has the input's dimensions.
    pub fn normalize(&self, image: &DynamicImage) -> Result<NormalizedImage, PreprocessError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PreprocessError::EmptyImage { width, height });
        }

        let start = Instant::now();
        let gray = image.to_luma8();
        let denoised = self.denoise(&gray);
        let equalized = self.equalize(&denoised);
        let binary = self.binarize(&equalized);

        debug!(
            "Normalized {}x{} page in {}ms",
            width,
            height,
            start.elapsed().as_millis()
        );

        Ok(NormalizedImage(binary))
    }

    /// Non-local-means denoising.
    ///
    /// For every offset in the search window the squared difference between
    /// the image and its shifted copy is box-summed over the template window
    /// through an integral image, so each offset costs one pass over the page.
    fn denoise(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let (w, h) = (width as usize, height as usize);
        let n = w * h;
        let t = (self.config.denoise_template_window / 2) as isize;
        let s = (self.config.denoise_search_window / 2) as isize;

        let h2 = self.config.denoise_strength * self.config.denoise_strength;
        let weight_lut: Vec<f32> = (0..=MAX_PATCH_DISTANCE)
            .map(|d| (-(d as f32) / h2).exp())
            .collect();

        let src = image.as_raw();
        let mut sum_w = vec![0f32; n];
        let mut sum_v = vec![0f32; n];
        let mut diff = vec![0u32; n];
        let mut integral = vec![0u64; (w + 1) * (h + 1)];
        let mut shifted = vec![0u8; n];

        for dy in -s..=s {
            for dx in -s..=s {
                for y in 0..h {
                    let sy = clamp_index(y as isize + dy, h);
                    for x in 0..w {
                        let sx = clamp_index(x as isize + dx, w);
                        let i = y * w + x;
                        let neighbour = src[sy * w + sx];
                        let d = src[i] as i32 - neighbour as i32;
                        diff[i] = (d * d) as u32;
                        shifted[i] = neighbour;
                    }
                }

                build_integral(&diff, w, h, &mut integral);

                for y in 0..h {
                    let y0 = (y as isize - t).max(0) as usize;
                    let y1 = ((y as isize + t) as usize).min(h - 1) + 1;
                    for x in 0..w {
                        let x0 = (x as isize - t).max(0) as usize;
                        let x1 = ((x as isize + t) as usize).min(w - 1) + 1;
                        let area = ((y1 - y0) * (x1 - x0)) as u64;
                        let sum = box_sum(&integral, w, x0, y0, x1, y1);
                        let distance = ((sum / area) as usize).min(MAX_PATCH_DISTANCE);
                        let weight = weight_lut[distance];

                        let i = y * w + x;
                        sum_w[i] += weight;
                        sum_v[i] += weight * shifted[i] as f32;
                    }
                }
            }
        }

        let data = sum_v
            .iter()
            .zip(sum_w.iter())
            .map(|(v, w)| (v / w).round().clamp(0.0, 255.0) as u8)
            .collect();

        GrayImage::from_raw(width, height, data).unwrap_or_else(|| image.clone())
    }

    /// Contrast-limited adaptive histogram equalization.
    fn equalize(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let (grid_x, grid_y) = self.config.clahe_tile_grid;

        let tile_w = width.div_ceil(grid_x.min(width));
        let tile_h = height.div_ceil(grid_y.min(height));
        let tiles_x = width.div_ceil(tile_w);
        let tiles_y = height.div_ceil(tile_h);

        let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x0 = tx * tile_w;
                let y0 = ty * tile_h;
                let x1 = (x0 + tile_w).min(width);
                let y1 = (y0 + tile_h).min(height);

                let mut hist = [0u32; 256];
                for y in y0..y1 {
                    for x in x0..x1 {
                        hist[image.get_pixel(x, y)[0] as usize] += 1;
                    }
                }
                let area = (x1 - x0) * (y1 - y0);
                luts.push(clipped_lut(&mut hist, area, self.config.clahe_clip_limit));
            }
        }

        let lut = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
        let mut output = GrayImage::new(width, height);

        for y in 0..height {
            let (ty0, ty1, fy) = tile_neighbours(y, tile_h, tiles_y);
            for x in 0..width {
                let (tx0, tx1, fx) = tile_neighbours(x, tile_w, tiles_x);
                let v = image.get_pixel(x, y)[0] as usize;

                let top = lut(tx0, ty0)[v] as f32 * (1.0 - fx) + lut(tx1, ty0)[v] as f32 * fx;
                let bottom = lut(tx0, ty1)[v] as f32 * (1.0 - fx) + lut(tx1, ty1)[v] as f32 * fx;
                let value = top * (1.0 - fy) + bottom * fy;

                output.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
            }
        }

        output
    }

    /// Adaptive Gaussian thresholding.
    ///
    /// A pixel becomes white when it is brighter than the Gaussian-weighted
    /// mean of its neighbourhood minus the configured offset.
    fn binarize(&self, image: &GrayImage) -> GrayImage {
        let kernel = gaussian_kernel(self.config.threshold_block_size);
        let mean = separable_filter_equal(image, &kernel);
        let offset = self.config.threshold_offset;

        let (width, height) = image.dimensions();
        let mut output = GrayImage::new(width, height);

        for (x, y, pixel) in output.enumerate_pixels_mut() {
            let value = image.get_pixel(x, y)[0] as i32;
            let threshold = mean.get_pixel(x, y)[0] as i32 - offset;
            *pixel = Luma([if value > threshold { 255 } else { 0 }]);
        }

        output
    }
}

fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

fn build_integral(values: &[u32], w: usize, h: usize, integral: &mut [u64]) {
    let stride = w + 1;
    for x in 0..stride {
        integral[x] = 0;
    }
    for y in 0..h {
        let mut row_sum = 0u64;
        integral[(y + 1) * stride] = 0;
        for x in 0..w {
            row_sum += values[y * w + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
}

/// Sum over the half-open rectangle `[x0, x1) x [y0, y1)`.
fn box_sum(integral: &[u64], w: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
    let stride = w + 1;
    integral[y1 * stride + x1] + integral[y0 * stride + x0]
        - integral[y0 * stride + x1]
        - integral[y1 * stride + x0]
}

/// Clip a tile histogram, redistribute the excess and return the mapping.
fn clipped_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let bonus = excess / 256;
    let residual = (excess % 256) as usize;
    for bin in hist.iter_mut() {
        *bin += bonus;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        for i in (0..256).step_by(step).take(residual) {
            hist[i] += 1;
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, &bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// The two tiles whose centres surround `coord`, and the weight of the second.
fn tile_neighbours(coord: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let pos = (coord as f32 + 0.5) / tile as f32 - 0.5;
    if pos <= 0.0 {
        return (0, 0, 0.0);
    }
    let first = pos.floor() as u32;
    if first >= tiles - 1 {
        return (tiles - 1, tiles - 1, 0.0);
    }
    (first, first + 1, pos - first as f32)
}

/// Normalized 1-D Gaussian kernel of odd length `size`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (size / 2) as i32;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in kernel.iter_mut() {
        *v /= sum;
    }
    kernel
}
